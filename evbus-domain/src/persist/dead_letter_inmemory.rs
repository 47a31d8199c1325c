//! 内存版死信存储（InMemoryDeadLetterStore）
//!
//! 基于 `DashMap` 的按事件 id 原子更新实现；同一事件并发失败时以最后一次写入为准。

use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use crate::persist::{
    DeadLetterRecord, DeadLetterStats, DeadLetterStore, ErrorSnapshot, UnresolvedQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    records: DashMap<String, DeadLetterRecord>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record_failure(
        &self,
        event: &DomainEvent,
        error: &ErrorSnapshot,
        at: DateTime<Utc>,
    ) -> Result<DeadLetterRecord> {
        let entry = self
            .records
            .entry(event.id().to_string())
            .and_modify(|r| r.record_failure(error.clone(), at))
            .or_insert_with(|| DeadLetterRecord::first_failure(event, error.clone(), at));

        Ok(entry.value().clone())
    }

    async fn find(&self, event_id: &str) -> Result<Option<DeadLetterRecord>> {
        Ok(self.records.get(event_id).map(|r| r.value().clone()))
    }

    async fn due_for_retry(
        &self,
        max_attempts: u32,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeadLetterRecord>> {
        let mut due: Vec<DeadLetterRecord> = self
            .records
            .iter()
            .filter(|r| r.is_due(max_attempts, cutoff))
            .map(|r| r.value().clone())
            .collect();

        due.sort_by_key(|r| r.last_attempt());
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_resolved(&self, event_id: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .records
            .get_mut(event_id)
            .map(|mut r| r.resolve(at))
            .unwrap_or(false))
    }

    async fn unresolved(&self, query: &UnresolvedQuery) -> Result<Vec<DeadLetterRecord>> {
        let mut out: Vec<DeadLetterRecord> = self
            .records
            .iter()
            .filter(|r| !r.resolved())
            .filter(|r| query.event_type().is_none_or(|t| t == r.event_type()))
            .map(|r| r.value().clone())
            .collect();

        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .collect())
    }

    async fn stats(&self, max_attempts: u32) -> Result<DeadLetterStats> {
        let mut stats = DeadLetterStats::default();
        for r in self.records.iter() {
            stats.total += 1;
            if r.resolved() {
                continue;
            }
            stats.unresolved += 1;
            if r.attempt_count() >= max_attempts {
                stats.max_retries_reached += 1;
            }
            *stats.by_type.entry(r.event_type().to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.resolved() && r.resolved_at().is_some_and(|at| at < cutoff)));
        Ok(before.saturating_sub(self.records.len()))
    }
}
