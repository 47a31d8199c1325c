//! 内存版事件日志（InMemoryEventLog）
//!
//! 基于 `DashMap` 的事件日志实现，按事件 id 唯一、单条记录原子更新。
//! 过期记录对查询不可见，`purge_expired` 时物理删除。
//! 典型用途：测试环境、示例与未接入数据库的本地开发。

use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{EventFilter, EventLogRecord, EventLogStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct Stored {
    /// 写入序号，同一时间戳的记录按写入顺序排列
    seq: u64,
    record: EventLogRecord,
}

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: DashMap<String, Stored>,
    seq: AtomicU64,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的记录数（含尚未清理的过期记录）
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn live(&self, now: DateTime<Utc>) -> Vec<Stored> {
        self.records
            .iter()
            .filter(|s| !s.record.is_expired(now))
            .map(|s| s.value().clone())
            .collect()
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLog {
    async fn append(&self, record: EventLogRecord) -> Result<()> {
        match self.records.entry(record.event_id().to_string()) {
            Entry::Occupied(e) => Err(DomainError::DuplicateEvent {
                event_id: e.key().clone(),
            }),
            Entry::Vacant(v) => {
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                v.insert(Stored { seq, record });
                Ok(())
            }
        }
    }

    async fn mark_processed(&self, event_id: &str, processed_at: DateTime<Utc>) -> Result<bool> {
        match self.records.get_mut(event_id) {
            Some(mut stored) => {
                stored.record.mark_processed(processed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>> {
        let now = Utc::now();
        Ok(self
            .records
            .get(event_id)
            .filter(|s| !s.record.is_expired(now))
            .map(|s| s.record.clone()))
    }

    async fn history(&self, filter: &EventFilter) -> Result<Vec<EventLogRecord>> {
        let mut hits: Vec<Stored> = self
            .live(Utc::now())
            .into_iter()
            .filter(|s| filter.matches(&s.record))
            .collect();

        hits.sort_by(|a, b| {
            b.record
                .event()
                .occurred_at()
                .cmp(&a.record.event().occurred_at())
                .then(b.seq.cmp(&a.seq))
        });
        hits.truncate(filter.limit());

        Ok(hits.into_iter().map(|s| s.record).collect())
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: &[String],
    ) -> Result<Vec<EventLogRecord>> {
        let mut hits: Vec<Stored> = self
            .live(Utc::now())
            .into_iter()
            .filter(|s| {
                let ev = s.record.event();
                ev.occurred_at() >= start
                    && ev.occurred_at() <= end
                    && (event_types.is_empty()
                        || event_types.iter().any(|t| t == ev.event_type()))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.record
                .event()
                .occurred_at()
                .cmp(&b.record.event().occurred_at())
                .then(a.seq.cmp(&b.seq))
        });

        Ok(hits.into_iter().map(|s| s.record).collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, s| !s.record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
