//! 死信存储（Dead Letter Store）
//!
//! 保存处理失败的事件快照、最近一次错误与尝试次数，每个事件 id 至多一条记录。
//! 重复失败只会累加尝试次数并覆盖错误信息；已解决的记录不会被重新打开。
//!
use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 未解决死信的默认分页大小
pub const DEFAULT_UNRESOLVED_LIMIT: usize = 50;

/// 错误快照（消息、名称与调用栈/错误链）
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    #[builder(into)]
    message: String,
    #[builder(into)]
    name: Option<String>,
    #[builder(into)]
    stack: Option<String>,
}

impl ErrorSnapshot {
    /// 从 anyhow 错误提取快照，`stack` 保存完整错误链
    pub fn from_anyhow(err: &anyhow::Error, name: impl Into<String>) -> Self {
        Self {
            message: err.to_string(),
            name: Some(name.into()),
            stack: Some(format!("{err:?}")),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    event_id: String,
    event_type: String,
    /// 完整事件快照，重试时原样重投
    event: DomainEvent,
    last_error: ErrorSnapshot,
    attempt_count: u32,
    last_attempt: DateTime<Utc>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// 首次失败
    pub fn first_failure(event: &DomainEvent, error: ErrorSnapshot, at: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id().to_string(),
            event_type: event.event_type().to_string(),
            event: event.clone(),
            last_error: error,
            attempt_count: 1,
            last_attempt: at,
            resolved: false,
            resolved_at: None,
            created_at: at,
        }
    }

    /// 由存储后端还原一条记录
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        event: DomainEvent,
        last_error: ErrorSnapshot,
        attempt_count: u32,
        last_attempt: DateTime<Utc>,
        resolved: bool,
        resolved_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event.id().to_string(),
            event_type: event.event_type().to_string(),
            event,
            last_error,
            attempt_count,
            last_attempt,
            resolved,
            resolved_at,
            created_at,
        }
    }

    /// 再次失败：累加次数并覆盖错误，不改变解决状态
    pub fn record_failure(&mut self, error: ErrorSnapshot, at: DateTime<Utc>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_error = error;
        self.last_attempt = at;
    }

    /// 标记已解决，返回是否发生变化（`resolved_at` 只写一次）
    pub fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        true
    }

    /// 是否可被自动重试选中
    pub fn is_due(&self, max_attempts: u32, cutoff: DateTime<Utc>) -> bool {
        !self.resolved && self.attempt_count < max_attempts && self.last_attempt < cutoff
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event(&self) -> &DomainEvent {
        &self.event
    }

    pub fn last_error(&self) -> &ErrorSnapshot {
        &self.last_error
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_attempt(&self) -> DateTime<Utc> {
        self.last_attempt
    }

    pub fn resolved(&self) -> bool {
        self.resolved
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// 未解决死信的分页查询
#[derive(Builder, Debug, Clone)]
pub struct UnresolvedQuery {
    #[builder(into)]
    event_type: Option<String>,
    #[builder(default = DEFAULT_UNRESOLVED_LIMIT)]
    limit: usize,
    #[builder(default)]
    offset: usize,
}

impl Default for UnresolvedQuery {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl UnresolvedQuery {
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// 死信统计（面向看板）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterStats {
    pub total: usize,
    pub unresolved: usize,
    /// 未解决且已耗尽重试次数
    pub max_retries_reached: usize,
    /// 未解决记录按事件类型计数
    pub by_type: BTreeMap<String, usize>,
}

/// 死信存储：按事件 id 原子更新
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// 插入或累加一条失败记录，返回更新后的记录
    async fn record_failure(
        &self,
        event: &DomainEvent,
        error: &ErrorSnapshot,
        at: DateTime<Utc>,
    ) -> Result<DeadLetterRecord>;

    async fn find(&self, event_id: &str) -> Result<Option<DeadLetterRecord>>;

    /// 未解决、次数低于上限且最近一次尝试早于 `cutoff` 的记录，按最近尝试时间正序
    async fn due_for_retry(
        &self,
        max_attempts: u32,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeadLetterRecord>>;

    /// 标记已解决，返回是否有记录发生变化
    async fn mark_resolved(&self, event_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// 未解决记录，按创建时间倒序分页
    async fn unresolved(&self, query: &UnresolvedQuery) -> Result<Vec<DeadLetterRecord>>;

    async fn stats(&self, max_attempts: u32) -> Result<DeadLetterStats>;

    /// 删除在 `cutoff` 之前已解决的记录，返回删除条数
    async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> DomainEvent {
        DomainEvent::builder().id("e-1").event_type("XP_GAINED").build()
    }

    #[test]
    fn repeat_failure_overwrites_error_and_keeps_resolution() {
        let t0 = Utc::now();
        let mut rec = DeadLetterRecord::first_failure(
            &sample(),
            ErrorSnapshot::builder().message("boom").build(),
            t0,
        );
        assert_eq!(rec.attempt_count(), 1);
        assert!(rec.resolve(t0));

        rec.record_failure(
            ErrorSnapshot::builder().message("bang").build(),
            t0 + Duration::seconds(1),
        );
        assert_eq!(rec.attempt_count(), 2);
        assert_eq!(rec.last_error().message(), "bang");
        assert!(rec.resolved());
        assert!(!rec.resolve(t0 + Duration::seconds(2)));
        assert_eq!(rec.resolved_at(), Some(t0));
    }

    #[test]
    fn due_respects_budget_and_interval() {
        let t0 = Utc::now();
        let rec = DeadLetterRecord::first_failure(
            &sample(),
            ErrorSnapshot::builder().message("boom").build(),
            t0,
        );
        assert!(!rec.is_due(3, t0));
        assert!(rec.is_due(3, t0 + Duration::seconds(1)));
        assert!(!rec.is_due(1, t0 + Duration::seconds(1)));
    }
}
