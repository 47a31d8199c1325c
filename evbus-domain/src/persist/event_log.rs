//! 事件日志（Event Log）
//!
//! 事件溯源的持久化形态：每条发布的事件追加一条记录，并在分发完成后
//! 标记为已处理。记录带有过期时间，过期后对查询不可见并由清理任务回收。
//!
use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 历史查询的默认返回条数
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogRecord {
    /// 事件快照
    event: DomainEvent,
    /// 是否已完成分发
    processed: bool,
    /// 完成分发的时间
    processed_at: Option<DateTime<Utc>>,
    /// 写入时间
    created_at: DateTime<Utc>,
    /// 过期时间（created_at + 保留期）
    expires_at: DateTime<Utc>,
}

impl EventLogRecord {
    /// 以未处理状态创建一条新记录
    pub fn new(event: DomainEvent, created_at: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            event,
            processed: false,
            processed_at: None,
            created_at,
            expires_at: created_at + retention,
        }
    }

    /// 由存储后端还原一条记录
    pub fn restore(
        event: DomainEvent,
        processed: bool,
        processed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            processed,
            processed_at,
            created_at,
            expires_at,
        }
    }

    pub fn event(&self) -> &DomainEvent {
        &self.event
    }

    pub fn event_id(&self) -> &str {
        self.event.id()
    }

    pub fn processed(&self) -> bool {
        self.processed
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn into_event(self) -> DomainEvent {
        self.event
    }

    /// 标记为已处理；已处理的记录保持首次处理时间
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        if !self.processed {
            self.processed = true;
            self.processed_at = Some(at);
        }
    }
}

/// 历史查询条件（全部可选，按时间倒序返回）
#[derive(Builder, Debug, Clone)]
pub struct EventFilter {
    #[builder(into)]
    event_type: Option<String>,
    #[builder(into)]
    actor_id: Option<String>,
    #[builder(into)]
    correlation_id: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    #[builder(default = DEFAULT_HISTORY_LIMIT)]
    limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventFilter {
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 记录是否满足条件（时间区间两端均为闭区间）
    pub fn matches(&self, record: &EventLogRecord) -> bool {
        let ev = record.event();
        if self.event_type().is_some_and(|t| t != ev.event_type()) {
            return false;
        }
        if self.actor_id.is_some() && self.actor_id() != ev.actor_id() {
            return false;
        }
        if self.correlation_id.is_some() && self.correlation_id() != ev.correlation_id() {
            return false;
        }
        if self.start.is_some_and(|s| ev.occurred_at() < s) {
            return false;
        }
        if self.end.is_some_and(|e| ev.occurred_at() > e) {
            return false;
        }
        true
    }
}

/// 事件日志存储：只追加，按事件 id 唯一
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// 追加记录；事件 id 已存在时返回 `DuplicateEvent`
    async fn append(&self, record: EventLogRecord) -> Result<()>;

    /// 标记事件已处理，返回是否命中记录
    async fn mark_processed(&self, event_id: &str, processed_at: DateTime<Utc>) -> Result<bool>;

    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>>;

    /// 按条件查询，时间倒序，最多 `filter.limit()` 条
    async fn history(&self, filter: &EventFilter) -> Result<Vec<EventLogRecord>>;

    /// 取出闭区间内的记录，时间正序；`event_types` 为空表示不过滤类型
    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: &[String],
    ) -> Result<Vec<EventLogRecord>>;

    /// 删除已过期记录，返回删除条数
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
