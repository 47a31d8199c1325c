//! 持久化（persist）
//!
//! 定义事件总线依赖的两类存储及其实现：
//! - 事件日志（`EventLogStore`）：只追加的事件溯源记录，支持历史查询、区间回放与保留期清理；
//! - 死信存储（`DeadLetterStore`）：失败事件的按 id 原子 upsert、重试选取与统计。
//!
//! 默认提供内存实现；开启 `infra-sqlx` 特性后提供 Postgres 实现。
//! 存储句柄由组合根构造一次后注入总线与死信队列。
//!
mod dead_letter_inmemory;
mod dead_letter_store;
mod event_log;
mod event_log_inmemory;

#[cfg(feature = "infra-sqlx")]
pub mod postgres;

pub use dead_letter_inmemory::InMemoryDeadLetterStore;
pub use dead_letter_store::{
    DEFAULT_UNRESOLVED_LIMIT, DeadLetterRecord, DeadLetterStats, DeadLetterStore, ErrorSnapshot,
    UnresolvedQuery,
};
pub use event_log::{DEFAULT_HISTORY_LIMIT, EventFilter, EventLogRecord, EventLogStore};
pub use event_log_inmemory::InMemoryEventLog;
