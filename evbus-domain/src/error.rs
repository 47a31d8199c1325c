//! 领域层统一错误定义
//!
//! 聚焦事件校验、事件总线、事件日志与死信存储等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 事件系统 ---
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    // --- 持久化 ---
    #[error("event log error: {reason}")]
    EventLog { reason: String },
    #[error("duplicate event: id={event_id}")]
    DuplicateEvent { event_id: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

impl DomainError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        DomainError::EventBus {
            reason: reason.into(),
        }
    }

    pub fn invalid_event(reason: impl Into<String>) -> Self {
        DomainError::InvalidEvent {
            reason: reason.into(),
        }
    }

    pub fn event_log(reason: impl Into<String>) -> Self {
        DomainError::EventLog {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}
