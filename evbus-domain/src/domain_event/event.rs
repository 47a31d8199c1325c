use super::{EventPriority, Metadata};
use crate::error::{DomainError, DomainResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 领域事件：发布后不可变的事实记录
///
/// 由生产者在发布时创建，总线、事件日志与死信队列都只读取其快照。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct DomainEvent {
    /// 事件唯一标识符（默认 UUID v4）
    #[builder(into, default = Uuid::new_v4().to_string())]
    id: String,
    /// 事件类型，订阅按该字符串精确匹配
    #[serde(rename = "type")]
    #[builder(into)]
    event_type: String,
    /// 分发优先级
    #[builder(default)]
    priority: EventPriority,
    /// 事件发生时间
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
    /// 触发事件的主体 ID
    actor_id: Option<String>,
    /// 事件负载
    #[builder(default)]
    payload: Value,
    /// 追踪元数据
    #[builder(default)]
    metadata: Metadata,
}

impl DomainEvent {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.correlation_id()
    }

    /// 发布前的最小校验：id 与类型不可为空
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::invalid_event("event id is required"));
        }
        if self.event_type.trim().is_empty() {
            return Err(DomainError::invalid_event(format!(
                "event type is required (id={})",
                self.id
            )));
        }
        Ok(())
    }

    /// 将负载反序列化为强类型结构
    pub fn payload_as<T: DeserializeOwned>(&self) -> DomainResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let ev = DomainEvent::builder().event_type("USER_LOGIN").build();
        assert!(!ev.id().is_empty());
        assert_eq!(ev.priority(), EventPriority::Normal);
        assert_eq!(ev.metadata().schema_version(), 1);
        assert!(ev.payload().is_null());
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_type() {
        let ev = DomainEvent::builder().id("e-1").event_type("  ").build();
        match ev.validate() {
            Err(DomainError::InvalidEvent { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wire_form_uses_type_key() {
        let ev = DomainEvent::builder()
            .id("e-1")
            .event_type("XP_GAINED")
            .priority(EventPriority::High)
            .payload(serde_json::json!({"amount": 10}))
            .build();
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "XP_GAINED");
        assert_eq!(v["priority"], "HIGH");
    }
}
