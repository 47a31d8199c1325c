use super::{DomainEvent, EventPriority, Metadata};
use bon::Builder;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// 发布选项：由发布辅助方法补全事件的 id、时间与追踪信息
///
/// - `priority` 缺省为 `Normal`；
/// - `correlation_id` 缺省生成新的 UUID（即开启一条新的事务链路）；
/// - `version` 缺省为 1。
#[derive(Builder, Debug, Clone, Default)]
pub struct PublishOptions {
    priority: Option<EventPriority>,
    actor_id: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    version: Option<u32>,
}

impl PublishOptions {
    /// 以当前选项构造一个新的领域事件
    pub fn into_event(self, event_type: impl Into<String>, payload: Value) -> DomainEvent {
        let metadata = Metadata::builder()
            .correlation_id(
                self.correlation_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            )
            .maybe_causation_id(self.causation_id)
            .schema_version(self.version.unwrap_or(1))
            .build();

        DomainEvent::builder()
            .id(Uuid::new_v4().to_string())
            .event_type(event_type)
            .priority(self.priority.unwrap_or_default())
            .occurred_at(Utc::now())
            .maybe_actor_id(self.actor_id)
            .payload(payload)
            .metadata(metadata)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_a_new_correlation() {
        let a = PublishOptions::default().into_event("USER_LOGIN", Value::Null);
        let b = PublishOptions::default().into_event("USER_LOGIN", Value::Null);
        assert_eq!(a.priority(), EventPriority::Normal);
        assert_ne!(a.id(), b.id());
        assert!(a.correlation_id().is_some());
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert_eq!(a.metadata().schema_version(), 1);
    }

    #[test]
    fn explicit_chain_is_kept() {
        let ev = PublishOptions::builder()
            .priority(EventPriority::High)
            .actor_id("u-1".to_string())
            .correlation_id("cor-1".to_string())
            .causation_id("parent".to_string())
            .version(2)
            .build()
            .into_event("LEVEL_UP", serde_json::json!({"newLevel": 3}));
        assert_eq!(ev.priority(), EventPriority::High);
        assert_eq!(ev.actor_id(), Some("u-1"));
        assert_eq!(ev.correlation_id(), Some("cor-1"));
        assert_eq!(ev.metadata().causation_id(), Some("parent"));
        assert_eq!(ev.metadata().schema_version(), 2);
    }
}
