use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 旧系统的事件格式：没有 id、优先级与追踪元数据
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEvent {
    #[serde(rename = "type")]
    #[builder(into)]
    event_type: String,
    #[builder(default = Utc::now())]
    timestamp: DateTime<Utc>,
    #[builder(into)]
    user_id: Option<String>,
    #[builder(default)]
    data: Value,
}

impl LegacyEvent {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}
