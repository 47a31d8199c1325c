use bon::Builder;
use serde::{Deserialize, Serialize};

/// 事件追踪元数据
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// 关联ID，用于追踪一次完整的业务事务
    correlation_id: Option<String>,
    /// 因果ID，指向触发本事件的父事件
    causation_id: Option<String>,
    /// 事件载荷的 schema 版本
    #[builder(default = 1)]
    schema_version: u32,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            correlation_id: None,
            causation_id: None,
            schema_version: 1,
        }
    }
}

impl Metadata {
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }
}
