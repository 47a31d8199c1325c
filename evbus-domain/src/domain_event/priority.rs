use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件优先级（数值越小越优先）
///
/// - `Critical`：防作弊、支付、安全类事件，发布时同步分发，不进入缓冲；
/// - `High`：重要通知、游戏化；
/// - `Normal`：常规事件（默认）；
/// - `Low`：统计分析、日志。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl EventPriority {
    /// 按分发先后排列的全部档位
    pub const ALL: [EventPriority; 4] = [
        EventPriority::Critical,
        EventPriority::High,
        EventPriority::Normal,
        EventPriority::Low,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(EventPriority::Critical),
            1 => Some(EventPriority::High),
            2 => Some(EventPriority::Normal),
            3 => Some(EventPriority::Low),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EventPriority::Critical => "critical",
            EventPriority::High => "high",
            EventPriority::Normal => "normal",
            EventPriority::Low => "low",
        }
    }

    /// 是否绕过缓冲、在发布调用内同步分发
    pub const fn is_inline(self) -> bool {
        matches!(self, EventPriority::Critical)
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
