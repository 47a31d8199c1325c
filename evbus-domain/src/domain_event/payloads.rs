use super::event_types;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 强类型事件载荷：绑定固定的事件类型字符串
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    const EVENT_TYPE: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub name: String,
    pub email: String,
    pub role: String,
}

impl EventPayload for UserRegistered {
    const EVENT_TYPE: &'static str = event_types::USER_REGISTERED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEnrolled {
    pub class_id: String,
    pub class_name: String,
    pub user_name: String,
    pub user_email: String,
}

impl EventPayload for StudentEnrolled {
    const EVENT_TYPE: &'static str = event_types::STUDENT_ENROLLED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptGraded {
    pub attempt_id: String,
    pub exam_id: String,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub passed: bool,
}

impl EventPayload for AttemptGraded {
    const EVENT_TYPE: &'static str = event_types::ATTEMPT_GRADED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGained {
    pub amount: u32,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub new_total: u64,
}

impl EventPayload for XpGained {
    const EVENT_TYPE: &'static str = event_types::XP_GAINED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeEarned {
    pub badge_id: String,
    pub badge_name: String,
    pub badge_icon: String,
    pub badge_rarity: String,
    pub points_awarded: u32,
}

impl EventPayload for BadgeEarned {
    const EVENT_TYPE: &'static str = event_types::BADGE_EARNED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
    #[serde(default)]
    pub level_info: serde_json::Value,
}

impl EventPayload for LevelUp {
    const EVENT_TYPE: &'static str = event_types::LEVEL_UP;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPublished {
    pub exam_id: String,
    pub exam_title: String,
    pub class_id: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl EventPayload for ExamPublished {
    const EVENT_TYPE: &'static str = event_types::EXAM_PUBLISHED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiCheatViolation {
    pub attempt_id: String,
    pub exam_id: String,
    pub violation_type: String,
    pub timestamp: DateTime<Utc>,
}

impl EventPayload for AntiCheatViolation {
    const EVENT_TYPE: &'static str = event_types::ANTI_CHEAT_VIOLATION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::PublishOptions;

    #[test]
    fn typed_payload_reads_back_from_event() {
        let payload = XpGained {
            amount: 50,
            source: "EXAM_COMPLETION".into(),
            source_id: None,
            new_total: 450,
        };
        let ev = PublishOptions::default()
            .into_event(XpGained::EVENT_TYPE, serde_json::to_value(&payload).unwrap());
        assert_eq!(ev.event_type(), "XP_GAINED");
        assert_eq!(ev.payload()["newTotal"], 450);
        let back: XpGained = ev.payload_as().unwrap();
        assert_eq!(back, payload);
    }
}
