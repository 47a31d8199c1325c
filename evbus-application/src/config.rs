//! 特性开关（Feature Flags）
//!
//! 迁移期的全部开关均来自环境变量（启动时先加载 `.env`）：
//! - 新总线、模块化结构与各模块的启用状态；
//! - 死信队列与事件溯源（缺省开启，显式设为 `false` 才关闭）；
//! - 发布模式、重试间隔、重试上限、drain 间隔与事件保留天数。
//!
//! 解析失败与取值越界都以 `ConfigError` 返回，由启动流程视为致命错误。
//!
use dotenv::dotenv;
use evbus_domain::eventing::{DeadLetterConfig, EventBusConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const USE_NEW_EVENT_BUS: &str = "USE_NEW_EVENT_BUS";
const USE_MODULAR_STRUCTURE: &str = "USE_MODULAR_STRUCTURE";
const ENABLE_DEAD_LETTER_QUEUE: &str = "ENABLE_DEAD_LETTER_QUEUE";
const ENABLE_EVENT_SOURCING: &str = "ENABLE_EVENT_SOURCING";
const EVENT_PUBLISHING_MODE: &str = "EVENT_PUBLISHING_MODE";
const DLQ_RETRY_INTERVAL: &str = "DLQ_RETRY_INTERVAL";
const DLQ_MAX_RETRIES: &str = "DLQ_MAX_RETRIES";
const EVENT_QUEUE_PROCESSING_INTERVAL: &str = "EVENT_QUEUE_PROCESSING_INTERVAL";
const EVENT_STORE_TTL_DAYS: &str = "EVENT_STORE_TTL_DAYS";
const VERBOSE_EVENT_LOGGING: &str = "VERBOSE_EVENT_LOGGING";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Parse {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },
}

/// 可按特性开关启用的业务模块
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleName {
    Auth,
    AcademicStructure,
    Invitations,
    Assessments,
    ExamExecution,
    Gamification,
    Analytics,
    Messaging,
}

impl ModuleName {
    pub const ALL: [ModuleName; 8] = [
        ModuleName::Auth,
        ModuleName::AcademicStructure,
        ModuleName::Invitations,
        ModuleName::Assessments,
        ModuleName::ExamExecution,
        ModuleName::Gamification,
        ModuleName::Analytics,
        ModuleName::Messaging,
    ];

    /// 模块路径名
    pub const fn as_str(self) -> &'static str {
        match self {
            ModuleName::Auth => "auth",
            ModuleName::AcademicStructure => "academic-structure",
            ModuleName::Invitations => "invitations",
            ModuleName::Assessments => "assessments",
            ModuleName::ExamExecution => "exam-execution",
            ModuleName::Gamification => "gamification",
            ModuleName::Analytics => "analytics",
            ModuleName::Messaging => "messaging",
        }
    }

    /// 启用开关对应的环境变量名
    pub const fn env_key(self) -> &'static str {
        match self {
            ModuleName::Auth => "MODULE_AUTH_ENABLED",
            ModuleName::AcademicStructure => "MODULE_ACADEMIC_STRUCTURE_ENABLED",
            ModuleName::Invitations => "MODULE_INVITATIONS_ENABLED",
            ModuleName::Assessments => "MODULE_ASSESSMENTS_ENABLED",
            ModuleName::ExamExecution => "MODULE_EXAM_EXECUTION_ENABLED",
            ModuleName::Gamification => "MODULE_GAMIFICATION_ENABLED",
            ModuleName::Analytics => "MODULE_ANALYTICS_ENABLED",
            ModuleName::Messaging => "MODULE_MESSAGING_ENABLED",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown module: {s}"))
    }
}

/// 过渡期的发布模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishingMode {
    /// 同时发布到旧系统与新总线
    #[default]
    Dual,
    /// 只发布到新总线
    NewOnly,
    /// 只发布到旧系统
    LegacyOnly,
}

impl PublishingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            PublishingMode::Dual => "dual",
            PublishingMode::NewOnly => "new-only",
            PublishingMode::LegacyOnly => "legacy-only",
        }
    }
}

impl fmt::Display for PublishingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual" => Ok(PublishingMode::Dual),
            "new-only" => Ok(PublishingMode::NewOnly),
            "legacy-only" => Ok(PublishingMode::LegacyOnly),
            other => Err(format!(
                "expected one of dual, new-only, legacy-only, got {other}"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    pub use_new_event_bus: bool,
    pub use_modular_structure: bool,
    pub modules_enabled: BTreeSet<ModuleName>,
    pub enable_dead_letter_queue: bool,
    pub enable_event_sourcing: bool,
    pub publishing_mode: PublishingMode,
    /// 死信自动重试间隔（毫秒）
    pub dlq_retry_interval_ms: u64,
    pub dlq_max_retries: u32,
    /// 缓冲区 drain 间隔（毫秒）
    pub queue_processing_interval_ms: u64,
    pub event_store_ttl_days: u32,
    pub verbose_event_logging: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            use_new_event_bus: false,
            use_modular_structure: false,
            modules_enabled: BTreeSet::new(),
            enable_dead_letter_queue: true,
            enable_event_sourcing: true,
            publishing_mode: PublishingMode::Dual,
            dlq_retry_interval_ms: 300_000,
            dlq_max_retries: 3,
            queue_processing_interval_ms: 100,
            event_store_ttl_days: 90,
            verbose_event_logging: false,
        }
    }
}

impl FeatureFlags {
    /// 加载 `.env` 后从进程环境读取
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取，未设置的键取缺省值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let is_true = |key: &str| lookup(key).is_some_and(|v| v == "true");
        let not_false = |key: &str| lookup(key).is_none_or(|v| v != "false");

        let modules_enabled = ModuleName::ALL
            .into_iter()
            .filter(|m| is_true(m.env_key()))
            .collect();

        let publishing_mode = match lookup(EVENT_PUBLISHING_MODE) {
            Some(raw) => raw.parse::<PublishingMode>().map_err(|reason| ConfigError::Parse {
                key: EVENT_PUBLISHING_MODE,
                value: raw.clone(),
                reason,
            })?,
            None => defaults.publishing_mode,
        };

        Ok(Self {
            use_new_event_bus: is_true(USE_NEW_EVENT_BUS),
            use_modular_structure: is_true(USE_MODULAR_STRUCTURE),
            modules_enabled,
            enable_dead_letter_queue: not_false(ENABLE_DEAD_LETTER_QUEUE),
            enable_event_sourcing: not_false(ENABLE_EVENT_SOURCING),
            publishing_mode,
            dlq_retry_interval_ms: parse_number(
                &lookup,
                DLQ_RETRY_INTERVAL,
                defaults.dlq_retry_interval_ms,
            )?,
            dlq_max_retries: parse_number(&lookup, DLQ_MAX_RETRIES, defaults.dlq_max_retries)?,
            queue_processing_interval_ms: parse_number(
                &lookup,
                EVENT_QUEUE_PROCESSING_INTERVAL,
                defaults.queue_processing_interval_ms,
            )?,
            event_store_ttl_days: parse_number(
                &lookup,
                EVENT_STORE_TTL_DAYS,
                defaults.event_store_ttl_days,
            )?,
            verbose_event_logging: is_true(VERBOSE_EVENT_LOGGING),
        })
    }

    /// 全部校验失败项
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.dlq_max_retries < 1 {
            errors.push(format!("{DLQ_MAX_RETRIES} must be >= 1"));
        }
        if self.dlq_retry_interval_ms < 1000 {
            errors.push(format!("{DLQ_RETRY_INTERVAL} must be >= 1000ms"));
        }
        if self.queue_processing_interval_ms < 10 {
            errors.push(format!("{EVENT_QUEUE_PROCESSING_INTERVAL} must be >= 10ms"));
        }
        if self.event_store_ttl_days < 1 {
            errors.push(format!("{EVENT_STORE_TTL_DAYS} must be >= 1"));
        }
        if !self.use_modular_structure && !self.modules_enabled.is_empty() {
            errors.push(format!(
                "Modules are enabled but {USE_MODULAR_STRUCTURE} is false"
            ));
        }

        errors
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { errors })
        }
    }

    pub fn is_module_enabled(&self, module: ModuleName) -> bool {
        self.modules_enabled.contains(&module)
    }

    /// 已启用的模块（按声明顺序）
    pub fn enabled_modules(&self) -> Vec<ModuleName> {
        self.modules_enabled.iter().copied().collect()
    }

    /// 新总线未启用时一律只走旧系统
    pub fn effective_publishing_mode(&self) -> PublishingMode {
        if self.use_new_event_bus {
            self.publishing_mode
        } else {
            PublishingMode::LegacyOnly
        }
    }

    pub fn bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            drain_interval: Duration::from_millis(self.queue_processing_interval_ms),
            retention: Duration::from_secs(u64::from(self.event_store_ttl_days) * 24 * 60 * 60),
            ..Default::default()
        }
    }

    pub fn dead_letter_config(&self) -> DeadLetterConfig {
        DeadLetterConfig {
            max_retries: self.dlq_max_retries,
            retry_interval: Duration::from_millis(self.dlq_retry_interval_ms),
            ..Default::default()
        }
    }

    /// 启动时输出当前配置
    pub fn log_summary(&self) {
        let enabled: Vec<&str> = self.modules_enabled.iter().map(|m| m.as_str()).collect();
        info!(
            new_event_bus = self.use_new_event_bus,
            modular_structure = self.use_modular_structure,
            event_sourcing = self.enable_event_sourcing,
            dead_letter_queue = self.enable_dead_letter_queue,
            publishing_mode = %self.publishing_mode,
            enabled_modules = enabled.len(),
            total_modules = ModuleName::ALL.len(),
            "feature flags loaded"
        );
        if !enabled.is_empty() {
            info!(modules = %enabled.join(", "), "enabled modules");
        }
    }
}

fn parse_number<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Parse {
            key,
            value: raw.clone(),
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn flags(pairs: &[(&str, &str)]) -> Result<FeatureFlags, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FeatureFlags::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let f = flags(&[]).unwrap();
        assert_eq!(f, FeatureFlags::default());
        assert!(f.enable_dead_letter_queue);
        assert!(f.enable_event_sourcing);
        assert!(!f.use_new_event_bus);
        assert_eq!(f.publishing_mode, PublishingMode::Dual);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn default_true_flags_only_turn_off_on_literal_false() {
        let f = flags(&[
            ("ENABLE_DEAD_LETTER_QUEUE", "false"),
            ("ENABLE_EVENT_SOURCING", "no"),
            ("USE_NEW_EVENT_BUS", "TRUE"),
        ])
        .unwrap();
        assert!(!f.enable_dead_letter_queue);
        assert!(f.enable_event_sourcing);
        assert!(!f.use_new_event_bus);
    }

    #[test]
    fn modules_are_read_from_their_own_keys() {
        let f = flags(&[
            ("USE_MODULAR_STRUCTURE", "true"),
            ("MODULE_GAMIFICATION_ENABLED", "true"),
            ("MODULE_ACADEMIC_STRUCTURE_ENABLED", "true"),
            ("MODULE_AUTH_ENABLED", "false"),
        ])
        .unwrap();
        assert_eq!(
            f.enabled_modules(),
            vec![ModuleName::AcademicStructure, ModuleName::Gamification]
        );
        assert!(f.is_module_enabled(ModuleName::Gamification));
        assert!(!f.is_module_enabled(ModuleName::Auth));
        assert!(f.validate().is_ok());
    }

    #[test]
    fn validation_collects_every_violation() {
        let f = flags(&[
            ("DLQ_MAX_RETRIES", "0"),
            ("DLQ_RETRY_INTERVAL", "999"),
            ("EVENT_QUEUE_PROCESSING_INTERVAL", "5"),
            ("EVENT_STORE_TTL_DAYS", "0"),
            ("MODULE_MESSAGING_ENABLED", "true"),
        ])
        .unwrap();

        match f.validate() {
            Err(ConfigError::Invalid { errors }) => {
                assert_eq!(errors.len(), 5);
                assert!(errors.iter().any(|e| e.contains("USE_MODULAR_STRUCTURE")));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            flags(&[("DLQ_MAX_RETRIES", "three")]),
            Err(ConfigError::Parse { key: "DLQ_MAX_RETRIES", .. })
        ));
        assert!(matches!(
            flags(&[("EVENT_PUBLISHING_MODE", "both")]),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(
            flags(&[("EVENT_PUBLISHING_MODE", "new-only")])
                .unwrap()
                .publishing_mode,
            PublishingMode::NewOnly
        );
    }

    #[test]
    fn legacy_only_unless_new_bus_enabled() {
        let mut f = FeatureFlags {
            publishing_mode: PublishingMode::NewOnly,
            ..Default::default()
        };
        assert_eq!(f.effective_publishing_mode(), PublishingMode::LegacyOnly);
        f.use_new_event_bus = true;
        assert_eq!(f.effective_publishing_mode(), PublishingMode::NewOnly);
    }

    #[test]
    fn durations_follow_flags() {
        let f = FeatureFlags {
            queue_processing_interval_ms: 250,
            dlq_retry_interval_ms: 2_000,
            dlq_max_retries: 5,
            event_store_ttl_days: 1,
            ..Default::default()
        };
        assert_eq!(f.bus_config().drain_interval, Duration::from_millis(250));
        assert_eq!(f.bus_config().retention, Duration::from_secs(86_400));
        assert_eq!(f.dead_letter_config().retry_interval, Duration::from_secs(2));
        assert_eq!(f.dead_letter_config().max_retries, 5);
    }

    #[test]
    fn module_names_round_trip_through_paths() {
        for m in ModuleName::ALL {
            assert_eq!(m.as_str().parse::<ModuleName>().unwrap(), m);
        }
    }
}
