//! 应用层（evbus-application）
//!
//! 在领域层事件系统之上提供迁移期的应用编排：
//! - 特性开关（`config`）：从环境变量读取并校验；
//! - 模块注册表（`module_registry`）：按开关加载已迁移模块的事件处理器；
//! - 启动器（`bootstrap`）：串行化的启动、统计与优雅关闭；
//! - 旧系统适配（`legacy`）：双写、双订阅与格式转换。
//!
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod legacy;
pub mod module_registry;

pub use bootstrap::{AppStats, ApplicationBootstrap, EventSystem};
pub use config::{FeatureFlags, ModuleName, PublishingMode};
pub use error::{AppError, AppResult};
pub use module_registry::{FeatureModule, ModuleRegistry};
