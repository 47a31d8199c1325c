//! 旧事件系统适配（legacy）
//!
//! 迁移期间新旧两套事件机制并存：
//! - `LegacyEvent` / `LegacyPublisher` / `LegacyObserver`：旧系统的事件格式与观察者接口；
//! - `LegacyEventAdapter`：双写、双订阅与按发布模式路由，以及两种格式间的转换。
//!
mod adapter;
mod event;
mod publisher;

pub use adapter::{LegacyEventAdapter, SourcedEvent};
pub use event::LegacyEvent;
pub use publisher::{InMemoryLegacyPublisher, LegacyObserver, LegacyPublisher};
