//! 事件系统（eventing）
//!
//! - `EventBus`：优先级缓冲、CRITICAL 同步分发、事件日志写入与回放；
//! - `EventHandler`：按事件类型注册的处理器；
//! - `DeadLetterQueue`：失败事件的累计、自动重试与人工解决。
//!
mod bus;
mod dead_letter;
mod failure;
mod handler;
mod priority_queue;
mod worker;

pub use bus::{BusMetrics, DrainReport, EventBus, EventBusConfig};
pub use dead_letter::{DeadLetterConfig, DeadLetterQueue, RetryReport};
pub use failure::{DispatchReport, FailureSink, HandlerFailure};
pub use handler::{EventHandler, FnHandler, SafeHandler, handler_fn};
pub use priority_queue::QueueStats;
