//! 领域事件分发基础库（evbus-domain）
//!
//! 提供进程内领域事件分发所需的构件：
//! - 领域事件（`domain_event`）：不可变事件、优先级档位、元数据与事件类型目录；
//! - 事件系统（`eventing`）：优先级总线、处理器注册、死信队列与自动重试；
//! - 持久化（`persist`）：事件日志与死信存储接口及内存/Postgres 实现；
//! - 统一错误类型（`error`）。
//!
//! 典型用法：
//! 1. 构造事件日志与死信存储，注入 `EventBus` 与 `DeadLetterQueue`；
//! 2. 通过 `EventBus::subscribe` 注册处理器；
//! 3. 调用 `EventBus::start` 启动后台 drain，`publish`/`emit` 发布事件；
//! 4. 退出前调用 `EventBus::shutdown` 清空缓冲区。
//!
pub mod domain_event;
pub mod error;
pub mod eventing;
pub mod persist;
