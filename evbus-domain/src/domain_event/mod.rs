//! 领域事件（Domain Event）
//!
//! 定义总线上流转的不可变事件（`DomainEvent`）、优先级档位（`EventPriority`）、
//! 追踪元数据（`Metadata`）、发布选项（`PublishOptions`），
//! 以及系统内集中维护的事件类型目录与主要事件的强类型载荷。

mod event;
mod metadata;
mod payloads;
mod priority;
mod publish_options;

pub mod event_types;

pub use event::DomainEvent;
pub use metadata::Metadata;
pub use payloads::{
    AntiCheatViolation, AttemptGraded, BadgeEarned, EventPayload, ExamPublished, LevelUp,
    StudentEnrolled, UserRegistered, XpGained,
};
pub use priority::EventPriority;
pub use publish_options::PublishOptions;
