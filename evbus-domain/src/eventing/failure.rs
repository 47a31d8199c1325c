use crate::domain_event::DomainEvent;
use crate::persist::ErrorSnapshot;
use async_trait::async_trait;

/// 单个处理器的一次失败
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    event: DomainEvent,
    handler: String,
    error: ErrorSnapshot,
}

impl HandlerFailure {
    pub fn new(event: DomainEvent, handler: impl Into<String>, error: ErrorSnapshot) -> Self {
        Self {
            event,
            handler: handler.into(),
            error,
        }
    }

    pub fn event(&self) -> &DomainEvent {
        &self.event
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn error(&self) -> &ErrorSnapshot {
        &self.error
    }

    /// 把一次分发中的多个失败合并为一条错误快照
    pub fn combine(failures: &[HandlerFailure]) -> ErrorSnapshot {
        match failures {
            [single] => single.error.clone(),
            _ => {
                let message = failures
                    .iter()
                    .map(|f| format!("{}: {}", f.handler, f.error.message()))
                    .collect::<Vec<_>>()
                    .join("; ");
                let names = failures
                    .iter()
                    .map(|f| f.handler.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                ErrorSnapshot::builder()
                    .message(message)
                    .name(names)
                    .build()
            }
        }
    }
}

/// 一次分发的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 参与处理的处理器数量
    pub handled: usize,
    /// 其中失败的数量
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// 失败接收方：总线在一次分发结束后把该事件的全部失败同步交给它
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn dispatch_failed(&self, event: &DomainEvent, failures: &[HandlerFailure]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_keeps_single_error_and_joins_many() {
        let ev = DomainEvent::builder().event_type("A").build();
        let one = HandlerFailure::new(
            ev.clone(),
            "h1",
            ErrorSnapshot::builder().message("boom").build(),
        );
        assert_eq!(
            HandlerFailure::combine(std::slice::from_ref(&one)).message(),
            "boom"
        );

        let two = HandlerFailure::new(ev, "h2", ErrorSnapshot::builder().message("bang").build());
        let merged = HandlerFailure::combine(&[one, two]);
        assert_eq!(merged.message(), "h1: boom; h2: bang");
        assert_eq!(merged.name(), Some("h1,h2"));
    }
}
