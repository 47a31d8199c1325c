use super::LegacyEvent;
use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// 旧系统的观察者
#[async_trait]
pub trait LegacyObserver: Send + Sync {
    fn name(&self) -> &str;

    /// 关注的事件类型
    fn interested_events(&self) -> &[String];

    async fn update(&self, event: &LegacyEvent) -> anyhow::Result<()>;
}

/// 旧系统的发布器
#[async_trait]
pub trait LegacyPublisher: Send + Sync {
    async fn publish(&self, event: &LegacyEvent) -> AppResult<()>;

    fn subscribe(&self, observer: Arc<dyn LegacyObserver>);
}

/// 内存版旧发布器：按订阅顺序依次通知关注该类型的观察者
#[derive(Default)]
pub struct InMemoryLegacyPublisher {
    observers: RwLock<Vec<Arc<dyn LegacyObserver>>>,
}

impl InMemoryLegacyPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LegacyPublisher for InMemoryLegacyPublisher {
    async fn publish(&self, event: &LegacyEvent) -> AppResult<()> {
        let targets: Vec<Arc<dyn LegacyObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|o| o.interested_events().iter().any(|t| t == event.event_type()))
            .cloned()
            .collect();

        debug!(
            event_type = event.event_type(),
            observers = targets.len(),
            "legacy event published"
        );

        for observer in targets {
            if let Err(err) = observer.update(event).await {
                error!(
                    observer = observer.name(),
                    event_type = event.event_type(),
                    error = %err,
                    "legacy observer failed"
                );
            }
        }
        Ok(())
    }

    fn subscribe(&self, observer: Arc<dyn LegacyObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}
