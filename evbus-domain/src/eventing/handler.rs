use crate::domain_event::DomainEvent;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// 事件处理器：处理某一类型的事件
///
/// 返回错误即视为本次处理失败，由总线记录并转交死信队列。
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<()>;

    /// 处理器名称（用于失败记录与日志）
    fn handler_name(&self) -> &str;
}

/// 以闭包实现的处理器
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// 将异步闭包包装为处理器
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

type ErrorCallback = Arc<dyn Fn(&anyhow::Error, &DomainEvent) + Send + Sync>;

/// 错误回调包装器
///
/// 失败时先调用回调（未提供则记录 error 日志），再把错误原样返回，
/// 因此失败仍会进入死信队列。
pub struct SafeHandler {
    inner: Arc<dyn EventHandler>,
    on_error: Option<ErrorCallback>,
}

impl SafeHandler {
    pub fn new(inner: Arc<dyn EventHandler>) -> Self {
        Self {
            inner,
            on_error: None,
        }
    }

    pub fn on_error<C>(mut self, callback: C) -> Self
    where
        C: Fn(&anyhow::Error, &DomainEvent) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn into_handler(self) -> Arc<dyn EventHandler> {
        Arc::new(self)
    }
}

#[async_trait]
impl EventHandler for SafeHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match self.inner.handle(event).await {
            Ok(()) => Ok(()),
            Err(err) => {
                match &self.on_error {
                    Some(callback) => callback(&err, event),
                    None => error!(
                        handler = self.inner.handler_name(),
                        event_id = event.id(),
                        event_type = event.event_type(),
                        error = %err,
                        "error in event handler"
                    ),
                }
                Err(err)
            }
        }
    }

    fn handler_name(&self) -> &str {
        self.inner.handler_name()
    }
}

/// 事件类型到处理器列表的注册表
///
/// 同一类型下按注册顺序保存；分发时取快照，注册与分发互不阻塞。
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    by_type: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub(crate) fn register(&self, event_type: String, handler: Arc<dyn EventHandler>) {
        self.by_type.entry(event_type).or_default().push(handler);
    }

    pub(crate) fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.by_type
            .get(event_type)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        self.by_type.get(event_type).map_or(0, |list| list.len())
    }

    pub(crate) fn clear(&self) {
        self.by_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(ty: &str) -> DomainEvent {
        DomainEvent::builder().event_type(ty).build()
    }

    #[tokio::test]
    async fn registry_keeps_registration_order() {
        let registry = HandlerRegistry::default();
        registry.register("A".into(), handler_fn("first", |_| async { Ok(()) }));
        registry.register("A".into(), handler_fn("second", |_| async { Ok(()) }));
        registry.register("B".into(), handler_fn("other", |_| async { Ok(()) }));

        let names: Vec<String> = registry
            .matching("A")
            .iter()
            .map(|h| h.handler_name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.count("B"), 1);
        assert!(registry.matching("C").is_empty());

        registry.clear();
        assert_eq!(registry.count("A"), 0);
    }

    #[tokio::test]
    async fn safe_handler_reports_then_propagates() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        let handler = SafeHandler::new(handler_fn("flaky", |_| async {
            Err(anyhow::anyhow!("boom"))
        }))
        .on_error(move |err, _| {
            assert_eq!(err.to_string(), "boom");
            seen_cb.fetch_add(1, Ordering::SeqCst);
        })
        .into_handler();

        assert!(handler.handle(&event("A")).await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(handler.handler_name(), "flaky");
    }
}
