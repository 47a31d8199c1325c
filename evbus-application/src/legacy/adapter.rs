use super::{LegacyEvent, LegacyObserver, LegacyPublisher};
use crate::config::{FeatureFlags, PublishingMode};
use crate::error::AppResult;
use async_trait::async_trait;
use evbus_domain::domain_event::{DomainEvent, EventPriority, Metadata, PublishOptions};
use evbus_domain::eventing::{EventBus, EventHandler, handler_fn};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 双订阅处理器收到的事件：标明来自哪个系统
#[derive(Debug, Clone)]
pub enum SourcedEvent {
    Legacy(LegacyEvent),
    New(DomainEvent),
}

impl SourcedEvent {
    pub fn event_type(&self) -> &str {
        match self {
            SourcedEvent::Legacy(e) => e.event_type(),
            SourcedEvent::New(e) => e.event_type(),
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            SourcedEvent::Legacy(e) => e.data(),
            SourcedEvent::New(e) => e.payload(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            SourcedEvent::Legacy(e) => e.user_id(),
            SourcedEvent::New(e) => e.actor_id(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, SourcedEvent::Legacy(_))
    }
}

type BridgeHandler = Arc<dyn Fn(SourcedEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// 把双订阅处理器挂到旧系统上的观察者；失败只记录日志
struct BridgeObserver {
    name: String,
    interested: Vec<String>,
    handler: BridgeHandler,
}

#[async_trait]
impl LegacyObserver for BridgeObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn interested_events(&self) -> &[String] {
        &self.interested
    }

    async fn update(&self, event: &LegacyEvent) -> anyhow::Result<()> {
        if let Err(err) = (self.handler)(SourcedEvent::Legacy(event.clone())).await {
            error!(
                observer = %self.name,
                event_type = event.event_type(),
                error = %err,
                "error in legacy handler"
            );
        }
        Ok(())
    }
}

/// 新旧事件系统适配器
pub struct LegacyEventAdapter {
    legacy: Arc<dyn LegacyPublisher>,
    bus: Arc<EventBus>,
    mode: PublishingMode,
}

impl LegacyEventAdapter {
    pub fn new(legacy: Arc<dyn LegacyPublisher>, bus: Arc<EventBus>, mode: PublishingMode) -> Self {
        Self { legacy, bus, mode }
    }

    /// 发布模式取自特性开关（新总线未启用时只走旧系统）
    pub fn from_flags(
        legacy: Arc<dyn LegacyPublisher>,
        bus: Arc<EventBus>,
        flags: &FeatureFlags,
    ) -> Self {
        Self::new(legacy, bus, flags.effective_publishing_mode())
    }

    pub fn mode(&self) -> PublishingMode {
        self.mode
    }

    /// 按发布模式路由一个旧格式事件
    pub async fn publish(&self, event: &LegacyEvent) -> AppResult<()> {
        match self.mode {
            PublishingMode::Dual => self.publish_both(event).await,
            PublishingMode::NewOnly => {
                self.bus
                    .publish(Self::convert_to_new_event(event, None))
                    .await?;
                Ok(())
            }
            PublishingMode::LegacyOnly => self.legacy.publish(event).await,
        }
    }

    /// 原样发布到旧系统，并以 NORMAL 优先级转换后发布到新总线
    pub async fn publish_both(&self, event: &LegacyEvent) -> AppResult<()> {
        self.legacy.publish(event).await?;
        self.bus
            .publish(Self::convert_to_new_event(event, None))
            .await?;
        Ok(())
    }

    /// 在两个系统上注册同一个处理器
    ///
    /// 旧系统路径的失败由适配器捕获并记录；新总线路径的失败照常进入死信队列。
    pub fn subscribe_both<F, Fut>(&self, event_type: &str, handler: F)
    where
        F: Fn(SourcedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: BridgeHandler =
            Arc::new(move |event| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(event))
            });
        let name = format!("LegacyAdapter-{event_type}");

        self.legacy.subscribe(Arc::new(BridgeObserver {
            name: name.clone(),
            interested: vec![event_type.to_string()],
            handler: handler.clone(),
        }));

        self.bus.subscribe(
            event_type,
            handler_fn(name, move |event| handler(SourcedEvent::New(event))),
        );

        info!(event_type, "subscribed in both systems");
    }

    /// 只发布到新总线，返回事件 id
    pub async fn publish_new(
        &self,
        event_type: &str,
        data: Value,
        priority: EventPriority,
        user_id: Option<String>,
    ) -> AppResult<String> {
        let options = PublishOptions::builder()
            .priority(priority)
            .maybe_actor_id(user_id)
            .build();
        Ok(self.bus.emit(event_type, data, options).await?)
    }

    /// 只在新总线上订阅
    pub fn subscribe_new(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.bus.subscribe(event_type, handler);
        info!(event_type, "subscribed in new system only");
    }

    /// 旧格式 → 新格式：新 id 与 correlation id，schema 版本 1，缺省 NORMAL
    pub fn convert_to_new_event(
        legacy: &LegacyEvent,
        priority: Option<EventPriority>,
    ) -> DomainEvent {
        DomainEvent::builder()
            .id(Uuid::new_v4().to_string())
            .event_type(legacy.event_type())
            .priority(priority.unwrap_or_default())
            .occurred_at(legacy.timestamp())
            .maybe_actor_id(legacy.user_id().map(str::to_string))
            .payload(legacy.data().clone())
            .metadata(
                Metadata::builder()
                    .correlation_id(Uuid::new_v4().to_string())
                    .schema_version(1)
                    .build(),
            )
            .build()
    }

    /// 新格式 → 旧格式：丢弃 id、优先级与元数据
    pub fn convert_to_legacy_event(event: &DomainEvent) -> LegacyEvent {
        LegacyEvent::builder()
            .event_type(event.event_type())
            .timestamp(event.occurred_at())
            .maybe_user_id(event.actor_id().map(str::to_string))
            .data(event.payload().clone())
            .build()
    }
}
