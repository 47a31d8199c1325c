//! 事件总线（EventBus）
//!
//! 进程内的优先级事件分发：
//! - `publish`：校验 → 尽力写入事件日志 → CRITICAL 同步分发，其余按优先级入缓冲区；
//! - 后台 drain 任务按 CRITICAL → HIGH → NORMAL → LOW 的顺序清空缓冲区；
//! - 处理器失败同步交给已注册的 `FailureSink`（死信队列），并广播到失败信号流；
//! - 事件日志的历史查询、区间回放与保留期清理。
//!
use super::failure::{DispatchReport, FailureSink, HandlerFailure};
use super::handler::{EventHandler, HandlerRegistry};
use super::priority_queue::{PriorityQueues, QueueStats};
use super::worker::{InFlight, Workers, lock, spawn_periodic};
use crate::domain_event::{DomainEvent, EventPayload, EventPriority, PublishOptions};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{ErrorSnapshot, EventFilter, EventLogRecord, EventLogStore};
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

/// 失败信号广播通道容量；慢订阅者会丢失最早的信号
const FAILURE_SIGNAL_CAPACITY: usize = 1024;

/// 事件总线配置
#[derive(Clone, Copy, Debug)]
pub struct EventBusConfig {
    /// 缓冲区 drain 间隔
    pub drain_interval: Duration,
    /// 事件日志保留期
    pub retention: Duration,
    /// 过期记录清理间隔
    pub retention_sweep_interval: Duration,
    /// 单事件的处理并发（同一事件广播给多个 handler）
    pub handler_concurrency: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(100),
            retention: Duration::from_secs(90 * 24 * 60 * 60),
            retention_sweep_interval: Duration::from_secs(60 * 60),
            handler_concurrency: 8,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    inline: AtomicU64,
    dispatched: AtomicU64,
    handler_failures: AtomicU64,
    degraded: AtomicU64,
}

/// 总线运行计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusMetrics {
    /// 进入缓冲区的事件数
    pub enqueued: u64,
    /// CRITICAL 同步分发的事件数
    pub inline: u64,
    /// 完成分发的事件数（含失败）
    pub dispatched: u64,
    /// 处理器失败次数
    pub handler_failures: u64,
    /// 事件日志写入失败、仅在内存中分发的事件数
    pub degraded: u64,
}

/// 一轮 drain 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 已有一轮 drain 在进行，本轮跳过
    pub skipped: bool,
    /// 本轮各优先级分发的事件数
    pub dispatched: QueueStats,
}

#[derive(Builder)]
pub struct EventBus {
    /// 事件日志；缺省时不做持久化，历史与回放返回空
    event_log: Option<Arc<dyn EventLogStore>>,
    #[builder(default)]
    config: EventBusConfig,
    #[builder(skip)]
    queues: PriorityQueues,
    #[builder(skip)]
    registry: HandlerRegistry,
    #[builder(skip)]
    sinks: RwLock<Vec<Weak<dyn FailureSink>>>,
    #[builder(skip = broadcast::channel(FAILURE_SIGNAL_CAPACITY).0)]
    failure_tx: broadcast::Sender<HandlerFailure>,
    #[builder(skip)]
    counters: Counters,
    #[builder(skip)]
    draining: AtomicBool,
    #[builder(skip)]
    closed: AtomicBool,
    #[builder(skip)]
    workers: Mutex<Option<Workers>>,
}

impl EventBus {
    /// 仅内存分发、使用默认配置的总线
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn has_event_log(&self) -> bool {
        self.event_log.is_some()
    }

    /// 启动后台 drain 与保留期清理任务；重复调用只记录警告
    pub fn start(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) {
            warn!("event bus has been shut down, refusing to start");
            return;
        }

        let mut guard = lock(&self.workers);
        if guard.is_some() {
            warn!("event bus already started");
            return;
        }

        let mut workers = Workers::new();

        // drain worker
        {
            let bus = Arc::downgrade(self);
            workers.push(spawn_periodic(
                workers.token(),
                self.config.drain_interval,
                true,
                move || {
                    let bus = bus.clone();
                    async move {
                        if let Some(bus) = bus.upgrade() {
                            bus.drain().await;
                        }
                    }
                },
            ));
        }

        // retention worker
        if self.event_log.is_some() {
            let bus = Arc::downgrade(self);
            workers.push(spawn_periodic(
                workers.token(),
                self.config.retention_sweep_interval,
                false,
                move || {
                    let bus = bus.clone();
                    async move {
                        if let Some(bus) = bus.upgrade() {
                            bus.purge_expired().await;
                        }
                    }
                },
            ));
        }

        *guard = Some(workers);
        info!(
            drain_interval_ms = self.config.drain_interval.as_millis() as u64,
            "event bus started"
        );
    }

    pub fn is_running(&self) -> bool {
        lock(&self.workers).is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 发布事件
    ///
    /// 事件日志写入失败不影响分发，只记录警告并累加 `degraded` 计数。
    pub async fn publish(&self, event: DomainEvent) -> Result<()> {
        event.validate()?;
        if self.is_shut_down() {
            return Err(DomainError::event_bus(format!(
                "event bus is shut down, rejected {} ({})",
                event.event_type(),
                event.id()
            )));
        }

        self.persist(&event).await;

        if event.priority().is_inline() {
            self.counters.inline.fetch_add(1, Ordering::Relaxed);
            debug!(
                event_id = event.id(),
                event_type = event.event_type(),
                "dispatching critical event inline"
            );
            self.process(&event).await;
        } else {
            let (event_id, priority) = (event.id().to_string(), event.priority());
            if let Err(event) = self.queues.push(event) {
                return Err(DomainError::event_bus(format!(
                    "event bus shut down while publishing {} ({})",
                    event.event_type(),
                    event.id()
                )));
            }
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = event_id.as_str(), priority = %priority, "event queued");
        }

        Ok(())
    }

    /// 以发布选项构造并发布事件，返回事件 id
    pub async fn emit(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        options: PublishOptions,
    ) -> Result<String> {
        let event = options.into_event(event_type, payload);
        let id = event.id().to_string();
        self.publish(event).await?;
        Ok(id)
    }

    /// 发布强类型负载，事件类型取自负载类型
    pub async fn emit_payload<P: EventPayload>(
        &self,
        payload: &P,
        options: PublishOptions,
    ) -> Result<String> {
        let value = serde_json::to_value(payload)?;
        self.emit(P::EVENT_TYPE, value, options).await
    }

    /// 注册处理器；同一类型可注册多个，按注册顺序分发
    pub fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let event_type = event_type.into();
        debug!(
            event_type = %event_type,
            handler = handler.handler_name(),
            "handler subscribed"
        );
        self.registry.register(event_type, handler);
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.count(event_type)
    }

    /// 注册失败接收方；总线只持有弱引用
    pub fn attach_failure_sink(&self, sink: Weak<dyn FailureSink>) {
        self.sinks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(sink);
    }

    /// 处理器失败信号流
    pub fn handler_failures(&self) -> BoxStream<'static, HandlerFailure> {
        let rx = self.failure_tx.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|r| async move { r.ok() }))
    }

    /// 按优先级清空缓冲区；已有一轮在进行时直接跳过
    pub async fn drain(&self) -> DrainReport {
        let Some(_guard) = InFlight::try_enter(&self.draining) else {
            debug!("drain already in progress, skipping");
            return DrainReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut dispatched = QueueStats::default();
        for priority in EventPriority::ALL {
            while let Some(event) = self.queues.pop(priority) {
                self.process(&event).await;
                dispatched.bump(priority);
            }
        }

        if dispatched.total() > 0 {
            debug!(
                critical = dispatched.critical,
                high = dispatched.high,
                normal = dispatched.normal,
                low = dispatched.low,
                "drained event buffers"
            );
        }

        DrainReport {
            skipped: false,
            dispatched,
        }
    }

    /// 重新分发一个事件（死信重试），不重复写入事件日志
    pub async fn redeliver(&self, event: &DomainEvent) -> Result<DispatchReport> {
        event.validate()?;
        if self.is_shut_down() {
            return Err(DomainError::event_bus("event bus is shut down"));
        }
        let report = self.dispatch(event).await;
        self.mark_processed(event).await;
        Ok(report)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queues.stats()
    }

    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            inline: self.counters.inline.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
        }
    }

    /// 查询事件历史（按发生时间倒序）；未配置事件日志时返回空
    pub async fn event_history(&self, filter: &EventFilter) -> Result<Vec<EventLogRecord>> {
        match &self.event_log {
            Some(log) => log.history(filter).await,
            None => Ok(Vec::new()),
        }
    }

    /// 将区间内的事件按发生时间正序重新分发给当前处理器，返回事件数
    ///
    /// 回放不修改记录的处理状态；`event_types` 为空表示不过滤。
    pub async fn replay_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: &[String],
    ) -> Result<usize> {
        let Some(log) = &self.event_log else {
            warn!("event log not configured, nothing to replay");
            return Ok(0);
        };

        let records = log.range(start, end, event_types).await?;
        info!(count = records.len(), %start, %end, "replaying events");

        for record in &records {
            self.dispatch(record.event()).await;
        }

        info!(count = records.len(), "replay completed");
        Ok(records.len())
    }

    /// 删除已过保留期的事件日志记录
    pub async fn purge_expired(&self) -> usize {
        let Some(log) = &self.event_log else {
            return 0;
        };
        match log.purge_expired(Utc::now()).await {
            Ok(0) => 0,
            Ok(n) => {
                info!(purged = n, "purged expired events from event log");
                n
            }
            Err(err) => {
                warn!(error = %err, "failed to purge expired events");
                0
            }
        }
    }

    /// 停止后台任务、最后清空一次缓冲区并注销全部处理器
    ///
    /// 关闭后的 `publish` 返回错误。
    pub async fn shutdown(&self) {
        info!("shutting down event bus");
        self.closed.store(true, Ordering::Release);
        self.queues.close();

        let workers = lock(&self.workers).take();
        if let Some(workers) = workers {
            workers.stop().await;
        }

        let report = self.drain().await;
        self.registry.clear();

        info!(
            drained = report.dispatched.total(),
            "event bus shutdown complete"
        );
    }

    fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500))
    }

    async fn persist(&self, event: &DomainEvent) {
        let Some(log) = &self.event_log else {
            return;
        };

        let record = EventLogRecord::new(event.clone(), Utc::now(), self.retention());
        if let Err(err) = log.append(record).await {
            let degraded = self.counters.degraded.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                event_id = event.id(),
                event_type = event.event_type(),
                error = %err,
                degraded,
                "failed to store event, delivering in memory only"
            );
        }
    }

    async fn mark_processed(&self, event: &DomainEvent) {
        let Some(log) = &self.event_log else {
            return;
        };
        if let Err(err) = log.mark_processed(event.id(), Utc::now()).await {
            warn!(event_id = event.id(), error = %err, "failed to mark event processed");
        }
    }

    /// 分发并标记已处理（无论处理器是否失败）
    async fn process(&self, event: &DomainEvent) -> DispatchReport {
        let report = self.dispatch(event).await;
        self.mark_processed(event).await;
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        report
    }

    async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        let handlers = self.registry.matching(event.event_type());
        if handlers.is_empty() {
            debug!(event_type = event.event_type(), "no handlers for event");
            return DispatchReport::default();
        }

        let handled = handlers.len();
        let calls: Vec<_> = handlers
            .into_iter()
            .map(|h| async move {
                match h.handle(event).await {
                    Ok(()) => None,
                    Err(err) => {
                        let snapshot = ErrorSnapshot::from_anyhow(&err, h.handler_name());
                        Some(HandlerFailure::new(event.clone(), h.handler_name(), snapshot))
                    }
                }
            })
            .collect();
        let failures: Vec<HandlerFailure> = stream::iter(calls)
            .buffered(self.config.handler_concurrency.max(1))
            .filter_map(|f| async move { f })
            .collect()
            .await;

        if !failures.is_empty() {
            self.report_failures(event, &failures).await;
        }

        DispatchReport {
            handled,
            failed: failures.len(),
        }
    }

    async fn report_failures(&self, event: &DomainEvent, failures: &[HandlerFailure]) {
        for failure in failures {
            self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                event_id = event.id(),
                event_type = event.event_type(),
                handler = failure.handler(),
                error = failure.error().message(),
                "event handler failed"
            );
            let _ = self.failure_tx.send(failure.clone());
        }

        let sinks: Vec<Arc<dyn FailureSink>> = {
            let mut sinks = self
                .sinks
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sinks.retain(|s| s.strong_count() > 0);
            sinks.iter().filter_map(Weak::upgrade).collect()
        };

        for sink in sinks {
            sink.dispatch_failed(event, failures).await;
        }
    }
}
