//! 死信队列（DeadLetterQueue）
//!
//! 接收总线上处理失败的事件，按事件 id 累计尝试次数，
//! 并周期性地把未耗尽重试次数、且距上次尝试已超过重试间隔的事件重新分发。
//!
use super::bus::EventBus;
use super::failure::{FailureSink, HandlerFailure};
use super::worker::{InFlight, Workers, lock, spawn_periodic};
use crate::domain_event::DomainEvent;
use crate::error::DomainResult as Result;
use crate::persist::{
    DeadLetterRecord, DeadLetterStats, DeadLetterStore, ErrorSnapshot, UnresolvedQuery,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 死信队列配置
#[derive(Clone, Copy, Debug)]
pub struct DeadLetterConfig {
    /// 尝试次数上限（含首次失败）
    pub max_retries: u32,
    /// 两次尝试的最小间隔，同时也是自动重试的周期
    pub retry_interval: Duration,
    /// 每轮最多重试的记录数
    pub batch_size: usize,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_secs(5 * 60),
            batch_size: 10,
        }
    }
}

/// 一轮重试的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// 本轮选中的记录数
    pub selected: usize,
    /// 重试成功并标记为已解决的记录数
    pub resolved: usize,
}

pub struct DeadLetterQueue {
    store: Arc<dyn DeadLetterStore>,
    bus: Arc<EventBus>,
    config: DeadLetterConfig,
    retrying: AtomicBool,
    auto_retry: Mutex<Option<Workers>>,
}

impl DeadLetterQueue {
    /// 创建死信队列并接入总线的失败通知
    pub fn new(
        store: Arc<dyn DeadLetterStore>,
        bus: Arc<EventBus>,
        config: DeadLetterConfig,
    ) -> Arc<Self> {
        let dlq = Arc::new(Self {
            store,
            bus,
            config,
            retrying: AtomicBool::new(false),
            auto_retry: Mutex::new(None),
        });

        let sink: Arc<dyn FailureSink> = dlq.clone();
        dlq.bus.attach_failure_sink(Arc::downgrade(&sink));
        info!(
            max_retries = config.max_retries,
            retry_interval_ms = config.retry_interval.as_millis() as u64,
            "dead letter queue attached to event bus"
        );

        dlq
    }

    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    /// 记录一次失败：首次插入，之后累加尝试次数并覆盖错误
    pub async fn add(&self, event: &DomainEvent, error: &ErrorSnapshot) -> Result<DeadLetterRecord> {
        let record = self.store.record_failure(event, error, Utc::now()).await?;

        if record.attempt_count() == 1 {
            info!(
                event_id = event.id(),
                event_type = event.event_type(),
                error = error.message(),
                "added failed event to dead letter queue"
            );
        } else {
            info!(
                event_id = event.id(),
                event_type = event.event_type(),
                attempts = record.attempt_count(),
                max_retries = self.config.max_retries,
                "updated failed event in dead letter queue"
            );
        }

        if record.attempt_count() >= self.config.max_retries && !record.resolved() {
            warn!(
                event_id = event.id(),
                event_type = event.event_type(),
                attempts = record.attempt_count(),
                "dead-lettered event exhausted its retries"
            );
        }

        Ok(record)
    }

    /// 重试一批到期的失败事件
    ///
    /// 同一时刻只运行一轮；重试再次失败时由总线的失败通知累加尝试次数。
    /// 总线关闭后不再重试，也不消耗尝试次数。
    pub async fn retry_failed(&self) -> RetryReport {
        let Some(_guard) = InFlight::try_enter(&self.retrying) else {
            debug!("dead letter retry already in progress, skipping");
            return RetryReport::default();
        };
        if self.bus.is_shut_down() {
            debug!("event bus is shut down, skipping dead letter retry");
            return RetryReport::default();
        }

        let interval = chrono::Duration::from_std(self.config.retry_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - interval;

        let due = match self
            .store
            .due_for_retry(self.config.max_retries, cutoff, self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "failed to load dead-lettered events for retry");
                return RetryReport::default();
            }
        };

        if due.is_empty() {
            return RetryReport::default();
        }

        info!(count = due.len(), "retrying dead-lettered events");
        let mut resolved = 0;

        for record in &due {
            debug!(
                event_id = record.event_id(),
                attempt = record.attempt_count() + 1,
                max_retries = self.config.max_retries,
                "retrying event"
            );

            match self.bus.redeliver(record.event()).await {
                Ok(report) if report.is_clean() => {
                    match self.store.mark_resolved(record.event_id(), Utc::now()).await {
                        Ok(_) => {
                            resolved += 1;
                            info!(
                                event_id = record.event_id(),
                                event_type = record.event_type(),
                                "dead-lettered event retried successfully"
                            );
                        }
                        Err(err) => error!(
                            event_id = record.event_id(),
                            error = %err,
                            "failed to mark dead-lettered event resolved"
                        ),
                    }
                }
                Ok(report) => warn!(
                    event_id = record.event_id(),
                    failed = report.failed,
                    "retry failed, attempt recorded"
                ),
                Err(err) if self.bus.is_shut_down() => {
                    debug!(event_id = record.event_id(), error = %err, "event bus closed during retry");
                    break;
                }
                Err(err) => {
                    warn!(event_id = record.event_id(), error = %err, "retry could not be dispatched");
                    let snapshot = ErrorSnapshot::builder()
                        .message(err.to_string())
                        .name("EventBus")
                        .build();
                    if let Err(err) = self.add(record.event(), &snapshot).await {
                        error!(event_id = record.event_id(), error = %err, "failed to record retry failure");
                    }
                }
            }
        }

        RetryReport {
            selected: due.len(),
            resolved,
        }
    }

    /// 未解决的失败事件，按创建时间倒序分页
    pub async fn get_unresolved(&self, query: &UnresolvedQuery) -> Result<Vec<DeadLetterRecord>> {
        self.store.unresolved(query).await
    }

    pub async fn find(&self, event_id: &str) -> Result<Option<DeadLetterRecord>> {
        self.store.find(event_id).await
    }

    pub async fn get_stats(&self) -> Result<DeadLetterStats> {
        self.store.stats(self.config.max_retries).await
    }

    /// 人工标记已解决；记录不存在或已解决时返回 false
    pub async fn resolve(&self, event_id: &str) -> Result<bool> {
        let changed = self.store.mark_resolved(event_id, Utc::now()).await?;
        if changed {
            info!(event_id, "dead-lettered event manually resolved");
        }
        Ok(changed)
    }

    /// 删除 `older_than_days` 天前已解决的记录
    pub async fn cleanup(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let purged = self.store.purge_resolved(cutoff).await?;
        info!(purged, older_than_days, "cleaned up resolved dead-lettered events");
        Ok(purged)
    }

    /// 按重试间隔周期执行 `retry_failed`；重复调用只记录警告
    pub fn start_auto_retry(self: &Arc<Self>) {
        let mut guard = lock(&self.auto_retry);
        if guard.is_some() {
            warn!("dead letter auto-retry already running");
            return;
        }

        let mut workers = Workers::new();
        let dlq = Arc::downgrade(self);
        workers.push(spawn_periodic(
            workers.token(),
            self.config.retry_interval,
            false,
            move || {
                let dlq = dlq.clone();
                async move {
                    if let Some(dlq) = dlq.upgrade() {
                        dlq.retry_failed().await;
                    }
                }
            },
        ));

        *guard = Some(workers);
        info!(
            interval_ms = self.config.retry_interval.as_millis() as u64,
            "dead letter auto-retry started"
        );
    }

    /// 停止自动重试，并等待正在进行的一轮结束
    pub async fn stop_auto_retry(&self) {
        let workers = lock(&self.auto_retry).take();
        if let Some(workers) = workers {
            workers.stop().await;
            info!("dead letter auto-retry stopped");
        }
    }

    pub fn is_auto_retrying(&self) -> bool {
        lock(&self.auto_retry).is_some()
    }
}

#[async_trait]
impl FailureSink for DeadLetterQueue {
    async fn dispatch_failed(&self, event: &DomainEvent, failures: &[HandlerFailure]) {
        let error = HandlerFailure::combine(failures);
        if let Err(err) = self.add(event, &error).await {
            error!(
                event_id = event.id(),
                event_type = event.event_type(),
                error = %err,
                "failed to add event to dead letter queue"
            );
        }
    }
}
