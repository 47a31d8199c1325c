//! 应用启动器（ApplicationBootstrap）
//!
//! 按固定顺序拉起事件系统：
//! 1. 校验特性开关（失败即终止启动）；
//! 2. 构造事件总线并启动 drain 与保留期清理；
//! 3. 按开关构造死信队列并启动自动重试；
//! 4. 从模块注册表加载已启用的模块（缺失或失败均不致命）。
//!
//! 启动与关闭由同一把异步锁串行化：并发的 `initialize` 只会执行一次启动流程，
//! 其余调用拿到同一个 `EventSystem`。
//!
use crate::config::{FeatureFlags, ModuleName};
use crate::error::{AppError, AppResult};
use crate::module_registry::ModuleRegistry;
use bon::Builder;
use evbus_domain::eventing::{BusMetrics, DeadLetterQueue, EventBus, QueueStats};
use evbus_domain::persist::{
    DeadLetterStats, DeadLetterStore, EventLogStore, InMemoryDeadLetterStore, InMemoryEventLog,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

/// 关闭时等待缓冲区清空的缺省上限
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

fn in_memory_event_log() -> Arc<dyn EventLogStore> {
    Arc::new(InMemoryEventLog::new())
}

fn in_memory_dead_letters() -> Arc<dyn DeadLetterStore> {
    Arc::new(InMemoryDeadLetterStore::new())
}

/// 已启动的事件系统
pub struct EventSystem {
    bus: Arc<EventBus>,
    dead_letters: Option<Arc<DeadLetterQueue>>,
    loaded_modules: Vec<ModuleName>,
}

impl EventSystem {
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// 死信队列；开关关闭时为 `None`
    pub fn dead_letters(&self) -> Option<&Arc<DeadLetterQueue>> {
        self.dead_letters.as_ref()
    }

    pub fn loaded_modules(&self) -> &[ModuleName] {
        &self.loaded_modules
    }
}

/// 应用运行统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppStats {
    pub initialized: bool,
    pub queues: QueueStats,
    pub bus: BusMetrics,
    pub dead_letters: Option<DeadLetterStats>,
    pub loaded_modules: Vec<ModuleName>,
}

#[derive(Default)]
enum BootState {
    #[default]
    Uninitialized,
    Initialized(Arc<EventSystem>),
}

#[derive(Builder)]
pub struct ApplicationBootstrap {
    flags: FeatureFlags,
    #[builder(default = in_memory_event_log())]
    event_log: Arc<dyn EventLogStore>,
    #[builder(default = in_memory_dead_letters())]
    dead_letter_store: Arc<dyn DeadLetterStore>,
    #[builder(default)]
    modules: ModuleRegistry,
    #[builder(default = DEFAULT_SHUTDOWN_GRACE)]
    shutdown_grace: Duration,
    #[builder(skip)]
    state: Mutex<BootState>,
    #[builder(skip)]
    ready: AtomicBool,
}

impl ApplicationBootstrap {
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// 启动事件系统；已启动时直接返回当前系统
    pub async fn initialize(&self) -> AppResult<Arc<EventSystem>> {
        let mut state = self.state.lock().await;
        if let BootState::Initialized(system) = &*state {
            warn!("application already initialized");
            return Ok(system.clone());
        }

        info!("starting application initialization");

        if let Err(err) = self.flags.validate() {
            error!(error = %err, "configuration validation failed");
            return Err(err.into());
        }
        self.flags.log_summary();

        let bus = self.init_event_bus();
        let dead_letters = self.init_dead_letter_queue(&bus);
        let loaded_modules = self.load_enabled_modules(&bus).await;

        let system = Arc::new(EventSystem {
            bus,
            dead_letters,
            loaded_modules,
        });
        *state = BootState::Initialized(system.clone());
        self.ready.store(true, Ordering::Release);

        info!(
            modules = system.loaded_modules.len(),
            "application initialized"
        );
        Ok(system)
    }

    fn init_event_bus(&self) -> Arc<EventBus> {
        let event_log = self
            .flags
            .enable_event_sourcing
            .then(|| self.event_log.clone());
        if event_log.is_none() {
            info!("event sourcing disabled, events will not be logged");
        }

        let bus = Arc::new(
            EventBus::builder()
                .maybe_event_log(event_log)
                .config(self.flags.bus_config())
                .build(),
        );
        bus.start();
        bus
    }

    fn init_dead_letter_queue(&self, bus: &Arc<EventBus>) -> Option<Arc<DeadLetterQueue>> {
        if !self.flags.enable_dead_letter_queue {
            info!("dead letter queue disabled by feature flag");
            return None;
        }

        let dlq = DeadLetterQueue::new(
            self.dead_letter_store.clone(),
            bus.clone(),
            self.flags.dead_letter_config(),
        );
        dlq.start_auto_retry();
        Some(dlq)
    }

    async fn load_enabled_modules(&self, bus: &Arc<EventBus>) -> Vec<ModuleName> {
        if !self.flags.use_modular_structure {
            info!("modular structure disabled, skipping module loading");
            return Vec::new();
        }

        let mut loaded = Vec::new();
        for name in self.flags.enabled_modules() {
            match self.modules.load(name, bus).await {
                Ok(true) => {
                    info!(module = %name, "loaded module");
                    loaded.push(name);
                }
                Ok(false) => info!(module = %name, "module not found (not yet migrated)"),
                Err(err) => warn!(module = %name, error = %err, "module failed to load"),
            }
        }

        if loaded.is_empty() {
            info!("no modules loaded");
        } else {
            info!(count = loaded.len(), "modules loaded");
        }
        loaded
    }

    /// 当前运行中的事件系统
    pub async fn system(&self) -> AppResult<Arc<EventSystem>> {
        match &*self.state.lock().await {
            BootState::Initialized(system) => Ok(system.clone()),
            BootState::Uninitialized => Err(AppError::NotInitialized),
        }
    }

    /// 关闭事件系统
    ///
    /// 先停止自动重试，再在宽限期内等待缓冲区清空，最后关闭总线。
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let BootState::Initialized(system) = std::mem::take(&mut *state) else {
            warn!("application not initialized, nothing to shut down");
            return;
        };
        self.ready.store(false, Ordering::Release);

        info!("shutting down application");

        if let Some(dlq) = &system.dead_letters {
            dlq.stop_auto_retry().await;
        }

        let pending = system.bus.queue_stats().total();
        if pending > 0 {
            info!(pending, "waiting for remaining events");
            let deadline = Instant::now() + self.shutdown_grace;
            while system.bus.queue_stats().total() > 0 && Instant::now() < deadline {
                time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            }
        }

        system.bus.shutdown().await;
        info!("application shutdown complete");
    }

    pub async fn stats(&self) -> AppStats {
        let system = match &*self.state.lock().await {
            BootState::Initialized(system) => system.clone(),
            BootState::Uninitialized => return AppStats::default(),
        };

        let dead_letters = match &system.dead_letters {
            Some(dlq) => match dlq.get_stats().await {
                Ok(stats) => Some(stats),
                Err(err) => {
                    warn!(error = %err, "failed to load dead letter stats");
                    None
                }
            },
            None => None,
        };

        AppStats {
            initialized: true,
            queues: system.bus.queue_stats(),
            bus: system.bus.metrics(),
            dead_letters,
            loaded_modules: system.loaded_modules.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
