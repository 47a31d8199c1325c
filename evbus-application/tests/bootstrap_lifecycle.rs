use anyhow::Result as AnyResult;
use async_trait::async_trait;
use evbus_application::{
    AppError, ApplicationBootstrap, FeatureFlags, FeatureModule, ModuleName, ModuleRegistry,
};
use evbus_domain::domain_event::{EventPriority, PublishOptions, event_types};
use evbus_domain::eventing::{EventBus, handler_fn};
use evbus_domain::persist::{EventFilter, InMemoryEventLog};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Gamification {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl FeatureModule for Gamification {
    fn name(&self) -> ModuleName {
        ModuleName::Gamification
    }

    async fn register_handlers(&self, bus: &Arc<EventBus>) -> anyhow::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        bus.subscribe(
            event_types::ATTEMPT_GRADED,
            handler_fn("gamification.attempt-graded", |_| async { Ok(()) }),
        );
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl FeatureModule for Broken {
    fn name(&self) -> ModuleName {
        ModuleName::Analytics
    }

    async fn register_handlers(&self, _bus: &Arc<EventBus>) -> anyhow::Result<()> {
        anyhow::bail!("analytics store offline")
    }
}

fn modular_flags(modules: &[ModuleName]) -> FeatureFlags {
    FeatureFlags {
        use_new_event_bus: true,
        use_modular_structure: true,
        modules_enabled: modules.iter().copied().collect::<BTreeSet<_>>(),
        queue_processing_interval_ms: 10,
        dlq_retry_interval_ms: 1_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn concurrent_initialize_runs_once() -> AnyResult<()> {
    let loads = Arc::new(AtomicUsize::new(0));
    let modules = ModuleRegistry::new().with(Arc::new(Gamification {
        loads: loads.clone(),
    }));
    let app = Arc::new(
        ApplicationBootstrap::builder()
            .flags(modular_flags(&[ModuleName::Gamification]))
            .modules(modules)
            .build(),
    );

    let (a, b) = tokio::join!(app.initialize(), app.initialize());
    let (a, b) = (a?, b?);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(a.loaded_modules(), &[ModuleName::Gamification]);
    assert!(app.is_ready());

    let again = app.initialize().await?;
    assert!(Arc::ptr_eq(&a, &again));

    app.shutdown().await;
    assert!(!app.is_ready());
    assert!(matches!(app.system().await, Err(AppError::NotInitialized)));
    Ok(())
}

#[tokio::test]
async fn missing_and_failing_modules_are_not_fatal() -> AnyResult<()> {
    let modules = ModuleRegistry::new().with(Arc::new(Broken));
    let app = ApplicationBootstrap::builder()
        .flags(modular_flags(&[
            ModuleName::Analytics,
            ModuleName::Messaging,
        ]))
        .modules(modules)
        .build();

    let system = app.initialize().await?;
    assert!(system.loaded_modules().is_empty());
    assert!(system.dead_letters().is_some());
    app.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn invalid_configuration_aborts_initialization() {
    let app = ApplicationBootstrap::builder()
        .flags(FeatureFlags {
            dlq_max_retries: 0,
            ..Default::default()
        })
        .build();

    let err = app.initialize().await.err().expect("config error");
    assert!(matches!(err, AppError::Config(_)));
    assert!(!app.is_ready());
}

#[tokio::test]
async fn flags_control_event_log_and_dead_letters() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let app = ApplicationBootstrap::builder()
        .flags(FeatureFlags {
            enable_event_sourcing: false,
            enable_dead_letter_queue: false,
            ..Default::default()
        })
        .event_log(log.clone())
        .build();

    let system = app.initialize().await?;
    assert!(system.dead_letters().is_none());
    assert!(!system.bus().has_event_log());

    system
        .bus()
        .emit("A", serde_json::json!({}), PublishOptions::default())
        .await?;
    assert!(log.is_empty());
    assert!(
        system
            .bus()
            .event_history(&EventFilter::default())
            .await?
            .is_empty()
    );
    app.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_buffers_then_rejects_publish() -> AnyResult<()> {
    let app = ApplicationBootstrap::builder()
        .flags(modular_flags(&[]))
        .shutdown_grace(Duration::from_millis(500))
        .build();
    let system = app.initialize().await?;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    system.bus().subscribe(
        "A",
        handler_fn("count", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );
    for _ in 0..5 {
        system
            .bus()
            .emit(
                "A",
                serde_json::json!({}),
                PublishOptions::builder().priority(EventPriority::Low).build(),
            )
            .await?;
    }

    app.shutdown().await;
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    assert!(
        system
            .bus()
            .emit("A", serde_json::json!({}), PublishOptions::default())
            .await
            .is_err()
    );

    let stats = app.stats().await;
    assert!(!stats.initialized);
    Ok(())
}

#[tokio::test]
async fn stats_report_queues_and_dead_letters() -> AnyResult<()> {
    let app = ApplicationBootstrap::builder()
        .flags(modular_flags(&[]))
        .build();
    let system = app.initialize().await?;
    system.bus().subscribe(
        "A",
        handler_fn("broken", |_| async { Err(anyhow::anyhow!("boom")) }),
    );
    system
        .bus()
        .emit(
            "A",
            serde_json::json!({}),
            PublishOptions::builder()
                .priority(EventPriority::Critical)
                .build(),
        )
        .await?;

    let stats = app.stats().await;
    assert!(stats.initialized);
    assert_eq!(stats.bus.inline, 1);
    assert_eq!(stats.dead_letters.map(|d| d.unresolved), Some(1));
    app.shutdown().await;
    Ok(())
}
