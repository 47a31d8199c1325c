use async_trait::async_trait;
use evbus_application::legacy::{InMemoryLegacyPublisher, LegacyEvent, LegacyEventAdapter};
use evbus_application::{
    ApplicationBootstrap, FeatureFlags, FeatureModule, ModuleName, ModuleRegistry,
};
use evbus_domain::domain_event::{
    AttemptGraded, DomainEvent, EventPriority, PublishOptions, XpGained, event_types,
};
use evbus_domain::eventing::{EventBus, handler_fn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 游戏化模块：考试判分后发放经验值
struct Gamification {
    total_xp: Arc<AtomicU64>,
}

#[async_trait]
impl FeatureModule for Gamification {
    fn name(&self) -> ModuleName {
        ModuleName::Gamification
    }

    async fn register_handlers(&self, bus: &Arc<EventBus>) -> anyhow::Result<()> {
        let weak: Weak<EventBus> = Arc::downgrade(bus);
        let total_xp = self.total_xp.clone();
        bus.subscribe(
            event_types::ATTEMPT_GRADED,
            handler_fn("gamification.award-xp", move |event: DomainEvent| {
                let weak = weak.clone();
                let total_xp = total_xp.clone();
                async move {
                    let graded: AttemptGraded = event.payload_as()?;
                    let amount: u32 = if graded.passed { 50 } else { 10 };
                    let new_total =
                        total_xp.fetch_add(u64::from(amount), Ordering::SeqCst) + u64::from(amount);
                    let Some(bus) = weak.upgrade() else {
                        return Ok(());
                    };
                    let xp = XpGained {
                        amount,
                        source: "exam".to_string(),
                        source_id: Some(graded.attempt_id),
                        new_total,
                    };
                    let options = PublishOptions::builder()
                        .maybe_actor_id(event.actor_id().map(str::to_string))
                        .maybe_correlation_id(event.correlation_id().map(str::to_string))
                        .causation_id(event.id().to_string())
                        .build();
                    bus.emit_payload(&xp, options).await?;
                    Ok(())
                }
            }),
        );

        bus.subscribe(
            event_types::XP_GAINED,
            handler_fn("gamification.log-xp", |event: DomainEvent| async move {
                let xp: XpGained = event.payload_as()?;
                info!(amount = xp.amount, total = xp.new_total, "xp gained");
                Ok(())
            }),
        );
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = FeatureFlags::from_env()?;
    init_tracing(flags.verbose_event_logging);

    let total_xp = Arc::new(AtomicU64::new(0));
    let modules = ModuleRegistry::new().with(Arc::new(Gamification {
        total_xp: total_xp.clone(),
    }));
    let app = ApplicationBootstrap::builder()
        .flags(flags.clone())
        .modules(modules)
        .build();

    let system = app.initialize().await?;
    let bus = system.bus().clone();

    let legacy = Arc::new(InMemoryLegacyPublisher::new());
    let adapter = LegacyEventAdapter::from_flags(legacy, bus.clone(), &flags);
    adapter.subscribe_both(event_types::USER_REGISTERED, |event| async move {
        info!(
            legacy = event.is_legacy(),
            user = event.user_id().unwrap_or("-"),
            "user registered"
        );
        Ok(())
    });
    adapter
        .publish(
            &LegacyEvent::builder()
                .event_type(event_types::USER_REGISTERED)
                .user_id("student-1")
                .data(serde_json::json!({ "name": "Ada", "email": "ada@example.com", "role": "STUDENT" }))
                .build(),
        )
        .await?;

    let graded = AttemptGraded {
        attempt_id: "attempt-1".to_string(),
        exam_id: "exam-1".to_string(),
        score: 18.0,
        max_score: 20.0,
        percentage: 90.0,
        passed: true,
    };
    bus.emit_payload(
        &graded,
        PublishOptions::builder()
            .priority(EventPriority::High)
            .actor_id("student-1".to_string())
            .correlation_id("grading-run-1".to_string())
            .build(),
    )
    .await?;

    tokio::time::sleep(Duration::from_millis(flags.queue_processing_interval_ms * 3)).await;

    let stats = app.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("total xp: {}", total_xp.load(Ordering::SeqCst));

    app.shutdown().await;
    Ok(())
}
