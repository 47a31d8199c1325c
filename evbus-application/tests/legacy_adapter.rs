use anyhow::Result as AnyResult;
use evbus_application::legacy::{
    InMemoryLegacyPublisher, LegacyEvent, LegacyEventAdapter, LegacyPublisher, SourcedEvent,
};
use evbus_application::{FeatureFlags, PublishingMode};
use evbus_domain::domain_event::{EventPriority, PublishOptions};
use evbus_domain::eventing::{
    DeadLetterConfig, DeadLetterQueue, EventBus, EventBusConfig, handler_fn,
};
use evbus_domain::persist::InMemoryDeadLetterStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn manual_bus() -> Arc<EventBus> {
    Arc::new(
        EventBus::builder()
            .config(EventBusConfig {
                drain_interval: Duration::from_secs(3600),
                ..Default::default()
            })
            .build(),
    )
}

fn adapter(mode: PublishingMode) -> (LegacyEventAdapter, Arc<InMemoryLegacyPublisher>, Arc<EventBus>) {
    let legacy = Arc::new(InMemoryLegacyPublisher::new());
    let bus = manual_bus();
    let adapter = LegacyEventAdapter::new(legacy.clone(), bus.clone(), mode);
    (adapter, legacy, bus)
}

#[tokio::test]
async fn subscribe_both_sees_each_event_once() -> AnyResult<()> {
    let (adapter, legacy, bus) = adapter(PublishingMode::Dual);
    let sources = Arc::new(Mutex::new(Vec::new()));
    let sink = sources.clone();
    adapter.subscribe_both("STUDENT_ENROLLED", move |event: SourcedEvent| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(event.is_legacy());
            Ok(())
        }
    });

    legacy
        .publish(&LegacyEvent::builder().event_type("STUDENT_ENROLLED").build())
        .await?;
    bus.emit(
        "STUDENT_ENROLLED",
        serde_json::json!({ "classId": "c-1" }),
        PublishOptions::default(),
    )
    .await?;
    bus.drain().await;

    let seen = sources.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&true));
    assert!(seen.contains(&false));
    Ok(())
}

#[tokio::test]
async fn publish_both_reaches_legacy_and_bus() -> AnyResult<()> {
    let (adapter, legacy, bus) = adapter(PublishingMode::Dual);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    adapter.subscribe_both("LEVEL_UP", move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    assert_eq!(legacy.observer_count(), 1);

    adapter
        .publish(
            &LegacyEvent::builder()
                .event_type("LEVEL_UP")
                .user_id("u-1")
                .build(),
        )
        .await?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.queue_stats().normal, 1);

    bus.drain().await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn publishing_mode_routes_to_one_side() -> AnyResult<()> {
    let event = LegacyEvent::builder().event_type("BADGE_EARNED").build();

    let (new_only, legacy, bus) = adapter(PublishingMode::NewOnly);
    let legacy_hits = Arc::new(AtomicUsize::new(0));
    let counter = legacy_hits.clone();
    new_only.subscribe_both("BADGE_EARNED", move |e: SourcedEvent| {
        let counter = counter.clone();
        async move {
            if e.is_legacy() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });
    new_only.publish(&event).await?;
    assert_eq!(legacy_hits.load(Ordering::SeqCst), 0);
    assert_eq!(bus.queue_stats().total(), 1);
    assert_eq!(legacy.observer_count(), 1);

    let (legacy_only, _legacy, bus) = adapter(PublishingMode::LegacyOnly);
    legacy_only.publish(&event).await?;
    assert_eq!(bus.queue_stats().total(), 0);
    Ok(())
}

#[tokio::test]
async fn legacy_failures_are_logged_but_bus_failures_are_dead_lettered() -> AnyResult<()> {
    let (adapter, legacy, bus) = adapter(PublishingMode::Dual);
    let dlq = DeadLetterQueue::new(
        Arc::new(InMemoryDeadLetterStore::new()),
        bus.clone(),
        DeadLetterConfig::default(),
    );
    adapter.subscribe_both("XP_GAINED", |_| async { Err(anyhow::anyhow!("boom")) });

    legacy
        .publish(&LegacyEvent::builder().event_type("XP_GAINED").build())
        .await?;
    assert_eq!(dlq.get_stats().await?.total, 0);

    let id = adapter
        .publish_new("XP_GAINED", serde_json::json!({}), EventPriority::Critical, None)
        .await?;
    let record = dlq.find(&id).await?.expect("dead letter record");
    assert_eq!(record.attempt_count(), 1);
    Ok(())
}

#[tokio::test]
async fn subscribe_new_only_registers_on_bus() -> AnyResult<()> {
    let (adapter, legacy, bus) = adapter(PublishingMode::Dual);
    adapter.subscribe_new("EXAM_PUBLISHED", handler_fn("notify", |_| async { Ok(()) }));
    assert_eq!(bus.handler_count("EXAM_PUBLISHED"), 1);
    assert_eq!(legacy.observer_count(), 0);
    Ok(())
}

#[test]
fn adapter_follows_new_bus_flag() {
    let legacy = Arc::new(InMemoryLegacyPublisher::new());
    let flags = FeatureFlags {
        publishing_mode: PublishingMode::Dual,
        ..Default::default()
    };
    let adapter = LegacyEventAdapter::from_flags(legacy, manual_bus(), &flags);
    assert_eq!(adapter.mode(), PublishingMode::LegacyOnly);
}
