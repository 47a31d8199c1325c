/// 事件总线（内存版）示例
/// 展示 优先级缓冲 -> drain -> Handlers -> 死信队列 -> 重试 的闭环
use anyhow::Result as AnyResult;
use evbus_domain::domain_event::{EventPriority, PublishOptions, event_types};
use evbus_domain::eventing::{
    DeadLetterConfig, DeadLetterQueue, EventBus, EventBusConfig, handler_fn,
};
use evbus_domain::persist::{EventFilter, InMemoryDeadLetterStore, InMemoryEventLog};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let bus = Arc::new(
        EventBus::builder()
            .event_log(log.clone())
            .config(EventBusConfig {
                drain_interval: Duration::from_millis(20),
                ..Default::default()
            })
            .build(),
    );
    let dlq = DeadLetterQueue::new(
        Arc::new(InMemoryDeadLetterStore::new()),
        bus.clone(),
        DeadLetterConfig {
            retry_interval: Duration::from_millis(200),
            ..Default::default()
        },
    );

    // 第一次调用失败，之后恢复
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    bus.subscribe(
        event_types::XP_GAINED,
        handler_fn("award-xp", move |ev| {
            let flag = flag.clone();
            async move {
                if !flag.swap(true, Ordering::SeqCst) {
                    anyhow::bail!("xp ledger unavailable");
                }
                println!("xp awarded: {}", ev.payload());
                Ok(())
            }
        }),
    );
    bus.subscribe(
        event_types::ANTI_CHEAT_VIOLATION,
        handler_fn("proctor", |ev| async move {
            println!("[critical] violation reported: {}", ev.id());
            Ok(())
        }),
    );

    bus.start();
    dlq.start_auto_retry();

    bus.emit(
        event_types::XP_GAINED,
        serde_json::json!({ "amount": 50, "source": "exam", "newTotal": 150 }),
        PublishOptions::default(),
    )
    .await?;
    bus.emit(
        event_types::ANTI_CHEAT_VIOLATION,
        serde_json::json!({ "attemptId": "att-1" }),
        PublishOptions::builder()
            .priority(EventPriority::Critical)
            .build(),
    )
    .await?;

    tokio::time::sleep(Duration::from_millis(600)).await;

    println!("dead letters: {:?}", dlq.get_stats().await?);
    println!(
        "history: {} events",
        bus.event_history(&EventFilter::default()).await?.len()
    );
    println!("metrics: {:?}", bus.metrics());

    dlq.stop_auto_retry().await;
    bus.shutdown().await;
    Ok(())
}
