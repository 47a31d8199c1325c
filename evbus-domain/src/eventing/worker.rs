use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 获取互斥锁；持锁方 panic 后仍继续使用内部数据
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 启动周期任务，直到 `token` 被取消
///
/// `immediate` 为 true 时立即执行第一轮，否则等待一个周期后开始。
/// 当前一轮尚未结束时到期的 tick 会被跳过。
pub(crate) fn spawn_periodic<F, Fut>(
    token: CancellationToken,
    period: Duration,
    immediate: bool,
    mut f: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => f().await,
            }
        }
    })
}

/// 后台任务组：取消令牌与任务句柄
pub(crate) struct Workers {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Workers {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// 取消并等待全部任务退出
    pub(crate) async fn stop(mut self) {
        self.cancel();
        for t in std::mem::take(&mut self.tasks) {
            let _ = t.await;
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 单飞守卫：同一时刻只允许一个持有者，释放时自动复位
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn in_flight_admits_one_holder() {
        let flag = AtomicBool::new(false);
        let first = InFlight::try_enter(&flag);
        assert!(first.is_some());
        assert!(InFlight::try_enter(&flag).is_none());
        drop(first);
        assert!(InFlight::try_enter(&flag).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_stops_on_cancel() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut workers = Workers::new();
        let counter = ticks.clone();
        workers.push(spawn_periodic(
            workers.token(),
            Duration::from_millis(10),
            true,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        time::sleep(Duration::from_millis(35)).await;
        workers.stop().await;
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected at least 3 ticks, got {seen}");

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
