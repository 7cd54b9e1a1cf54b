use crate::models::now_ms;
use scopeguard::guard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Периодический тик для отображения прошедшего времени
/// Тик только публикует значение и никогда не меняет состояние
#[derive(Debug, Clone, Copy)]
pub struct TimerClock {
    tick_interval: Duration,
}

/// Handle of a running tick loop. Dropping it cancels the loop.
pub struct ClockHandle {
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl TimerClock {
    pub fn new(tick_interval: Duration) -> Self {
        Self { tick_interval }
    }

    /// Start ticking `on_tick(elapsed_seconds)` relative to `started_at_ms`.
    /// Must be called from inside a tokio runtime.
    pub fn start<F>(&self, started_at_ms: u64, on_tick: F) -> ClockHandle
    where
        F: Fn(u64) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let tick_interval = self.tick_interval;

        // Panic / abort guard: the active flag is always reset, even when the task
        // is cancelled before its first poll (the guard lives in the future's state)
        let release = guard(active.clone(), |flag| {
            flag.store(false, Ordering::SeqCst);
            debug!("[CLOCK] Tick loop released");
        });

        let task = tokio::spawn(async move {
            let _release = release;
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let elapsed = now_ms().saturating_sub(started_at_ms) / 1000;
                on_tick(elapsed);
            }
        });

        ClockHandle {
            task: Some(task),
            active,
        }
    }

    /// Cancel the loop and wait until it has exited.
    pub async fn stop(handle: ClockHandle) {
        handle.join().await;
    }
}

impl Default for TimerClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ClockHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Cancel without waiting; used on synchronous exit paths.
    pub fn cancel(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    async fn join(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled is the expected outcome
            let _ = task.await;
        }
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_clock_ticks_elapsed_seconds() {
        let clock = TimerClock::new(Duration::from_millis(20));
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let ticks_clone = ticks.clone();
        let started = now_ms() - 5_000;

        let handle = clock.start(started, move |elapsed| {
            ticks_clone.lock().unwrap().push(elapsed);
        });
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(handle.is_active());
        TimerClock::stop(handle).await;

        let ticks = ticks.lock().unwrap();
        assert!(ticks.len() >= 2, "expected several ticks, got {:?}", *ticks);
        assert!(ticks.iter().all(|e| *e >= 5));
    }

    #[tokio::test]
    async fn test_stop_releases_loop() {
        let clock = TimerClock::new(Duration::from_millis(10));
        let count = Arc::new(Mutex::new(0u32));
        let count_clone = count.clone();
        let handle = clock.start(now_ms(), move |_| {
            *count_clone.lock().unwrap() += 1;
        });
        let active = handle.active.clone();

        TimerClock::stop(handle).await;
        assert!(!active.load(Ordering::SeqCst));

        let after_stop = *count.lock().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*count.lock().unwrap(), after_stop);
    }

    #[tokio::test]
    async fn test_drop_cancels_loop() {
        let clock = TimerClock::new(Duration::from_millis(10));
        let handle = clock.start(now_ms(), |_| {});
        let active = handle.active.clone();
        drop(handle);

        for _ in 0..50 {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!active.load(Ordering::SeqCst));
    }
}
