//! Cancellable one-shot timer
//!
//! Each `start` bumps a generation counter. When the sleep finishes, the
//! task only fires if its generation is still the armed one, so a fire that
//! races a `cancel` or a restart is dropped instead of running twice.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    armed: Option<u64>,
    task: Option<JoinHandle<()>>,
}

/// One-shot timer running its callback on the tokio runtime
#[derive(Debug, Clone)]
pub struct OneShotTimer {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl OneShotTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Arm the timer, replacing any pending run
    pub fn start<F>(&self, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(task) = slot.task.take() {
            task.abort();
        }

        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        slot.armed = Some(generation);

        trace!(timer = self.name, generation, "Timer armed for {:?}", after);

        let shared = Arc::clone(&self.slot);
        let name = self.name;
        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;

            let claimed = {
                let mut slot = shared.lock();
                if slot.armed == Some(generation) {
                    slot.armed = None;
                    slot.task = None;
                    true
                } else {
                    false
                }
            };

            if claimed {
                trace!(timer = name, generation, "Timer fired");
                on_fire();
            }
        }));
    }

    /// Disarm the timer; returns whether it was armed
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        let was_armed = slot.armed.take().is_some();
        if was_armed {
            trace!(timer = self.name, "Timer cancelled");
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().armed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let timer = OneShotTimer::new("test");
        let (count, make) = counter();

        timer.start(Duration::from_secs(5), make());
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let timer = OneShotTimer::new("test");
        let (count, make) = counter();

        timer.start(Duration::from_secs(1), make());
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_pending_run() {
        let timer = OneShotTimer::new("test");
        let (count, make) = counter();

        timer.start(Duration::from_secs(1), make());
        tokio::time::sleep(Duration::from_millis(500)).await;
        timer.start(Duration::from_secs(1), make());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_rearm() {
        let timer = OneShotTimer::new("test");
        let (count, make) = counter();

        let again = timer.clone();
        let second = make();
        timer.start(Duration::from_secs(1), move || {
            again.start(Duration::from_secs(1), second);
        });

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
