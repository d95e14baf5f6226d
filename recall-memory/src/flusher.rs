//! Periodic background flush task.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the running flush loop.
pub struct Flusher {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Flusher {
    /// Run `tick` every `period` until stopped. The first run happens one
    /// full period after spawning.
    pub fn spawn<F, Fut>(period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!("Flusher stopped");
        });

        Self { stop_tx, handle }
    }

    /// Ask the loop to exit without waiting for it.
    pub fn signal(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Signal the loop and wait for it to finish. A tick in progress
    /// completes first.
    pub async fn stop(self) {
        self.signal();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Flusher task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let flusher = Flusher::spawn(Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        flusher.stop().await;

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn stop_before_first_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let flusher = Flusher::spawn(Duration::from_secs(3600), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        flusher.stop().await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
