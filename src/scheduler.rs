use crate::config::AppConfig;
use crate::db::store::EventWriter;
use crate::feed::DisasterFeed;
use crate::processor::ingestion::{DispatchTrigger, Ingestor};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub run_once: bool,
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: config.dispatch_interval(),
            run_once: config.run_once,
            max_failures: config.ingest_max_failures.max(1),
            cooldown: Duration::from_secs(config.ingest_cooldown_secs),
        }
    }
}

/// Runs an ingestion cycle on every tick until `shutdown` resolves.
///
/// A successful cycle dispatches through the ingestor's own trigger. When the
/// cycle fails, `dispatch` still runs against whatever the store holds, so
/// users moving into range of known events are notified while the feed is
/// down. Shutdown is only observed between cycles, so a cycle that has
/// started always finishes its sends. Consecutive feed or insert failures
/// trip a circuit breaker that pauses polling for the cooldown.
pub async fn run_scheduler<F, W, D, T, S>(
    settings: SchedulerSettings,
    ingestor: &Ingestor<F, W, D>,
    dispatch: &T,
    shutdown: S,
) -> u32
where
    F: DisasterFeed,
    W: EventWriter,
    D: DispatchTrigger,
    T: DispatchTrigger,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut consecutive_failures = 0;
    let mut cycles = 0;

    loop {
        if consecutive_failures >= settings.max_failures {
            warn!(
                "Circuit breaker tripped ({} consecutive ingestion failures)! Sleeping for {} seconds...",
                consecutive_failures,
                settings.cooldown.as_secs()
            );
            tokio::select! {
                _ = tokio::time::sleep(settings.cooldown) => {}
                _ = &mut shutdown => break,
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming polling.");
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        cycles += 1;
        match ingestor.ingest_cycle().await {
            Ok(summary) => {
                consecutive_failures = 0;
                info!(
                    "Ingestion cycle {} done: fetched={} inserted={}",
                    cycles, summary.fetched, summary.inserted
                );
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "Ingestion cycle {} failed: {}. Failure count ({} / {})",
                    cycles, e, consecutive_failures, settings.max_failures
                );
                info!("Dispatching against the stored events");
                dispatch.trigger().await;
            }
        }

        if settings.run_once {
            break;
        }
    }

    info!("Scheduler stopped after {} cycles", cycles);
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::testing::MemoryStore;
    use crate::error::FeedError;
    use crate::models::event::NewEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingFeed {
        calls: AtomicUsize,
        fail: bool,
    }

    impl DisasterFeed for CountingFeed {
        async fn fetch_events(&self) -> Result<Vec<NewEvent>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FeedError::Status(500));
            }
            Ok(Vec::new())
        }
    }

    struct NoopTrigger;

    impl DispatchTrigger for NoopTrigger {
        async fn trigger(&self) {}
    }

    #[derive(Default)]
    struct CountingTrigger {
        runs: AtomicUsize,
    }

    impl DispatchTrigger for CountingTrigger {
        async fn trigger(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings(run_once: bool) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_millis(10),
            run_once,
            max_failures: 2,
            cooldown: Duration::from_millis(40),
        }
    }

    #[tokio::test]
    async fn test_run_once_runs_a_single_cycle() {
        let feed = Arc::new(CountingFeed::default());
        let ingestor = Ingestor::new(feed.clone(), MemoryStore::default(), NoopTrigger);

        let fallback = CountingTrigger::default();

        let cycles =
            run_scheduler(settings(true), &ingestor, &fallback, std::future::pending()).await;

        assert_eq!(cycles, 1);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        // The ingestor dispatched on success, so the fallback stays idle.
        assert_eq!(fallback.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let feed = Arc::new(CountingFeed::default());
        let ingestor = Ingestor::new(feed.clone(), MemoryStore::default(), NoopTrigger);

        let cycles = run_scheduler(
            settings(false),
            &ingestor,
            &NoopTrigger,
            tokio::time::sleep(Duration::from_millis(55)),
        )
        .await;

        assert!(cycles >= 2, "only {} cycles ran", cycles);
        assert_eq!(feed.calls.load(Ordering::SeqCst), cycles as usize);
    }

    #[tokio::test]
    async fn test_breaker_pauses_after_repeated_failures() {
        let feed = Arc::new(CountingFeed {
            fail: true,
            ..Default::default()
        });
        let ingestor = Ingestor::new(feed.clone(), MemoryStore::default(), NoopTrigger);
        let fallback = CountingTrigger::default();

        // Two failures trip the breaker, which then sleeps past the shutdown.
        let cycles = run_scheduler(
            SchedulerSettings {
                cooldown: Duration::from_secs(60),
                ..settings(false)
            },
            &ingestor,
            &fallback,
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await;

        assert_eq!(cycles, 2);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_feed_outage_still_dispatches_every_tick() {
        let feed = Arc::new(CountingFeed {
            fail: true,
            ..Default::default()
        });
        let on_ingest = Arc::new(CountingTrigger::default());
        let ingestor = Ingestor::new(feed.clone(), MemoryStore::default(), on_ingest.clone());
        let fallback = CountingTrigger::default();

        let cycles = run_scheduler(
            SchedulerSettings {
                max_failures: 1_000,
                ..settings(false)
            },
            &ingestor,
            &fallback,
            tokio::time::sleep(Duration::from_millis(60)),
        )
        .await;

        assert!(cycles >= 2, "only {} cycles ran", cycles);
        assert_eq!(on_ingest.runs.load(Ordering::SeqCst), 0);
        assert_eq!(fallback.runs.load(Ordering::SeqCst), cycles as usize);
    }
}
