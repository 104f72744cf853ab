//! Periodic expiry of stale commands and dedup entries

use crate::gateway::DedupCache;
use hub_bridge_shared::CommandRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub purged: usize,
    pub tokens_purged: usize,
}

/// Runs timeout and TTL sweeps over the registry and dedup caches
pub struct Sweeper {
    registry: Arc<Mutex<CommandRegistry>>,
    caches: Vec<Arc<Mutex<DedupCache>>>,
    check_interval: Duration,
}

impl Sweeper {
    pub fn new(registry: Arc<Mutex<CommandRegistry>>, check_interval: Duration) -> Self {
        Self {
            registry,
            caches: Vec::new(),
            check_interval,
        }
    }

    /// Also purge expired tokens from `cache` on every sweep
    pub fn with_cache(mut self, cache: Arc<Mutex<DedupCache>>) -> Self {
        self.caches.push(cache);
        self
    }

    /// Run one sweep
    pub async fn sweep(&self) -> SweepReport {
        let (timed_out, purged) = {
            let mut registry = self.registry.lock().await;
            (registry.expire_timeouts(), registry.gc_ttl())
        };

        let mut tokens_purged = 0;
        for cache in &self.caches {
            tokens_purged += cache.lock().await.gc_ttl();
        }

        SweepReport {
            timed_out,
            purged,
            tokens_purged,
        }
    }

    /// Start the sweep loop
    pub async fn run(&self) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let report = self.sweep().await;
            if report.timed_out > 0 {
                info!("{} commands timed out", report.timed_out);
            }
            if report.purged > 0 || report.tokens_purged > 0 {
                debug!(
                    "Purged {} command records and {} tokens past TTL",
                    report.purged, report.tokens_purged
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_bridge_shared::{Command, CommandStatus, ManualClock};

    #[tokio::test]
    async fn test_sweep_expires_and_purges() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(Mutex::new(CommandRegistry::new(clock.clone()).with_timeouts(
            Duration::from_secs(3),
            Duration::from_secs(80),
            Duration::from_secs(10),
        )));
        let cache = Arc::new(Mutex::new(DedupCache::new(clock.clone(), Duration::from_secs(5))));
        let sweeper = Sweeper::new(registry.clone(), Duration::from_secs(1)).with_cache(cache.clone());

        registry.lock().await.on_received(Command::new("c1", "start_cycle"));
        cache.lock().await.store("t1", "start_cycle");

        clock.advance_ms(4_000);
        assert_eq!(
            sweeper.sweep().await,
            SweepReport {
                timed_out: 1,
                purged: 0,
                tokens_purged: 0
            }
        );
        assert_eq!(
            registry.lock().await.get("c1").map(|r| r.status),
            Some(CommandStatus::Timeout)
        );

        clock.advance_ms(6_000);
        let report = sweeper.sweep().await;
        assert_eq!(report.purged, 1);
        assert_eq!(report.tokens_purged, 1);
        assert!(registry.lock().await.is_empty());
        assert!(cache.lock().await.is_empty());
    }
}
