//! Trigger poller
//!
//! Polls a handshake frame, hands fresh events to a callback exactly once per
//! token, and clears the trigger afterwards. A token is recorded before the
//! trigger is cleared, so a failed clear only causes the next poll to see a
//! redelivery and retry the clear.

use super::dedup::DedupCache;
use super::trigger::{GatewayError, TriggerGateway};
use hub_bridge_shared::FrameSnapshot;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent<S> {
    /// Trigger not set
    Idle,
    /// New event, handled and cleared
    Fresh(S),
    /// Token already handled; trigger cleared again
    Redelivered(S),
}

/// Gateway plus dedup cache for one handshake frame
pub struct TriggerPoller<S> {
    gateway: TriggerGateway<S>,
    dedup: Arc<Mutex<DedupCache>>,
}

impl<S: FrameSnapshot + Clone> TriggerPoller<S> {
    pub fn new(gateway: TriggerGateway<S>, dedup: Arc<Mutex<DedupCache>>) -> Self {
        Self { gateway, dedup }
    }

    /// Poll once, passing a fresh snapshot to `handle` before clearing its trigger
    pub async fn poll_once<F, Fut>(&self, handle: F) -> Result<PollEvent<S>, GatewayError>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = ()>,
    {
        let snapshot = self.gateway.read_snapshot().await?;
        if !self.gateway.is_pending(&snapshot)? {
            return Ok(PollEvent::Idle);
        }

        let redelivered = self.dedup.lock().await.is_duplicate(snapshot.token());
        if !redelivered {
            handle(snapshot.clone()).await;
            self.dedup
                .lock()
                .await
                .store(snapshot.token(), snapshot.command());
        }

        self.gateway.consume_trigger(&snapshot).await?;

        if redelivered {
            Ok(PollEvent::Redelivered(snapshot))
        } else {
            Ok(PollEvent::Fresh(snapshot))
        }
    }

    /// Start the polling loop
    pub async fn run<F, Fut>(&self, period: Duration, mut handle: F)
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[{}] Polling area {} every {:?}", S::KIND, self.gateway.frame().area(), period);

        loop {
            ticker.tick().await;

            match self.poll_once(&mut handle).await {
                Ok(PollEvent::Idle) => {}
                Ok(PollEvent::Fresh(snapshot)) => {
                    debug!("[{}] Handled token {}", S::KIND, snapshot.token());
                }
                Ok(PollEvent::Redelivered(snapshot)) => {
                    let first = self
                        .dedup
                        .lock()
                        .await
                        .get(snapshot.token())
                        .map(|entry| entry.command.clone());
                    info!(
                        "[{}] Redelivered token {} ignored (handled as {:?})",
                        S::KIND,
                        snapshot.token(),
                        first
                    );
                }
                Err(e) => {
                    warn!("[{}] Poll failed: {}", S::KIND, e);
                }
            }
        }
    }
}
