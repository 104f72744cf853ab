//! Hub state provider
//!
//! Supplies the latest [`HubStateSnapshot`] to the command processor. The
//! guard reads it fresh for every admission attempt.

use hub_bridge_shared::HubStateSnapshot;
use std::sync::RwLock;
use tracing::info;

/// Source of the hub's current mode
pub trait HubStateProvider: Send + Sync {
    /// Latest snapshot, or `None` while the hub state is not known yet
    fn snapshot(&self) -> Option<HubStateSnapshot>;
}

/// Updatable hub state cell
///
/// Starts empty, so every command is denied until the first update.
#[derive(Debug, Default)]
pub struct SharedHubState {
    current: RwLock<Option<HubStateSnapshot>>,
}

impl SharedHubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: HubStateSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(snapshot)),
        }
    }

    /// Replace the current snapshot
    pub fn update(&self, snapshot: HubStateSnapshot) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.map(|c| c.mode) != Some(snapshot.mode) {
            info!("[HUB] Mode changed: {:?} -> {}", current.map(|c| c.mode), snapshot.mode);
        }
        *current = Some(snapshot);
    }

    /// Forget the current snapshot, e.g. after losing the PLC link
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl HubStateProvider for SharedHubState {
    fn snapshot(&self) -> Option<HubStateSnapshot> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_bridge_shared::{ExecutionState, HubMode};

    #[test]
    fn test_starts_unknown_and_updates() {
        let state = SharedHubState::new();
        assert!(state.snapshot().is_none());

        let ready = HubStateSnapshot::new(HubMode::CycleReady, ExecutionState::Idle);
        state.update(ready);
        assert_eq!(state.snapshot(), Some(ready));

        state.clear();
        assert!(state.snapshot().is_none());
    }
}
