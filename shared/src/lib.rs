//! Hub Bridge Shared Types
//!
//! This crate provides the command model, frame schema, codec and command
//! registry shared by the hub bridge runtime and its tests.

pub mod clock;
pub mod codec;
pub mod frame;
pub mod snapshot;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame::{DataType, FieldSpec, FrameSpec, SchemaError};
pub use snapshot::{AckSnapshot, ExecSnapshot, FrameSnapshot};
pub use state_machine::{CommandRecord, CommandRegistry, Transition, TransitionResult};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters for the command lifecycle
pub mod timing {
    /// Time a RECEIVED command may wait for dispatch before it times out
    pub const ACCEPT_TIMEOUT_MS: u64 = 3_000;

    /// Time an ACCEPTED command may wait for execution before it times out
    pub const EXEC_TIMEOUT_MS: u64 = 80_000;

    /// Maximum age of a registry or dedup entry before it is purged
    pub const RECORD_TTL_MS: u64 = 600_000;

    /// Total dispatch attempts per command
    pub const DISPATCH_MAX_ATTEMPTS: u32 = 3;

    /// Backoff before the second dispatch attempt, doubled for each further one
    pub const DISPATCH_INITIAL_BACKOFF_MS: u64 = 100;
}

/// A command issued by the fleet orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub command_type: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

impl Command {
    /// Create a command without payload
    pub fn new(command_id: impl Into<String>, command_type: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            command_type: command_type.into(),
            payload: BTreeMap::new(),
        }
    }

    /// Add a payload entry
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Received,
    Accepted,
    Executed,
    Rejected,
    Timeout,
    Failed,
}

impl CommandStatus {
    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Executed
                | CommandStatus::Rejected
                | CommandStatus::Timeout
                | CommandStatus::Failed
        )
    }
}

/// Operating mode reported by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMode {
    Error,
    Unknown,
    SafetyStop,
    CycleActive,
    CycleReady,
    HomingActive,
    HomingReady,
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubMode::Error => "error",
            HubMode::Unknown => "unknown",
            HubMode::SafetyStop => "safety_stop",
            HubMode::CycleActive => "cycle_active",
            HubMode::CycleReady => "cycle_ready",
            HubMode::HomingActive => "homing_active",
            HubMode::HomingReady => "homing_ready",
        };
        f.write_str(name)
    }
}

impl FromStr for HubMode {
    type Err = UnknownHubMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(HubMode::Error),
            "unknown" => Ok(HubMode::Unknown),
            "safety_stop" => Ok(HubMode::SafetyStop),
            "cycle_active" => Ok(HubMode::CycleActive),
            "cycle_ready" => Ok(HubMode::CycleReady),
            "homing_active" => Ok(HubMode::HomingActive),
            "homing_ready" => Ok(HubMode::HomingReady),
            _ => Err(UnknownHubMode(s.to_string())),
        }
    }
}

/// A hub mode name that matches no [`HubMode`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hub mode '{0}'")]
pub struct UnknownHubMode(pub String);

/// Execution state of the hub actuator logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Idle,
    Executing,
    ActionNeeded,
    Failed,
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStateSnapshot {
    pub mode: HubMode,
    pub execution_state: ExecutionState,
}

impl HubStateSnapshot {
    pub fn new(mode: HubMode, execution_state: ExecutionState) -> Self {
        Self {
            mode,
            execution_state,
        }
    }
}
