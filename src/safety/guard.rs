//! Admission Guard
//!
//! Decides whether a command may be dispatched given the hub's current mode.
//! The per-mode allow-lists are the canonical safety policy; they are built
//! once at startup and shared read-only.

use hub_bridge_shared::{Command, HubMode, HubStateSnapshot};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Why a command was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    SafetyStopActive,
    HubError,
    HubStateUnknown,
    HubBusy,
    ActionNeeded,
}

impl DenyReason {
    /// Stable reason code reported upstream
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::SafetyStopActive => "safety_stop_active",
            DenyReason::HubError => "hub_error",
            DenyReason::HubStateUnknown => "hub_state_unknown",
            DenyReason::HubBusy => "hub_busy",
            DenyReason::ActionNeeded => "action_needed",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl GuardDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Command types permitted in each hub mode
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    allowed: HashMap<HubMode, HashSet<&'static str>>,
}

impl AdmissionPolicy {
    /// The hub's standard policy
    pub fn standard() -> Self {
        let table: [(HubMode, &[&'static str]); 7] = [
            (HubMode::Error, &["fault_ack", "safety_stop", "machine_off"]),
            (
                HubMode::Unknown,
                &["machine_on", "machine_off", "fault_ack", "safety_ack", "safety_stop"],
            ),
            (HubMode::SafetyStop, &["safety_ack", "machine_off", "safety_stop"]),
            (
                HubMode::CycleActive,
                &[
                    "stop_cycle",
                    "machine_off",
                    "safety_stop",
                    "prepare_to_start",
                    "uav_started",
                    "perform_diagnostic",
                    "diagnostic_ok",
                    "diagnostic_nok",
                    "uav_landed",
                    "hide_in_hub",
                    "request_to_land",
                    "load_battery",
                    "unload_battery",
                    "load_uav_to_docks",
                    "unload_uav_from_docks",
                    "start_mission",
                    "abort_mission",
                ],
            ),
            (HubMode::CycleReady, &["start_cycle", "machine_off", "safety_stop"]),
            (HubMode::HomingActive, &["stop_homing", "machine_off", "safety_stop"]),
            (HubMode::HomingReady, &["start_homing", "machine_off", "safety_stop"]),
        ];

        Self::from_table(table)
    }

    /// Build a policy from explicit `(mode, command types)` rows
    pub fn from_table<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (HubMode, &'a [&'static str])>,
    {
        let allowed = rows
            .into_iter()
            .map(|(mode, types)| (mode, types.iter().copied().collect()))
            .collect();
        Self { allowed }
    }

    pub fn allows(&self, mode: HubMode, command_type: &str) -> bool {
        self.allowed
            .get(&mode)
            .map(|types| types.contains(command_type))
            .unwrap_or(false)
    }

    /// Every command type permitted in at least one mode
    pub fn command_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        let all: HashSet<&'static str> = self.allowed.values().flatten().copied().collect();
        all.into_iter()
    }
}

/// Pure admission check against an injected policy
#[derive(Debug, Clone)]
pub struct Guard {
    policy: Arc<AdmissionPolicy>,
}

impl Guard {
    pub fn new(policy: Arc<AdmissionPolicy>) -> Self {
        Self { policy }
    }

    /// Check a command against the hub state
    ///
    /// A missing snapshot denies with `HubStateUnknown`. Otherwise the mode
    /// selects an allow-list, and a type outside it is denied with the reason
    /// bound to that mode.
    pub fn check(&self, command: &Command, hub_state: Option<&HubStateSnapshot>) -> GuardDecision {
        let Some(state) = hub_state else {
            return GuardDecision::deny(DenyReason::HubStateUnknown);
        };

        let reason = match state.mode {
            HubMode::Unknown => DenyReason::HubStateUnknown,
            HubMode::SafetyStop => DenyReason::SafetyStopActive,
            HubMode::Error => DenyReason::HubError,
            HubMode::HomingActive => DenyReason::HubBusy,
            HubMode::HomingReady | HubMode::CycleReady | HubMode::CycleActive => {
                DenyReason::ActionNeeded
            }
        };

        if self.policy.allows(state.mode, &command.command_type) {
            GuardDecision::allow()
        } else {
            GuardDecision::deny(reason)
        }
    }
}
