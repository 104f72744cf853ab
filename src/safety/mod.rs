//! Safety Module
//!
//! Admission control for incoming commands: the current hub mode decides
//! which command types may reach the actuator.

mod guard;
mod hub_state;

pub use guard::{AdmissionPolicy, Guard};
pub use hub_state::{HubStateProvider, SharedHubState};
