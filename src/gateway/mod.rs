//! PLC feedback gateways
//!
//! The actuator reports on a command through two handshake frames: an
//! acknowledgement when it picks the command up and an execution frame once
//! it has run. Each frame carries a trigger flag that the bridge clears after
//! handling, and a token used to recognise redelivery.

mod dedup;
mod poller;
mod trigger;

pub use dedup::DedupCache;
pub use poller::TriggerPoller;
pub use trigger::{AckGateway, ExecGateway};
