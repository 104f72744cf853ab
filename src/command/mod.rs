//! Command processing for the hub bridge
//!
//! This module handles:
//! - Registering commands and suppressing redelivered ones
//! - Gating commands against the hub mode
//! - Dispatching to the actuator with bounded retry
//! - Sweeping timed-out and expired records

pub mod handlers;
mod processor;
mod sweeper;

pub use processor::{CommandProcessor, RetryPolicy};
pub use sweeper::Sweeper;
