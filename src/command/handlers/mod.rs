//! Command handlers for the hub actuator
//!
//! The processor only checks that a handler is registered for a command
//! type; the handler owns how the command reaches the actuator.

mod plc;

pub use plc::PlcCommandHandler;

use async_trait::async_trait;
use hub_bridge_shared::Command;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of a single dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The actuator received the command
    Ok,
    /// Transport or device error
    Error,
    /// The transport gave up waiting
    Timeout,
    /// The command cannot be expressed for the actuator; retrying is pointless
    InvalidParameters,
}

impl SendStatus {
    pub fn is_retriable(self) -> bool {
        matches!(self, SendStatus::Error | SendStatus::Timeout)
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendStatus::Ok => "write_ok",
            SendStatus::Error => "write_error",
            SendStatus::Timeout => "write_timeout",
            SendStatus::InvalidParameters => "write_invalid_parameters",
        };
        f.write_str(name)
    }
}

/// Delivers a command to the actuator
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Perform one delivery attempt
    async fn dispatch(&self, command: &Command) -> SendStatus;
}

/// Handlers keyed by command type
pub type HandlerMap = HashMap<String, Arc<dyn CommandHandler>>;

/// Register one handler for every listed command type
pub fn register_all<'a>(
    handlers: &mut HandlerMap,
    command_types: impl IntoIterator<Item = &'a str>,
    handler: Arc<dyn CommandHandler>,
) {
    for command_type in command_types {
        handlers.insert(command_type.to_string(), handler.clone());
    }
}
