//! Control frame handler
//!
//! Writes a command into the PLC control area and raises its trigger:
//! ```text
//! [ trigger=1 ][ command: STRING(100) ][ token=command_id: STRING(40) ][ mission_id ]
//! ```

use super::{CommandHandler, SendStatus};
use crate::transport::{PlcTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use hub_bridge_shared::codec::{EncodeError, FieldValue, FrameWriter};
use hub_bridge_shared::{Command, FrameSpec};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatches commands through the control frame
pub struct PlcCommandHandler {
    transport: Arc<dyn PlcTransport>,
    frame: Arc<FrameSpec>,
}

impl PlcCommandHandler {
    pub fn new(transport: Arc<dyn PlcTransport>, frame: Arc<FrameSpec>) -> Self {
        Self { transport, frame }
    }

    /// Encode the control frame for a command
    pub fn encode(&self, command: &Command) -> Result<Bytes, EncodeError> {
        let mission_id = mission_id(command)?;
        let mut writer = FrameWriter::new(&self.frame);
        writer
            .put("trigger", FieldValue::Int16(1))?
            .put("command", FieldValue::Text(command.command_type.clone()))?
            .put("token", FieldValue::Text(command.command_id.clone()))?
            .put("mission_id", FieldValue::Int16(mission_id))?;
        Ok(writer.finish())
    }
}

fn mission_id(command: &Command) -> Result<i16, EncodeError> {
    let invalid = || EncodeError::TypeMismatch {
        field: "mission_id".to_string(),
        expected: "INT16",
    };
    match command.payload.get("mission_id") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[async_trait]
impl CommandHandler for PlcCommandHandler {
    async fn dispatch(&self, command: &Command) -> SendStatus {
        let frame = match self.encode(command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[PLC] Cannot encode command {}: {}", command.command_id, e);
                return SendStatus::InvalidParameters;
            }
        };

        match self
            .transport
            .write_range(self.frame.area(), self.frame.start(), &frame)
            .await
        {
            Ok(()) => {
                debug!(
                    "[PLC] Control frame written for {} via {}",
                    command.command_id,
                    self.transport.name()
                );
                SendStatus::Ok
            }
            Err(TransportError::Timeout) => SendStatus::Timeout,
            Err(e) => {
                warn!("[PLC] Write failed for {}: {}", command.command_id, e);
                SendStatus::Error
            }
        }
    }
}
