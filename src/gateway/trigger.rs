//! Handshake frame gateway
//!
//! Reads a frame's declared byte range, decodes it into a snapshot and clears
//! the trigger flag once the event has been handled.

use crate::transport::{PlcTransport, TransportError};
use hub_bridge_shared::codec::{self, DecodeError};
use hub_bridge_shared::{AckSnapshot, ExecSnapshot, FrameSnapshot, FrameSpec};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Name of the handshake field every gateway frame must carry
pub const TRIGGER_FIELD: &str = "trigger";

/// Errors raised by a gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("{kind} trigger is set but the token is blank")]
    MissingToken { kind: &'static str },

    #[error("gateway misconfigured: {0}")]
    Misconfigured(String),
}

/// Gateway for one handshake frame decoded as `S`
pub struct TriggerGateway<S> {
    transport: Arc<dyn PlcTransport>,
    frame: Arc<FrameSpec>,
    trigger_offset: usize,
    _snapshot: PhantomData<fn() -> S>,
}

pub type AckGateway = TriggerGateway<AckSnapshot>;
pub type ExecGateway = TriggerGateway<ExecSnapshot>;

impl<S: FrameSnapshot> TriggerGateway<S> {
    /// Create a gateway; the frame must have a trigger field inside its range
    pub fn new(transport: Arc<dyn PlcTransport>, frame: Arc<FrameSpec>) -> Result<Self, GatewayError> {
        let trigger = frame.field(TRIGGER_FIELD).ok_or_else(|| {
            GatewayError::Misconfigured(format!("{} frame has no '{}' field", S::KIND, TRIGGER_FIELD))
        })?;

        let trigger_offset = trigger.offset();
        if !(frame.start()..frame.end()).contains(&trigger_offset) {
            return Err(GatewayError::Misconfigured(format!(
                "{} trigger offset {} is outside frame range [{}, {})",
                S::KIND,
                trigger_offset,
                frame.start(),
                frame.end()
            )));
        }

        Ok(Self {
            transport,
            frame,
            trigger_offset,
            _snapshot: PhantomData,
        })
    }

    pub fn frame(&self) -> &FrameSpec {
        &self.frame
    }

    /// Read and decode the frame
    pub async fn read_snapshot(&self) -> Result<S, GatewayError> {
        let data = self
            .transport
            .read_range(self.frame.area(), self.frame.start(), self.frame.length())
            .await?;
        let mut snapshot: S = codec::decode(&data, &self.frame)?;
        snapshot.trim_token();
        Ok(snapshot)
    }

    /// Whether the snapshot carries a pending event
    ///
    /// A set trigger with a blank token is a fault, never a pending event.
    pub fn is_pending(&self, snapshot: &S) -> Result<bool, GatewayError> {
        if snapshot.trigger() == 0 {
            return Ok(false);
        }
        if snapshot.token().trim().is_empty() {
            return Err(GatewayError::MissingToken { kind: S::KIND });
        }
        Ok(true)
    }

    /// Clear the trigger for a handled snapshot
    ///
    /// Returns `false` without writing when no event is pending.
    pub async fn consume_trigger(&self, snapshot: &S) -> Result<bool, GatewayError> {
        if !self.is_pending(snapshot)? {
            return Ok(false);
        }

        self.transport
            .write_range(self.frame.area(), self.trigger_offset, &[0, 0])
            .await?;
        debug!("[{}] Trigger cleared for token {}", S::KIND, snapshot.token());
        Ok(true)
    }
}
