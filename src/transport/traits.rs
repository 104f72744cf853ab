//! Transport trait abstraction for PLC memory access

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failures reported by a PLC transport
///
/// Reconnection is owned by the transport; callers only see the outcome of
/// a single read or write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out")]
    Timeout,

    #[error("range {start}..{end} outside area {area} ({size} bytes)")]
    OutOfRange {
        area: u16,
        start: usize,
        end: usize,
        size: usize,
    },
}

/// Byte-range access to numbered PLC memory areas
#[async_trait]
pub trait PlcTransport: Send + Sync {
    /// Read `length` bytes starting at `start` in `area`
    async fn read_range(&self, area: u16, start: usize, length: usize) -> Result<Bytes, TransportError>;

    /// Write `data` starting at `start` in `area`
    async fn write_range(&self, area: u16, start: usize, data: &[u8]) -> Result<(), TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
