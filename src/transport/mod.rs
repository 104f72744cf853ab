//! PLC transport layer
//!
//! The bridge only needs byte-range reads and writes on numbered memory
//! areas. Vendor protocols plug in behind [`PlcTransport`]; the in-memory
//! implementation backs simulation mode and tests.

mod memory;
mod traits;

pub use memory::MemoryTransport;
pub use traits::{PlcTransport, TransportError};
