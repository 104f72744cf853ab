//! In-memory PLC simulation
//!
//! Holds a byte vector per numbered area. Used when no hardware is attached
//! and as the transport double in tests.

use crate::transport::traits::{PlcTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// A write observed by the simulated PLC
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub area: u16,
    pub start: usize,
    pub data: Vec<u8>,
}

/// Simulated PLC memory with optional injected failures
#[derive(Debug, Default)]
pub struct MemoryTransport {
    areas: Mutex<HashMap<u16, Vec<u8>>>,
    #[cfg(test)]
    writes: Mutex<Vec<WriteRecord>>,
    /// Failures returned by the next operations, in order
    faults: Mutex<VecDeque<TransportError>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-filled area of `size` bytes
    pub fn with_area(self, area: u16, size: usize) -> Self {
        self.lock_areas().insert(area, vec![0; size]);
        self
    }

    /// Place bytes into an area as if the PLC program wrote them
    pub fn load(&self, area: u16, start: usize, data: &[u8]) -> Result<(), TransportError> {
        let mut areas = self.lock_areas();
        let memory = areas
            .get_mut(&area)
            .ok_or_else(|| TransportError::Connection(format!("no such area {}", area)))?;
        let range = checked_range(area, memory.len(), start, data.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    fn take_fault(&self) -> Option<TransportError> {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn lock_areas(&self) -> std::sync::MutexGuard<'_, HashMap<u16, Vec<u8>>> {
        self.areas.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl MemoryTransport {
    /// Copy of an area's current contents
    pub fn area(&self, area: u16) -> Option<Vec<u8>> {
        self.lock_areas().get(&area).cloned()
    }

    /// Writes performed through the transport so far
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the next operation fail with `error`
    pub fn inject_fault(&self, error: TransportError) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }
}

fn checked_range(
    area: u16,
    size: usize,
    start: usize,
    length: usize,
) -> Result<std::ops::Range<usize>, TransportError> {
    let end = start + length;
    if end > size {
        return Err(TransportError::OutOfRange {
            area,
            start,
            end,
            size,
        });
    }
    Ok(start..end)
}

#[async_trait]
impl PlcTransport for MemoryTransport {
    async fn read_range(&self, area: u16, start: usize, length: usize) -> Result<Bytes, TransportError> {
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        let areas = self.lock_areas();
        let memory = areas
            .get(&area)
            .ok_or_else(|| TransportError::Connection(format!("no such area {}", area)))?;
        let range = checked_range(area, memory.len(), start, length)?;
        Ok(Bytes::copy_from_slice(&memory[range]))
    }

    async fn write_range(&self, area: u16, start: usize, data: &[u8]) -> Result<(), TransportError> {
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        self.load(area, start, data)?;
        debug!("[SIM] wrote {} bytes to area {} at {}", data.len(), area, start);
        #[cfg(test)]
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(WriteRecord {
                area,
                start,
                data: data.to_vec(),
            });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Simulation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let plc = MemoryTransport::new().with_area(7, 16);
        plc.write_range(7, 4, &[1, 2, 3]).await.unwrap();

        let bytes = plc.read_range(7, 3, 5).await.unwrap();
        assert_eq!(&bytes[..], &[0, 1, 2, 3, 0]);
        assert_eq!(plc.writes().len(), 1);
        assert_eq!(plc.name(), "Simulation");
    }

    #[tokio::test]
    async fn test_out_of_range_and_missing_area() {
        let plc = MemoryTransport::new().with_area(7, 16);
        assert_eq!(
            plc.read_range(7, 10, 8).await.unwrap_err(),
            TransportError::OutOfRange {
                area: 7,
                start: 10,
                end: 18,
                size: 16
            }
        );
        assert!(matches!(
            plc.read_range(8, 0, 1).await,
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let plc = MemoryTransport::new().with_area(1, 4);
        plc.inject_fault(TransportError::Timeout);
        plc.inject_fault(TransportError::Connection("reset".into()));

        assert_eq!(plc.read_range(1, 0, 4).await.unwrap_err(), TransportError::Timeout);
        assert!(matches!(
            plc.write_range(1, 0, &[9]).await,
            Err(TransportError::Connection(_))
        ));
        assert!(plc.write_range(1, 0, &[9]).await.is_ok());
        assert!(plc.writes().len() == 1);
    }
}
