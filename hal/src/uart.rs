//! UART capability

use serde::{Deserialize, Serialize};

use crate::Result;

/// UART port identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UartPort {
    /// Debug console (flight-log sink)
    Debug,
    /// Payload serial link
    Payload,
}

/// UART capability
pub trait Uart {
    /// Write bytes, blocking until queued to the transmitter
    fn write(&mut self, port: UartPort, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes
    ///
    /// Returns the number of bytes read, or a timeout error when no
    /// byte arrives within `timeout_ms`.
    fn read(&mut self, port: UartPort, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;
}
