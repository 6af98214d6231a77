//! I²C capability

use serde::{Deserialize, Serialize};

use crate::Result;

/// I²C bus identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum I2cBusId {
    /// Sensor bus (magnetometer, housekeeping sensors)
    Sensor,
    /// Payload bus
    Payload,
}

/// I²C bus speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum I2cSpeed {
    /// Standard mode, 100 kHz
    Standard100k,
    /// Fast mode, 400 kHz
    Fast400k,
}

/// 7-bit address of the three-axis magnetometer on the sensor bus
pub const MAGNETOMETER_ADDR: u8 = 0x1E;

/// I²C capability
pub trait I2cBus {
    /// Write bytes to a device
    fn write(&mut self, bus: I2cBusId, addr: u8, data: &[u8]) -> Result<()>;

    /// Read bytes from a device
    fn read(&mut self, bus: I2cBusId, addr: u8, buf: &mut [u8]) -> Result<()>;

    /// Write then read in one transaction (repeated start)
    fn write_then_read(
        &mut self,
        bus: I2cBusId,
        addr: u8,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<()>;

    /// Probe for a device at the given address
    fn device_present(&mut self, bus: I2cBusId, addr: u8) -> bool;

    /// Attempt bus recovery after a lockup
    fn recover(&mut self, bus: I2cBusId) -> Result<()>;
}
