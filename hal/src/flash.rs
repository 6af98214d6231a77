//! Persistent-storage capability and region map

use serde::{Deserialize, Serialize};

use crate::Result;

/// Flash/NVM regions
///
/// Regions are partitioned at board bring-up; writes are whole-region
/// from the application's point of view and carry a trailing CRC laid
/// down by the owning subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlashRegion {
    /// Deployment sequencer state (owned by the deployment module)
    DeployState = 0,
    /// Mission counters and configuration
    MissionData = 1,
    /// Persistent fault log
    FaultLog = 2,
    /// Backup copies of critical state
    Backup = 3,
}

impl FlashRegion {
    /// Number of regions
    pub const COUNT: usize = 4;

    /// Table index for driver state arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Nominal size of the region in bytes
    #[must_use]
    pub const fn nominal_size(self) -> usize {
        match self {
            FlashRegion::DeployState => 256,
            FlashRegion::MissionData => 512,
            FlashRegion::FaultLog => 4096,
            FlashRegion::Backup => 1024,
        }
    }
}

/// Persistent-storage capability
pub trait FlashStore {
    /// Read bytes from a region
    fn read(&mut self, region: FlashRegion, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Write bytes to a region
    fn write(&mut self, region: FlashRegion, offset: usize, data: &[u8]) -> Result<()>;

    /// Erase a region to its blank state
    fn erase(&mut self, region: FlashRegion) -> Result<()>;

    /// Size of a region in bytes
    fn region_size(&self, region: FlashRegion) -> usize;
}
