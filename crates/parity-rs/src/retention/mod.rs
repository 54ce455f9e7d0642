//! Member storage: block devices, mmap-backed disk images and the array built on them.

pub mod array;
pub mod disk;

use crate::error::RaidResult;

/// BlockDevice is a member that reads and writes whole blocks.
pub trait BlockDevice {
    /// read_blocks fills `buf` (a whole number of blocks) starting at `lba`.
    ///
    /// # Errors
    /// Returns `RaidError::Media` when the device cannot deliver the blocks.
    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> RaidResult<()>;

    /// write_blocks stores `data` (a whole number of blocks) starting at `lba`.
    ///
    /// # Errors
    /// Returns `RaidError::Media` when the device cannot take the blocks.
    fn write_blocks(&mut self, lba: u64, data: &[u8]) -> RaidResult<()>;
}
