//! 520-byte sectors: 512 data bytes followed by checksum and stamp metadata.

use std::ops::{BitXor, BitXorAssign};

#[cfg(test)]
mod sector_tests;

/// BLOCK_BYTES is the on-disk size of one block including metadata.
pub const BLOCK_BYTES: usize = 520;
/// DATA_BYTES is the host-visible payload of one block.
pub const DATA_BYTES: usize = 512;
/// CHECKSUM_SEED is folded into every sector checksum.
pub const CHECKSUM_SEED: u16 = 0xAF76;

const CRC_OFFSET: usize = DATA_BYTES;
const TIME_STAMP_OFFSET: usize = DATA_BYTES + 2;
const WRITE_STAMP_OFFSET: usize = DATA_BYTES + 4;
const LBA_STAMP_OFFSET: usize = DATA_BYTES + 6;

const INVALIDATED_CRC_MARK: u16 = 0x8001;
const INVALIDATED_FILL: u8 = 0x5A;

/// `checksum` folds a data payload into the 16-bit sector checksum.
///
/// # Arguments
/// * `data` - The 512-byte payload of a sector.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    let mut acc = 0u32;
    for word in data.chunks_exact(4) {
        acc = acc.rotate_left(1) ^ u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
    }
    #[allow(clippy::cast_possible_truncation)]
    let folded = ((acc >> 16) ^ (acc & 0xFFFF)) as u16;
    folded ^ CHECKSUM_SEED
}

/// `lba_stamp` returns the stamp expected for a sector at the absolute member LBA.
#[inline]
#[must_use]
pub const fn lba_stamp(lba: u64) -> u16 {
    #[allow(clippy::cast_possible_truncation)]
    let stamp = (lba ^ (lba >> 16) ^ (lba >> 32) ^ (lba >> 48)) as u16;
    stamp
}

/// Metadata holds the trailing eight bytes of a sector.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    pub crc: u16,
    pub time_stamp: u16,
    pub write_stamp: u16,
    pub lba_stamp: u16,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
/// Sector stores one block with its metadata and XOR helpers.
pub struct Sector(pub [u8; BLOCK_BYTES]);

impl Default for Sector {
    fn default() -> Self {
        Self::zero()
    }
}

impl Sector {
    #[inline]
    #[must_use]
    /// `zero` returns a zero-filled sector.
    pub const fn zero() -> Self {
        Self([0u8; BLOCK_BYTES])
    }

    /// `formatted` builds a sector around a payload with a valid checksum and LBA stamp.
    ///
    /// # Arguments
    /// * `payload` - Host data; shorter payloads are zero padded.
    /// * `lba` - Absolute member LBA the sector will be written to.
    #[must_use]
    pub fn formatted(payload: &[u8], lba: u64) -> Self {
        let mut sector = Self::zero();
        let n = payload.len().min(DATA_BYTES);
        sector.0[..n].copy_from_slice(&payload[..n]);
        sector.set_metadata(Metadata {
            crc: checksum(sector.data()),
            lba_stamp: lba_stamp(lba),
            ..Metadata::default()
        });
        sector
    }

    /// `from_bytes` copies one block out of a raw buffer.
    ///
    /// # Returns
    /// `None` when `bytes` is not exactly one block long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; BLOCK_BYTES] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BLOCK_BYTES] {
        &self.0
    }

    #[inline]
    pub const fn as_bytes_mut(&mut self) -> &mut [u8; BLOCK_BYTES] {
        &mut self.0
    }

    #[inline]
    #[must_use]
    /// `data` returns the host-visible payload.
    pub fn data(&self) -> &[u8] {
        &self.0[..DATA_BYTES]
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.0[..DATA_BYTES]
    }

    #[must_use]
    pub fn metadata(&self) -> Metadata {
        let word = |at: usize| u16::from_le_bytes([self.0[at], self.0[at + 1]]);
        Metadata {
            crc: word(CRC_OFFSET),
            time_stamp: word(TIME_STAMP_OFFSET),
            write_stamp: word(WRITE_STAMP_OFFSET),
            lba_stamp: word(LBA_STAMP_OFFSET),
        }
    }

    pub fn set_metadata(&mut self, meta: Metadata) {
        self.0[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&meta.crc.to_le_bytes());
        self.0[TIME_STAMP_OFFSET..TIME_STAMP_OFFSET + 2]
            .copy_from_slice(&meta.time_stamp.to_le_bytes());
        self.0[WRITE_STAMP_OFFSET..WRITE_STAMP_OFFSET + 2]
            .copy_from_slice(&meta.write_stamp.to_le_bytes());
        self.0[LBA_STAMP_OFFSET..LBA_STAMP_OFFSET + 2]
            .copy_from_slice(&meta.lba_stamp.to_le_bytes());
    }

    #[must_use]
    /// `has_valid_checksum` recomputes the payload checksum and compares it to the stored one.
    pub fn has_valid_checksum(&self) -> bool {
        checksum(self.data()) == self.metadata().crc
    }

    #[must_use]
    /// `has_valid_lba_stamp` accepts the expected stamp for `lba` or an unstamped sector.
    ///
    /// # Arguments
    /// * `lba` - Absolute member LBA the sector was read from.
    pub fn has_valid_lba_stamp(&self, lba: u64) -> bool {
        let stamp = self.metadata().lba_stamp;
        stamp == 0 || stamp == lba_stamp(lba)
    }

    /// `invalidate` overwrites the sector with the invalidated pattern for `lba`.
    ///
    /// The result never passes checksum validation and is recognized by
    /// [`Self::is_invalidated`].
    pub fn invalidate(&mut self, lba: u64) {
        self.0[..DATA_BYTES].fill(INVALIDATED_FILL);
        self.0[..8].copy_from_slice(&lba.to_le_bytes());
        let crc = checksum(self.data()) ^ INVALIDATED_CRC_MARK;
        self.set_metadata(Metadata {
            crc,
            lba_stamp: lba_stamp(lba),
            ..Metadata::default()
        });
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.metadata().crc == checksum(self.data()) ^ INVALIDATED_CRC_MARK
            && self.0[8..DATA_BYTES].iter().all(|&b| b == INVALIDATED_FILL)
    }

    #[inline]
    /// `xor_in_place` performs an in-place XOR with another sector.
    ///
    /// # Arguments
    /// * `rhs` - The sector to XOR into this one.
    pub fn xor_in_place(&mut self, rhs: &Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a ^= *b;
        }
    }
}

impl BitXor for Sector {
    type Output = Self;
    #[inline]
    fn bitxor(mut self, rhs: Self) -> Self::Output {
        self.xor_in_place(&rhs);
        self
    }
}

impl BitXorAssign for Sector {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        self.xor_in_place(&rhs);
    }
}

impl BitXorAssign<&Self> for Sector {
    #[inline]
    fn bitxor_assign(&mut self, rhs: &Self) {
        self.xor_in_place(rhs);
    }
}
