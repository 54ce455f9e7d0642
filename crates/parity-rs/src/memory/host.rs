//! The caller's host buffer and how it is scattered across data positions.

use crate::error::{RaidError, RaidResult};
use crate::layout::sector::BLOCK_BYTES;
use crate::memory::sg::{BufferRef, Segment};

/// HostPlacement describes where a host transfer lands in its stripe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostPlacement {
    /// First host block (array relative).
    pub lba: u64,
    pub blocks: u64,
    /// Data position holding the first host block.
    pub start_pos: usize,
    pub blocks_per_element: u64,
    pub data_disks: usize,
}

impl HostPlacement {
    /// `chunks` yields `(data_position, blocks)` for each element-sized run of the transfer.
    pub fn chunks(&self) -> impl Iterator<Item = (usize, u64)> + use<> {
        let element = self.blocks_per_element.max(1);
        let data_disks = self.data_disks.max(1);
        let mut remaining = self.blocks;
        let mut first = (element - self.lba % element).min(remaining);
        let mut pos = self.start_pos;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let take = if first > 0 { first } else { element.min(remaining) };
            first = 0;
            let item = (pos, take);
            pos = (pos + 1) % data_disks;
            remaining -= take;
            Some(item)
        })
    }
}

/// HostScatter spreads host data over the per-position read chains.
pub trait HostScatter {
    /// count_sgs adds the sg elements each data position needs for host data.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when the descriptor cannot cover the placement.
    fn count_sgs(&self, placement: &HostPlacement, counts: &mut [usize]) -> RaidResult<()>;

    /// scatter emits the host segments for every data position in transfer order.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when the descriptor cannot cover the placement, or
    /// whatever `sink` returns.
    fn scatter(
        &self,
        placement: &HostPlacement,
        sink: &mut dyn FnMut(usize, Segment) -> RaidResult<()>,
    ) -> RaidResult<()>;
}

/// HostBuffer is a cache descriptor: one byte buffer cut into block-sized elements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostBuffer {
    data: Vec<u8>,
    elements: Vec<u64>,
    offset: u64,
}

impl HostBuffer {
    /// `new` builds a descriptor with a single element of `blocks` blocks.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `blocks` does not fit in memory.
    pub fn new(blocks: u64) -> RaidResult<Self> {
        match blocks {
            0 => Self::with_elements(&[]),
            n => Self::with_elements(&[n]),
        }
    }

    /// `with_elements` builds a descriptor whose elements hold the given block counts.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for empty elements.
    pub fn with_elements(element_blocks: &[u64]) -> RaidResult<Self> {
        if element_blocks.iter().any(|&b| b == 0) {
            return Err(RaidError::invalid("host descriptor has an empty element"));
        }
        let total: u64 = element_blocks.iter().sum();
        let len = usize::try_from(total)
            .ok()
            .and_then(|t| t.checked_mul(BLOCK_BYTES))
            .ok_or_else(|| RaidError::invalid("host descriptor too large"))?;
        Ok(Self {
            data: vec![0u8; len],
            elements: element_blocks.to_vec(),
            offset: 0,
        })
    }

    /// `with_offset` starts the transfer `blocks` blocks into the descriptor.
    #[must_use]
    pub const fn with_offset(mut self, blocks: u64) -> Self {
        self.offset = blocks;
        self
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.elements.iter().sum()
    }

    #[must_use]
    pub fn elements(&self) -> &[u64] {
        &self.elements
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// `transfer_bytes` returns the bytes covered by a transfer of `blocks` blocks.
    #[must_use]
    pub fn transfer_bytes(&self, blocks: u64) -> Option<&[u8]> {
        let start = usize::try_from(self.offset).ok()?.checked_mul(BLOCK_BYTES)?;
        let len = usize::try_from(blocks).ok()?.checked_mul(BLOCK_BYTES)?;
        self.data.get(start..start.checked_add(len)?)
    }

    fn walk(
        &self,
        placement: &HostPlacement,
        mut f: impl FnMut(usize, usize, u64) -> RaidResult<()>,
    ) -> RaidResult<()> {
        let end = self.offset.checked_add(placement.blocks);
        if end.is_none_or(|e| e > self.blocks()) {
            return Err(RaidError::invalid(format!(
                "host descriptor of {} blocks cannot hold {} blocks at offset {}",
                self.blocks(),
                placement.blocks,
                self.offset
            )));
        }

        let mut idx = 0;
        let mut base = 0u64;
        while idx < self.elements.len() && base + self.elements[idx] <= self.offset {
            base += self.elements[idx];
            idx += 1;
        }

        let mut cursor = self.offset;
        for (pos, chunk) in placement.chunks() {
            let mut remaining = chunk;
            while remaining > 0 {
                let Some(&len) = self.elements.get(idx) else {
                    return Err(RaidError::invalid("host descriptor exhausted mid transfer"));
                };
                let take = (base + len - cursor).min(remaining);
                let byte_offset = usize::try_from(cursor)
                    .ok()
                    .and_then(|c| c.checked_mul(BLOCK_BYTES))
                    .ok_or_else(|| RaidError::invalid("host offset overflows"))?;
                f(pos, byte_offset, take)?;
                cursor += take;
                remaining -= take;
                if cursor == base + len {
                    base += len;
                    idx += 1;
                }
            }
        }
        Ok(())
    }
}

impl HostScatter for HostBuffer {
    fn count_sgs(&self, placement: &HostPlacement, counts: &mut [usize]) -> RaidResult<()> {
        self.walk(placement, |pos, _, _| {
            let slot = counts
                .get_mut(pos)
                .ok_or_else(|| RaidError::invalid(format!("data position {pos} out of range")))?;
            *slot += 1;
            Ok(())
        })
    }

    fn scatter(
        &self,
        placement: &HostPlacement,
        sink: &mut dyn FnMut(usize, Segment) -> RaidResult<()>,
    ) -> RaidResult<()> {
        self.walk(placement, |pos, offset, blocks| {
            sink(
                pos,
                Segment {
                    buffer: BufferRef::Host,
                    offset,
                    blocks,
                },
            )
        })
    }
}
