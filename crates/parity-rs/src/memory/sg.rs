//! Scatter-gather segments and fixed-capacity lists.

use crate::error::{RaidError, RaidResult};
use crate::layout::sector::BLOCK_BYTES;

/// BufferRef names the allocation a segment points into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BufferRef {
    /// A data page of the bound [`super::MemoryInfo`].
    Page(usize),
    /// The caller's host buffer.
    Host,
}

/// Segment is a run of whole blocks inside one buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Segment {
    pub buffer: BufferRef,
    /// Byte offset of the first block inside the buffer.
    pub offset: usize,
    pub blocks: u64,
}

impl Segment {
    /// `byte_len` is the segment length in bytes.
    ///
    /// # Errors
    /// Returns `InsufficientResources` when the length does not fit 32-bit byte counts.
    pub fn byte_len(&self) -> RaidResult<usize> {
        let bytes = blocks_to_bytes(self.blocks)?;
        Ok(bytes as usize)
    }
}

/// `blocks_to_bytes` translates a block count into a 32-bit byte count.
///
/// # Errors
/// Returns `InsufficientResources` if the byte count overflows `u32`.
pub fn blocks_to_bytes(blocks: u64) -> RaidResult<u32> {
    blocks
        .checked_mul(BLOCK_BYTES as u64)
        .and_then(|b| u32::try_from(b).ok())
        .ok_or_else(|| RaidError::exhausted(format!("{blocks} blocks exceed 32-bit byte count")))
}

/// SgList is a scatter-gather list with a fixed element limit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SgList {
    limit: usize,
    segments: Vec<Segment>,
}

impl SgList {
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            segments: Vec::with_capacity(limit.min(64)),
        }
    }

    /// `push` appends a segment; empty segments are ignored.
    ///
    /// # Errors
    /// Returns `Validation` when the list is full.
    pub fn push(&mut self, seg: Segment) -> RaidResult<()> {
        if seg.blocks == 0 {
            return Ok(());
        }
        if self.segments.len() >= self.limit {
            return Err(RaidError::validation(format!(
                "sg list overflow: limit {} reached",
                self.limit
            )));
        }
        self.segments.push(seg);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.segments.iter().map(|s| s.blocks).sum()
    }

    /// `locate` finds the buffer and byte offset of block `block` of the chain.
    #[must_use]
    pub fn locate(&self, block: u64) -> Option<(BufferRef, usize)> {
        let mut skipped = 0u64;
        for seg in &self.segments {
            if block < skipped + seg.blocks {
                let within = usize::try_from(block - skipped).ok()?;
                return Some((seg.buffer, seg.offset + within * BLOCK_BYTES));
            }
            skipped += seg.blocks;
        }
        None
    }
}
