//! Buffer pages and scatter-gather descriptors handed out by an allocator.
//!
//! The planner asks for a number of data pages plus sg lists per size class; the
//! binder then carves pages into [`Segment`]s with a [`MemoryCursor`] that only
//! moves forward.

mod host;
mod sg;


pub use host::{HostBuffer, HostPlacement, HostScatter};
pub use sg::{BufferRef, Segment, SgList, blocks_to_bytes};

use tracing::debug;

use crate::error::{RaidError, RaidResult};
use crate::layout::sector::{BLOCK_BYTES, Sector};

/// SG_CLASS_LIMITS is the element capacity of each sg list size class.
pub const SG_CLASS_LIMITS: [usize; 5] = [1, 8, 32, 128, 2048];
/// SG_CLASS_COUNT is the number of sg list size classes.
pub const SG_CLASS_COUNT: usize = SG_CLASS_LIMITS.len();
/// DEFAULT_PAGE_BLOCKS is the default data page size in blocks.
pub const DEFAULT_PAGE_BLOCKS: u64 = 64;

/// `sg_count_index` returns the smallest size class holding `count` elements.
///
/// # Errors
/// Returns `InsufficientResources` when `count` exceeds the largest class.
pub fn sg_count_index(count: usize) -> RaidResult<usize> {
    SG_CLASS_LIMITS
        .iter()
        .position(|&limit| count <= limit)
        .ok_or_else(|| {
            RaidError::exhausted(format!(
                "{count} sg elements exceed the largest list ({})",
                SG_CLASS_LIMITS[SG_CLASS_COUNT - 1]
            ))
        })
}

/// MemoryRequest is what the planner asks the allocator for.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemoryRequest {
    pub page_blocks: u64,
    pub pages: usize,
    /// Number of sg lists wanted in each size class.
    pub sg_lists: [usize; SG_CLASS_COUNT],
}

/// MemoryInfo is an allocation: zeroed data pages plus sg list credits.
#[derive(Debug)]
pub struct MemoryInfo {
    page_blocks: u64,
    pages: Vec<Box<[u8]>>,
    sg_lists: [usize; SG_CLASS_COUNT],
    sg_granted: [usize; SG_CLASS_COUNT],
}

impl MemoryInfo {
    /// `new` backs a request with freshly zeroed pages.
    ///
    /// # Errors
    /// Returns `InsufficientResources` when a page does not fit in memory arithmetic.
    pub fn new(request: &MemoryRequest) -> RaidResult<Self> {
        let page_bytes = usize::try_from(request.page_blocks)
            .ok()
            .and_then(|b| b.checked_mul(BLOCK_BYTES))
            .filter(|&b| b > 0)
            .ok_or_else(|| {
                RaidError::exhausted(format!("page of {} blocks", request.page_blocks))
            })?;
        let pages = (0..request.pages)
            .map(|_| vec![0u8; page_bytes].into_boxed_slice())
            .collect();
        Ok(Self {
            page_blocks: request.page_blocks,
            pages,
            sg_lists: request.sg_lists,
            sg_granted: request.sg_lists,
        })
    }

    #[must_use]
    pub const fn page_blocks(&self) -> u64 {
        self.page_blocks
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub const fn sg_lists_left(&self) -> [usize; SG_CLASS_COUNT] {
        self.sg_lists
    }

    /// `take_sg_list` hands out one list of the given class.
    ///
    /// # Errors
    /// Returns `Validation` when the allocation holds no list of that class.
    pub fn take_sg_list(&mut self, class: usize) -> RaidResult<SgList> {
        let left = self
            .sg_lists
            .get_mut(class)
            .ok_or_else(|| RaidError::validation(format!("sg class {class} does not exist")))?;
        if *left == 0 {
            return Err(RaidError::validation(format!(
                "no sg list of class {class} left in allocation"
            )));
        }
        *left -= 1;
        Ok(SgList::with_limit(SG_CLASS_LIMITS[class]))
    }
}

/// BufferAllocator provides memory for one degraded read at a time.
pub trait BufferAllocator {
    /// allocate satisfies `request` in full or fails.
    ///
    /// # Errors
    /// Returns `InsufficientResources` when the request cannot be met.
    fn allocate(&mut self, request: &MemoryRequest) -> RaidResult<MemoryInfo>;

    /// release returns an allocation to the allocator.
    fn release(&mut self, memory: MemoryInfo);
}

/// PagePool is a bounded allocator counting pages and sg lists in use.
#[derive(Clone, Debug)]
pub struct PagePool {
    page_blocks: u64,
    max_pages: usize,
    pages_in_use: usize,
    sg_limits: [usize; SG_CLASS_COUNT],
    sg_in_use: [usize; SG_CLASS_COUNT],
}

impl PagePool {
    #[must_use]
    pub const fn new(page_blocks: u64, max_pages: usize) -> Self {
        Self {
            page_blocks,
            max_pages,
            pages_in_use: 0,
            sg_limits: [usize::MAX; SG_CLASS_COUNT],
            sg_in_use: [0; SG_CLASS_COUNT],
        }
    }

    /// `with_sg_limits` caps the number of sg lists per class.
    #[must_use]
    pub const fn with_sg_limits(mut self, limits: [usize; SG_CLASS_COUNT]) -> Self {
        self.sg_limits = limits;
        self
    }

    #[must_use]
    pub const fn page_blocks(&self) -> u64 {
        self.page_blocks
    }

    #[must_use]
    pub const fn pages_in_use(&self) -> usize {
        self.pages_in_use
    }
}

impl BufferAllocator for PagePool {
    fn allocate(&mut self, request: &MemoryRequest) -> RaidResult<MemoryInfo> {
        if request.page_blocks != self.page_blocks {
            return Err(RaidError::invalid(format!(
                "request page size {} differs from pool page size {}",
                request.page_blocks, self.page_blocks
            )));
        }
        if self.pages_in_use + request.pages > self.max_pages {
            return Err(RaidError::exhausted(format!(
                "{} pages requested, {} of {} in use",
                request.pages, self.pages_in_use, self.max_pages
            )));
        }
        for class in 0..SG_CLASS_COUNT {
            let wanted = self.sg_in_use[class].saturating_add(request.sg_lists[class]);
            if wanted > self.sg_limits[class] {
                return Err(RaidError::exhausted(format!(
                    "{} sg lists of class {class} requested, limit {}",
                    request.sg_lists[class], self.sg_limits[class]
                )));
            }
        }

        let memory = MemoryInfo::new(request)?;
        self.pages_in_use += request.pages;
        for class in 0..SG_CLASS_COUNT {
            self.sg_in_use[class] += request.sg_lists[class];
        }
        debug!(pages = request.pages, in_use = self.pages_in_use, "pool allocate");
        Ok(memory)
    }

    fn release(&mut self, memory: MemoryInfo) {
        self.pages_in_use = self.pages_in_use.saturating_sub(memory.pages.len());
        for class in 0..SG_CLASS_COUNT {
            self.sg_in_use[class] = self.sg_in_use[class].saturating_sub(memory.sg_granted[class]);
        }
        debug!(in_use = self.pages_in_use, "pool release");
    }
}

/// MemoryCursor walks the pages of an allocation front to back.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemoryCursor {
    page: usize,
    block: u64,
    consumed: u64,
}

impl MemoryCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            page: 0,
            block: 0,
            consumed: 0,
        }
    }

    /// `consumed` is the number of blocks handed out so far.
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// `take` carves `blocks` blocks into page-bounded segments.
    ///
    /// # Errors
    /// Returns `Validation` when the allocation runs out of pages.
    pub fn take(&mut self, memory: &MemoryInfo, blocks: u64) -> RaidResult<Vec<Segment>> {
        let page_blocks = memory.page_blocks();
        let mut segments = Vec::new();
        let mut remaining = blocks;
        while remaining > 0 {
            if self.block == page_blocks {
                self.page += 1;
                self.block = 0;
            }
            if self.page >= memory.page_count() {
                return Err(RaidError::validation(format!(
                    "allocation exhausted after {} blocks, {remaining} more wanted",
                    self.consumed
                )));
            }
            let take = (page_blocks - self.block).min(remaining);
            let offset = usize::try_from(self.block)
                .ok()
                .and_then(|b| b.checked_mul(BLOCK_BYTES))
                .ok_or_else(|| RaidError::validation("page offset overflows"))?;
            segments.push(Segment {
                buffer: BufferRef::Page(self.page),
                offset,
                blocks: take,
            });
            self.block += take;
            self.consumed += take;
            remaining -= take;
        }
        Ok(segments)
    }
}

/// BufferSet gives block access to the pages of an allocation and the host buffer.
pub struct BufferSet<'a> {
    memory: &'a mut MemoryInfo,
    host: &'a mut [u8],
}

impl<'a> BufferSet<'a> {
    pub fn new(memory: &'a mut MemoryInfo, host: &'a mut [u8]) -> Self {
        Self { memory, host }
    }

    fn buffer_mut(&mut self, buffer: BufferRef) -> RaidResult<&mut [u8]> {
        match buffer {
            BufferRef::Host => Ok(&mut *self.host),
            BufferRef::Page(i) => self
                .memory
                .pages
                .get_mut(i)
                .map(|p| &mut p[..])
                .ok_or_else(|| RaidError::validation(format!("page {i} not in allocation"))),
        }
    }

    fn buffer(&self, buffer: BufferRef) -> RaidResult<&[u8]> {
        match buffer {
            BufferRef::Host => Ok(&*self.host),
            BufferRef::Page(i) => self
                .memory
                .pages
                .get(i)
                .map(|p| &p[..])
                .ok_or_else(|| RaidError::validation(format!("page {i} not in allocation"))),
        }
    }

    /// `segment_mut` borrows the bytes behind a segment.
    ///
    /// # Errors
    /// Returns `Validation` when the segment points outside its buffer.
    pub fn segment_mut(&mut self, seg: &Segment) -> RaidResult<&mut [u8]> {
        let len = seg.byte_len()?;
        let buf = self.buffer_mut(seg.buffer)?;
        let end = seg.offset + len;
        buf.get_mut(seg.offset..end)
            .ok_or_else(|| RaidError::validation(format!("segment {seg:?} outside its buffer")))
    }

    /// `read_block` copies block `block` of `chain` into a sector.
    ///
    /// # Errors
    /// Returns `Validation` when the chain is shorter than `block`.
    pub fn read_block(&self, chain: &SgList, block: u64) -> RaidResult<Sector> {
        let (buffer, offset) = chain
            .locate(block)
            .ok_or_else(|| RaidError::validation(format!("block {block} beyond chain")))?;
        let bytes = self.buffer(buffer)?;
        bytes
            .get(offset..offset + BLOCK_BYTES)
            .and_then(Sector::from_bytes)
            .ok_or_else(|| RaidError::validation(format!("block {block} outside its buffer")))
    }

    /// `write_block` stores a sector as block `block` of `chain`.
    ///
    /// # Errors
    /// Returns `Validation` when the chain is shorter than `block`.
    pub fn write_block(&mut self, chain: &SgList, block: u64, sector: &Sector) -> RaidResult<()> {
        let (buffer, offset) = chain
            .locate(block)
            .ok_or_else(|| RaidError::validation(format!("block {block} beyond chain")))?;
        let bytes = self.buffer_mut(buffer)?;
        let dst = bytes
            .get_mut(offset..offset + BLOCK_BYTES)
            .ok_or_else(|| RaidError::validation(format!("block {block} outside its buffer")))?;
        dst.copy_from_slice(sector.as_bytes());
        Ok(())
    }
}
