//! Sg element and buffer page sizing, done before any memory is reserved.

#[cfg(test)]
mod sizing_tests;

use tracing::debug;

use crate::error::{RaidError, RaidResult};
use crate::memory::{DEFAULT_PAGE_BLOCKS, HostScatter, MemoryRequest, SG_CLASS_COUNT, sg_count_index};

use super::request::{MemberAccessInfo, StripeRequest};

/// PlannerConfig holds the tunables of the sizing planner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlannerConfig {
    /// Blocks per data page handed out by the allocator.
    pub page_blocks: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            page_blocks: DEFAULT_PAGE_BLOCKS,
        }
    }
}

/// SgSizingPlan is the output of [`plan_sizes`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SgSizingPlan {
    /// Sg elements per read entry, in read table order.
    pub read_sgs: Vec<usize>,
    /// Sg elements of the post-host gap per write entry, in write table order.
    pub write_sgs: Vec<usize>,
    /// Sg class per read entry.
    pub read_classes: Vec<usize>,
    /// Sg class per write entry.
    pub write_classes: Vec<usize>,
    /// Blocks taken from data pages (everything that is not host data).
    pub pool_blocks: u64,
    /// Sum of every read entry's block count.
    pub total_blocks_to_read: u64,
    pub page_blocks: u64,
}

impl SgSizingPlan {
    /// `pages` is the data page count needed for the pool blocks.
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pool_blocks.div_ceil(self.page_blocks)
    }

    /// `memory_request` is the allocation request matching the plan.
    ///
    /// # Errors
    /// Returns `InsufficientResources` when the page count does not fit in memory.
    pub fn memory_request(&self) -> RaidResult<MemoryRequest> {
        let pages = usize::try_from(self.pages())
            .map_err(|_| RaidError::exhausted(format!("{} pages", self.pages())))?;
        let mut sg_lists = [0usize; SG_CLASS_COUNT];
        for &class in self.read_classes.iter().chain(&self.write_classes) {
            sg_lists[class] += 1;
        }
        Ok(MemoryRequest {
            page_blocks: self.page_blocks,
            pages,
            sg_lists,
        })
    }
}

/// `count_uniform_blocks` counts the sg elements for `blocks` blocks of page memory.
///
/// `mem_left` carries the room left in the current page from one call to the next,
/// so consecutive calls describe one forward walk through the pages.
#[must_use]
pub fn count_uniform_blocks(blocks: u64, page_blocks: u64, mem_left: &mut u64) -> usize {
    let mut remaining = blocks;
    let mut count = 0;
    while remaining > 0 {
        if *mem_left == 0 {
            *mem_left = page_blocks;
        }
        let take = remaining.min(*mem_left);
        *mem_left -= take;
        remaining -= take;
        count += 1;
    }
    count
}

fn gaps(read: &MemberAccessInfo, write: &MemberAccessInfo) -> RaidResult<(u64, u64)> {
    if write.lba < read.lba || write.end() > read.end() {
        return Err(RaidError::invalid(format!(
            "position {}: host range {}+{} outside read range {}+{}",
            read.position, write.lba, write.block_count, read.lba, read.block_count
        )));
    }
    Ok((write.lba - read.lba, read.end() - write.end()))
}

/// `plan_sizes` counts sg elements per member and sizes the page allocation.
///
/// Members are walked in read table order. A member without host data takes its
/// whole read range from pages. A member with host data takes the gap before and
/// the gap after the host range from pages; the gap after is counted again against
/// the member's result list. Host elements come from `host`. The chosen sg classes
/// are stored back into the request's access tables.
///
/// # Errors
/// Returns `InvalidParameter` when a member ends up with no sg element or the tables
/// disagree, and `InsufficientResources` when a member needs more elements than
/// the largest sg class.
pub fn plan_sizes(
    request: &mut StripeRequest,
    host: &dyn HostScatter,
    config: &PlannerConfig,
) -> RaidResult<SgSizingPlan> {
    if config.page_blocks == 0 {
        return Err(RaidError::invalid("zero page size"));
    }
    let page_blocks = config.page_blocks;
    let reads = request.read_info.len();
    let writes: Vec<MemberAccessInfo> = request.write_info.entries().to_vec();

    let mut read_sgs = vec![0usize; reads];
    let mut write_sgs = vec![0usize; writes.len()];
    let mut mem_left = 0u64;
    let mut pool_blocks = 0u64;
    let mut next_write = 0;

    for (idx, read) in request.read_info.iter().enumerate() {
        match writes.get(next_write).filter(|w| w.position == read.position) {
            None => {
                read_sgs[idx] += count_uniform_blocks(read.block_count, page_blocks, &mut mem_left);
                pool_blocks += read.block_count;
            }
            Some(write) => {
                let (before, after) = gaps(read, write)?;
                if before > 0 {
                    read_sgs[idx] += count_uniform_blocks(before, page_blocks, &mut mem_left);
                }
                if after > 0 {
                    let n = count_uniform_blocks(after, page_blocks, &mut mem_left);
                    read_sgs[idx] += n;
                    write_sgs[next_write] += n;
                }
                pool_blocks += before + after;
                next_write += 1;
            }
        }
    }
    if next_write != writes.len() {
        return Err(RaidError::invalid(format!(
            "{} host ranges matched only {next_write} members",
            writes.len()
        )));
    }

    // Data positions come first in the read table, so host counts land on them.
    let placement = request.host_placement();
    host.count_sgs(&placement, &mut read_sgs[..placement.data_disks.min(reads)])?;

    let mut read_classes = Vec::with_capacity(reads);
    for (idx, &count) in read_sgs.iter().enumerate() {
        if count == 0 {
            return Err(RaidError::invalid(format!(
                "read entry {idx} (position {}) needs no sg elements",
                request.read_info.entries()[idx].position
            )));
        }
        read_classes.push(sg_count_index(count)?);
    }
    let write_classes = write_sgs
        .iter()
        .map(|&count| sg_count_index(count))
        .collect::<RaidResult<Vec<_>>>()?;

    for (entry, &class) in request.read_info.iter_mut().zip(&read_classes) {
        entry.sg_index = class;
    }
    for (entry, &class) in request.write_info.iter_mut().zip(&write_classes) {
        entry.sg_index = class;
    }

    let total_blocks_to_read = request.total_blocks_to_read();
    debug!(
        ?read_sgs,
        ?write_sgs,
        pool_blocks,
        total_blocks_to_read,
        "sizing plan"
    );
    Ok(SgSizingPlan {
        read_sgs,
        write_sgs,
        read_classes,
        write_classes,
        pool_blocks,
        total_blocks_to_read,
        page_blocks,
    })
}
