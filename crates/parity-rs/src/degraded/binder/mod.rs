//! Binds allocated pages and host memory to the per-member read chains.
//!
//! Every member owns one chain of segments. For a member carrying host data the
//! chain is cut into three index ranges: `pre` (pages, before the host data),
//! `host` (the caller's buffer) and `post` (pages, after the host data). The result
//! view of the member is `post`; nothing is aliased or owned twice.


use std::ops::Range;

use tracing::{debug, trace};

use crate::error::{RaidError, RaidResult};
use crate::memory::{HostScatter, MemoryCursor, MemoryInfo, Segment, SgList};

use super::request::{AccessOp, StripeRequest};
use super::sizing::SgSizingPlan;

/// ResultView is the host-facing part of a member with host data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResultView {
    /// First host-visible member block, array relative.
    pub lba: u64,
    pub block_count: u64,
    /// Element limit of the sg class reserved for the result list.
    pub sg_limit: usize,
}

/// MemberBuffers is the bound chain of one member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemberBuffers {
    pub position: usize,
    pub op: AccessOp,
    /// First member block of the chain, array relative.
    pub lba: u64,
    pub block_count: u64,
    pub chain: SgList,
    pub pre: Range<usize>,
    pub host: Range<usize>,
    pub post: Range<usize>,
    pub result: Option<ResultView>,
}

impl MemberBuffers {
    /// `result_segments` is the post-host-data view of the chain.
    #[must_use]
    pub fn result_segments(&self) -> &[Segment] {
        &self.chain.segments()[self.post.clone()]
    }

    fn range_blocks(&self, range: &Range<usize>) -> u64 {
        self.chain.segments()[range.clone()]
            .iter()
            .map(|s| s.blocks)
            .sum()
    }
}

/// BoundStripe holds the chains of every member in read table order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundStripe {
    pub members: Vec<MemberBuffers>,
    /// Blocks taken from pages.
    pub pool_blocks: u64,
}

impl BoundStripe {
    #[must_use]
    pub fn member(&self, position: usize) -> Option<&MemberBuffers> {
        self.members.iter().find(|m| m.position == position)
    }

    /// `consumed_blocks` totals every chain.
    #[must_use]
    pub fn consumed_blocks(&self) -> u64 {
        self.members.iter().map(|m| m.chain.blocks()).sum()
    }
}

/// `bind` wires pages and host memory into every member's chain.
///
/// Members are walked in the order [`super::sizing::plan_sizes`] counted them, taking
/// pages front to back. Host segments are then scattered in between the gaps.
///
/// # Errors
/// Returns `Validation` when the finished chains disagree with `plan`, and passes on
/// failures from the allocation or the host descriptor.
pub fn bind(
    request: &StripeRequest,
    plan: &SgSizingPlan,
    memory: &mut MemoryInfo,
    host: &dyn HostScatter,
) -> RaidResult<BoundStripe> {
    let mut cursor = MemoryCursor::new();
    let mut members = Vec::with_capacity(request.read_info.len());
    let mut post_segments: Vec<Vec<Segment>> = Vec::with_capacity(request.read_info.len());
    let writes = request.write_info.entries();
    let mut next_write = 0;

    for read in &request.read_info {
        let mut chain = memory.take_sg_list(read.sg_index)?;
        let write = writes.get(next_write).filter(|w| w.position == read.position);
        let (result, post) = match write {
            None => {
                for seg in cursor.take(memory, read.block_count)? {
                    chain.push(seg)?;
                }
                (None, Vec::new())
            }
            Some(write) => {
                next_write += 1;
                let before = write.lba.checked_sub(read.lba);
                let after = read.end().checked_sub(write.end());
                let (Some(before), Some(after)) = (before, after) else {
                    return Err(RaidError::validation(format!(
                        "position {}: host range outside read range",
                        read.position
                    )));
                };
                for seg in cursor.take(memory, before)? {
                    chain.push(seg)?;
                }
                let post = cursor.take(memory, after)?;
                let result_list = memory.take_sg_list(write.sg_index)?;
                let view = ResultView {
                    lba: write.lba,
                    block_count: write.block_count,
                    sg_limit: result_list.limit(),
                };
                (Some(view), post)
            }
        };
        let pre_end = chain.len();
        trace!(position = read.position, pre = pre_end, "bound pre-host segments");
        members.push(MemberBuffers {
            position: read.position,
            op: read.op,
            lba: read.lba,
            block_count: read.block_count,
            chain,
            pre: 0..pre_end,
            host: pre_end..pre_end,
            post: pre_end..pre_end,
            result,
        });
        post_segments.push(post);
    }

    let placement = request.host_placement();
    host.scatter(&placement, &mut |data_pos, seg| {
        let member = members.get_mut(data_pos).ok_or_else(|| {
            RaidError::validation(format!("host data for unknown data position {data_pos}"))
        })?;
        if member.result.is_none() {
            return Err(RaidError::validation(format!(
                "host data for position {} which has no host range",
                member.position
            )));
        }
        member.chain.push(seg)?;
        member.host.end = member.chain.len();
        Ok(())
    })?;

    for (member, post) in members.iter_mut().zip(post_segments) {
        member.post = member.host.end..member.host.end;
        for seg in post {
            member.chain.push(seg)?;
        }
        member.post.end = member.chain.len();
    }

    let bound = BoundStripe {
        members,
        pool_blocks: cursor.consumed(),
    };
    validate(request, plan, &bound)?;
    debug!(
        members = bound.members.len(),
        pool_blocks = bound.pool_blocks,
        "stripe bound"
    );
    Ok(bound)
}

/// `validate` re-walks finished chains against the request and the sizing plan.
///
/// # Errors
/// Returns `Validation` on any mismatch.
pub fn validate(request: &StripeRequest, plan: &SgSizingPlan, bound: &BoundStripe) -> RaidResult<()> {
    if bound.members.len() != plan.read_sgs.len() {
        return Err(RaidError::validation(format!(
            "{} bound members, plan has {}",
            bound.members.len(),
            plan.read_sgs.len()
        )));
    }
    let mut writes = plan.write_sgs.iter();
    for (idx, member) in bound.members.iter().enumerate() {
        if member.chain.blocks() != member.block_count {
            return Err(RaidError::validation(format!(
                "position {}: chain holds {} blocks, read is {}",
                member.position,
                member.chain.blocks(),
                member.block_count
            )));
        }
        if member.chain.len() != plan.read_sgs[idx] {
            return Err(RaidError::validation(format!(
                "position {}: {} segments bound, {} planned",
                member.position,
                member.chain.len(),
                plan.read_sgs[idx]
            )));
        }
        if let Some(result) = &member.result {
            let planned_post = writes.next().copied().unwrap_or(usize::MAX);
            let pre = member.range_blocks(&member.pre);
            let host = member.range_blocks(&member.host);
            if member.lba + pre != result.lba || host != result.block_count {
                return Err(RaidError::validation(format!(
                    "position {}: pre {pre} / host {host} blocks disagree with host range {}+{}",
                    member.position, result.lba, result.block_count
                )));
            }
            if member.post.len() != planned_post || member.post.len() > result.sg_limit {
                return Err(RaidError::validation(format!(
                    "position {}: {} result segments, planned {planned_post}, limit {}",
                    member.position,
                    member.post.len(),
                    result.sg_limit
                )));
            }
        } else if !member.host.is_empty() {
            return Err(RaidError::validation(format!(
                "position {} holds host segments without a host range",
                member.position
            )));
        }
    }
    if writes.next().is_some() {
        return Err(RaidError::validation("planned host ranges left unbound"));
    }
    if bound.pool_blocks != plan.pool_blocks {
        return Err(RaidError::validation(format!(
            "{} page blocks consumed, {} planned",
            bound.pool_blocks, plan.pool_blocks
        )));
    }
    let consumed = bound.consumed_blocks();
    if consumed != plan.total_blocks_to_read || consumed != request.total_blocks_to_read() {
        return Err(RaidError::validation(format!(
            "{consumed} blocks bound, {} planned",
            plan.total_blocks_to_read
        )));
    }
    Ok(())
}
