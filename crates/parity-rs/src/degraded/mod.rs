//! Degraded reads: plan, bind, read and rebuild one parity stripe at a time.
//!
//! [`DegradedRead::run`] strings the stages together for a request confined to one
//! parity stripe:
//!
//! 1. [`request::StripeRequest::new`] maps the host range and builds member accesses.
//! 2. [`sizing::plan_sizes`] sizes sg lists and pages.
//! 3. The [`BufferAllocator`] hands out memory.
//! 4. [`binder::bind`] wires pages and the host buffer into member chains.
//! 5. Surviving members are read through [`BlockDevice`].
//! 6. [`reconstruct::reconstruct`] validates every row and rebuilds the dead members.

pub mod binder;
pub mod preread;
pub mod reconstruct;
pub mod report;
pub mod request;
pub mod sizing;

#[cfg(test)]
pub(crate) mod test_support;

pub use binder::{BoundStripe, MemberBuffers, ResultView, bind};
pub use preread::{DegradedRange, PrereadBlocks, calc_degraded_range, calc_preread_blocks};
pub use reconstruct::{ReconstructOptions, ReconstructSpec, reconstruct};
pub use report::{ErrorBoard, ErrorKind, ErrorRegion, ErrorRegions, Outcome, ReconstructReport};
pub use request::{AccessOp, AccessTable, MemberAccessInfo, StripeRequest};
pub use sizing::{PlannerConfig, SgSizingPlan, count_uniform_blocks, plan_sizes};

use tracing::{debug, info, warn};

use crate::error::{RaidError, RaidResult};
use crate::layout::geometry::Geometry;
use crate::memory::{BufferAllocator, BufferSet, HostBuffer, MemoryInfo};
use crate::retention::BlockDevice;

/// DegradedReadOptions are per-call switches of a degraded read.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DegradedReadOptions {
    /// Invalidate unrecoverable blocks instead of asking for a retry.
    pub final_recovery_attempt: bool,
}

/// DegradedRead runs degraded reads against one array geometry.
#[derive(Clone, Copy, Debug)]
pub struct DegradedRead<'g> {
    geometry: &'g Geometry,
    config: PlannerConfig,
}

impl<'g> DegradedRead<'g> {
    #[must_use]
    pub const fn new(geometry: &'g Geometry, config: PlannerConfig) -> Self {
        Self { geometry, config }
    }

    /// `run` reads `count` host blocks at `lba` into `host`, rebuilding dead members.
    ///
    /// Memory is returned to `allocator` whether or not the read succeeds.
    ///
    /// # Arguments
    /// * `lba` - First host block; the range may not cross a parity stripe.
    /// * `count` - Host blocks.
    /// * `dead` - Up to two dead physical members.
    /// * `members` - One device per physical position; dead ones are never read.
    /// * `host` - Destination descriptor.
    /// * `allocator` - Source of pages and sg lists.
    /// * `options` - Per-call switches.
    ///
    /// # Errors
    /// Returns `InvalidParameter` or `Validation` for defects, `InsufficientResources`
    /// when memory cannot be had, and non-media device failures unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        lba: u64,
        count: u64,
        dead: [Option<usize>; 2],
        members: &[&dyn BlockDevice],
        host: &mut HostBuffer,
        allocator: &mut dyn BufferAllocator,
        options: DegradedReadOptions,
    ) -> RaidResult<ReconstructReport> {
        if members.len() != self.geometry.width() {
            return Err(RaidError::invalid(format!(
                "{} member devices for width {}",
                members.len(),
                self.geometry.width()
            )));
        }
        let mut request = StripeRequest::new(self.geometry, lba, count, dead)?;
        let plan = plan_sizes(&mut request, &*host, &self.config)?;
        let mut memory = allocator.allocate(&plan.memory_request()?)?;
        let result = self.execute(&request, &plan, &mut memory, members, host, options);
        allocator.release(memory);

        if let Ok(report) = &result {
            info!(
                lba,
                count,
                outcome = %report.outcome,
                rebuilt = report.rebuilt_blocks,
                "degraded read"
            );
        }
        result
    }

    fn execute(
        &self,
        request: &StripeRequest,
        plan: &SgSizingPlan,
        memory: &mut MemoryInfo,
        members: &[&dyn BlockDevice],
        host: &mut HostBuffer,
        options: DegradedReadOptions,
    ) -> RaidResult<ReconstructReport> {
        let bound = bind(request, plan, memory, &*host)?;
        let mut buffers = BufferSet::new(memory, host.as_bytes_mut());
        let media_error_bitmap = read_members(request, &bound, members, &mut buffers)?;
        let spec = ReconstructSpec::new(
            self.geometry,
            request,
            &bound,
            &ReconstructOptions {
                final_recovery_attempt: options.final_recovery_attempt,
                media_error_bitmap,
            },
        )?;
        reconstruct(&spec, &mut buffers)
    }
}

/// `read_members` fills every live chain from its device.
///
/// # Returns
/// Bitmap of positions whose read failed with a media error.
fn read_members(
    request: &StripeRequest,
    bound: &BoundStripe,
    members: &[&dyn BlockDevice],
    buffers: &mut BufferSet<'_>,
) -> RaidResult<u16> {
    let mut media = 0u16;
    for member in &bound.members {
        if member.op == AccessOp::Nop {
            continue;
        }
        let device = members[member.position];
        let mut lba = request.address_offset() + member.lba;
        for seg in member.chain.segments() {
            let buf = buffers.segment_mut(seg)?;
            match device.read_blocks(lba, buf) {
                Ok(()) => {}
                Err(RaidError::Media { reason, .. }) => {
                    warn!(position = member.position, lba, %reason, "member read failed");
                    media |= 1 << member.position;
                    break;
                }
                Err(err) => return Err(err),
            }
            lba += seg.blocks;
        }
    }
    debug!(media_error_bitmap = media, "member reads done");
    Ok(media)
}
