//! Row-by-row reconstruction over bound member chains.
//!
//! Every row of the parity range is validated. Surviving data blocks that fail
//! their checksum or LBA stamp are treated as erasures next to the dead members,
//! and rows inside the degraded range rebuild the dead members into their chains.


use tracing::{debug, warn};

use crate::error::{RaidError, RaidResult};
use crate::layout::geometry::{Geometry, RaidType};
use crate::layout::sector::Sector;
use crate::layout::stripe::{ParityCodec, codec};
use crate::memory::{BufferSet, SgList};

use super::binder::BoundStripe;
use super::report::{ErrorKind, ReconstructReport};
use super::request::StripeRequest;

/// ReconstructOptions carries what the caller knows about the pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReconstructOptions {
    /// On the final attempt unrecoverable blocks are invalidated instead of retried.
    pub final_recovery_attempt: bool,
    /// Physical positions whose reads failed.
    pub media_error_bitmap: u16,
}

/// ReconstructSpec is everything the engine needs, indexed by physical position.
#[derive(Clone, Debug)]
pub struct ReconstructSpec<'a> {
    pub raid_type: RaidType,
    pub chains: Vec<&'a SgList>,
    /// Stripe-relative data position, `None` for parity members.
    pub data_position: Vec<Option<usize>>,
    /// Slot of each member in an encoded row.
    pub extent_position: Vec<usize>,
    pub parity_position: [Option<usize>; 2],
    /// Dead members to rebuild.
    pub rebuild_position: [Option<usize>; 2],
    /// Absolute LBA of block 0 of every chain.
    pub read_seed: u64,
    pub read_count: u64,
    /// Absolute LBA of the first block to rebuild.
    pub seed: u64,
    pub count: u32,
    pub media_error_bitmap: u16,
    pub final_recovery_attempt: bool,
}

impl<'a> ReconstructSpec<'a> {
    /// `new` collects the per-position view of a bound stripe.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when no dead member is a data position, a member
    /// chain is missing, or the degraded range does not fit 32-bit block counts.
    pub fn new(
        geometry: &Geometry,
        request: &StripeRequest,
        bound: &'a BoundStripe,
        options: &ReconstructOptions,
    ) -> RaidResult<Self> {
        if request.dead_data.is_empty() {
            return Err(RaidError::invalid(format!(
                "dead positions {:?} resolve to no data position",
                request.dead_positions
            )));
        }
        let count = u32::try_from(request.degraded.count).map_err(|_| {
            RaidError::invalid(format!(
                "degraded count {} exceeds 32-bit block arithmetic",
                request.degraded.count
            ))
        })?;

        let width = geometry.width();
        let parity_pos = request.stripe.parity_pos;
        let mut chains = Vec::with_capacity(width);
        let mut data_position = Vec::with_capacity(width);
        let mut extent_position = Vec::with_capacity(width);
        for position in 0..width {
            let member = bound.member(position).ok_or_else(|| {
                RaidError::invalid(format!("no chain bound for position {position}"))
            })?;
            chains.push(&member.chain);
            data_position.push(if geometry.is_parity_position(position, parity_pos) {
                None
            } else {
                Some(geometry.stripe_relative(position, parity_pos)?)
            });
            extent_position.push(geometry.extent_position(position, parity_pos));
        }
        let mut parity = geometry.parity_positions(parity_pos);
        let parity_position = [parity.next(), parity.next()];

        let offset = request.address_offset();
        Ok(Self {
            raid_type: geometry.raid_type(),
            chains,
            data_position,
            extent_position,
            parity_position,
            rebuild_position: request.dead_positions,
            read_seed: offset + request.parity_start(),
            read_count: request.parity_count(),
            seed: offset + request.degraded.offset,
            count,
            media_error_bitmap: options.media_error_bitmap,
            final_recovery_attempt: options.final_recovery_attempt,
        })
    }

    fn width(&self) -> usize {
        self.chains.len()
    }

    fn is_rebuild(&self, position: usize) -> bool {
        self.rebuild_position.contains(&Some(position))
    }

    fn is_data(&self, position: usize) -> bool {
        self.data_position[position].is_some()
    }

    fn extents(&self, positions: &[usize]) -> Vec<usize> {
        positions.iter().map(|&p| self.extent_position[p]).collect()
    }

    fn mask(positions: impl IntoIterator<Item = usize>) -> u16 {
        positions.into_iter().fold(0, |m, p| m | (1 << p))
    }

    /// Data members among `erased` whose solved sector fails validation.
    fn failed_rebuilds(&self, solved: &[Sector], erased: &[usize], lba: u64) -> Vec<usize> {
        erased
            .iter()
            .copied()
            .filter(|&p| self.is_data(p))
            .filter(|&p| block_error(&solved[self.extent_position[p]], lba).is_some())
            .collect()
    }
}

/// `block_error` validates a data block read from absolute member address `lba`.
fn block_error(sector: &Sector, lba: u64) -> Option<ErrorKind> {
    if !sector.has_valid_checksum() {
        Some(ErrorKind::Checksum)
    } else if !sector.has_valid_lba_stamp(lba) {
        Some(ErrorKind::LbaStamp)
    } else {
        None
    }
}

/// RowVerdict is how one row of a pass ended.
enum RowVerdict {
    Solved(Vec<Sector>),
    Unsolvable,
}

struct Engine<'s, 'a> {
    spec: &'s ReconstructSpec<'a>,
    codec: &'static dyn ParityCodec,
    report: ReconstructReport,
}

impl Engine<'_, '_> {
    fn solve(&self, row: &[Sector], erased: &[usize]) -> RaidResult<Vec<Sector>> {
        let mut solved = row.to_vec();
        self.codec.restore(&mut solved, &self.spec.extents(erased))?;
        Ok(solved)
    }

    /// Retries the row with one surviving parity member left out.
    fn solve_without_parity(
        &mut self,
        row: &[Sector],
        erased: &[usize],
        lba: u64,
    ) -> RaidResult<Option<Vec<Sector>>> {
        if erased.len() >= self.codec.parity_count() {
            return Ok(None);
        }
        for parity in self.spec.parity_position.iter().flatten().copied() {
            if erased.contains(&parity) {
                continue;
            }
            let mut with_parity = erased.to_vec();
            with_parity.push(parity);
            let solved = self.solve(row, &with_parity)?;
            if self.spec.failed_rebuilds(&solved, erased, lba).is_empty() {
                debug!(lba, parity, "row solved without stale parity");
                self.report
                    .record(lba, ReconstructSpec::mask([parity]), ErrorKind::Coherency, true);
                return Ok(Some(solved));
            }
        }
        Ok(None)
    }

    fn row(
        &mut self,
        row: &[Sector],
        erased: &[usize],
        bad: &[(usize, ErrorKind)],
        lba: u64,
    ) -> RaidResult<RowVerdict> {
        let spec = self.spec;
        if erased.len() > self.codec.parity_count() {
            for &(p, kind) in bad {
                self.report.record(lba, ReconstructSpec::mask([p]), kind, false);
            }
            return Ok(RowVerdict::Unsolvable);
        }

        let solved = self.solve(row, erased)?;
        let failed = spec.failed_rebuilds(&solved, erased, lba);
        let solved = if failed.is_empty() {
            if erased.len() < self.codec.parity_count() {
                let stale = self.codec.inconsistent_parity(&solved);
                for extent in stale {
                    if let Some(p) = spec.extent_position.iter().position(|&e| e == extent) {
                        self.report
                            .record(lba, ReconstructSpec::mask([p]), ErrorKind::Coherency, true);
                    }
                }
            }
            solved
        } else if let Some(solved) = self.solve_without_parity(row, erased, lba)? {
            solved
        } else {
            for &(p, kind) in bad {
                self.report.record(lba, ReconstructSpec::mask([p]), kind, false);
            }
            self.report.record(
                lba,
                ReconstructSpec::mask(failed.iter().copied()),
                ErrorKind::Coherency,
                false,
            );
            return Ok(RowVerdict::Unsolvable);
        };

        for &(p, kind) in bad {
            self.report.record(lba, ReconstructSpec::mask([p]), kind, true);
        }
        Ok(RowVerdict::Solved(solved))
    }
}

/// `reconstruct` runs the pass and writes rebuilt sectors into the member chains.
///
/// # Arguments
/// * `spec` - Per-position view of the bound stripe.
/// * `buffers` - Page and host memory behind the chains; must hold the member reads.
///
/// # Errors
/// Returns `InvalidParameter` when the degraded range lies outside the chains or a
/// position is malformed, and `Validation` when a chain is shorter than the read.
/// Media and consistency problems are reported, not returned.
pub fn reconstruct(
    spec: &ReconstructSpec<'_>,
    buffers: &mut BufferSet<'_>,
) -> RaidResult<ReconstructReport> {
    let width = spec.width();
    let engine_codec = codec(spec.raid_type);
    if width <= engine_codec.parity_count()
        || spec.data_position.len() != width
        || spec.extent_position.len() != width
        || spec.rebuild_position.iter().flatten().any(|&p| p >= width)
    {
        return Err(RaidError::invalid(format!(
            "malformed reconstruction of width {width} rebuilding {:?}",
            spec.rebuild_position
        )));
    }
    let rebuild_start = spec.seed.checked_sub(spec.read_seed);
    let rebuild = rebuild_start
        .map(|start| start..start + u64::from(spec.count))
        .filter(|r| r.end <= spec.read_count)
        .ok_or_else(|| {
            RaidError::invalid(format!(
                "rebuild {}+{} outside read {}+{}",
                spec.seed, spec.count, spec.read_seed, spec.read_count
            ))
        })?;

    let dead: Vec<usize> = spec.rebuild_position.iter().flatten().copied().collect();
    let dead_data: Vec<usize> = dead.iter().copied().filter(|&p| spec.is_data(p)).collect();
    let media: Vec<usize> = (0..width)
        .filter(|&p| spec.media_error_bitmap & (1 << p) != 0 && !spec.is_rebuild(p))
        .collect();

    let mut engine = Engine {
        spec,
        codec: engine_codec,
        report: ReconstructReport::default(),
    };
    let mut row = vec![Sector::zero(); width];

    for block in 0..spec.read_count {
        let lba = spec.read_seed + block;
        let rebuilding = rebuild.contains(&block);
        for position in 0..width {
            row[spec.extent_position[position]] = buffers.read_block(spec.chains[position], block)?;
        }

        let mut bad: Vec<(usize, ErrorKind)> = media.iter().map(|&p| (p, ErrorKind::Media)).collect();
        for position in 0..width {
            if !spec.is_data(position) || spec.is_rebuild(position) || media.contains(&position) {
                continue;
            }
            if let Some(kind) = block_error(&row[spec.extent_position[position]], lba) {
                bad.push((position, kind));
            }
        }
        if bad.is_empty() && !rebuilding {
            continue;
        }

        let mut erased = dead.clone();
        erased.extend(bad.iter().map(|&(p, _)| p));

        match engine.row(&row, &erased, &bad, lba)? {
            RowVerdict::Solved(solved) => {
                for &(p, _) in &bad {
                    if spec.is_data(p) {
                        buffers.write_block(spec.chains[p], block, &solved[spec.extent_position[p]])?;
                    }
                }
                if rebuilding {
                    for &p in &dead_data {
                        buffers.write_block(spec.chains[p], block, &solved[spec.extent_position[p]])?;
                        engine.report.rebuilt_blocks += 1;
                    }
                }
            }
            RowVerdict::Unsolvable => {
                warn!(lba, ?bad, final_attempt = spec.final_recovery_attempt, "row cannot be rebuilt");
                if !spec.final_recovery_attempt {
                    continue;
                }
                let mut invalid = Sector::zero();
                invalid.invalidate(lba);
                let targets = bad
                    .iter()
                    .map(|&(p, _)| p)
                    .filter(|&p| spec.is_data(p))
                    .chain(dead_data.iter().copied().filter(|_| rebuilding));
                for p in targets {
                    buffers.write_block(spec.chains[p], block, &invalid)?;
                    engine.report.invalidated_blocks += 1;
                }
            }
        }
    }

    let mut report = engine.report;
    report.finish(spec.final_recovery_attempt);
    debug!(
        outcome = %report.outcome,
        rebuilt = report.rebuilt_blocks,
        invalidated = report.invalidated_blocks,
        regions = report.regions.len(),
        "reconstruction done"
    );
    Ok(report)
}
