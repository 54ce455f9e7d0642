//! Per-member access tables for one stripe-bounded degraded read.


use tracing::debug;

use crate::error::{RaidError, RaidResult};
use crate::layout::geometry::{DeadDataPositions, Geometry, StripeGeometry};
use crate::memory::HostPlacement;

use super::preread::{DegradedRange, PrereadBlocks, calc_degraded_range, calc_preread_blocks};

/// INVALID_POSITION marks the terminator entry of an [`AccessTable`].
pub const INVALID_POSITION: usize = usize::MAX;

/// AccessOp is what the device layer does with an entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AccessOp {
    #[default]
    Read,
    /// The member is dead; its buffers are filled by reconstruction.
    Nop,
}

/// MemberAccessInfo is the access of one member: where, how much, which sg class.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemberAccessInfo {
    /// Physical member slot.
    pub position: usize,
    /// First member block, array relative.
    pub lba: u64,
    pub block_count: u64,
    /// Size class of the sg list bound to this entry.
    pub sg_index: usize,
    pub op: AccessOp,
}

impl MemberAccessInfo {
    pub const TERMINATOR: Self = Self {
        position: INVALID_POSITION,
        lba: 0,
        block_count: 0,
        sg_index: 0,
        op: AccessOp::Nop,
    };

    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.position == INVALID_POSITION
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.lba + self.block_count
    }
}

/// AccessTable is an ordered list of member accesses closed by a terminator entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessTable {
    entries: Vec<MemberAccessInfo>,
    capacity: usize,
}

impl AccessTable {
    /// `with_width` builds an empty table with room for one entry per member.
    #[must_use]
    pub fn with_width(width: usize) -> Self {
        let mut entries = Vec::with_capacity(width + 1);
        entries.push(MemberAccessInfo::TERMINATOR);
        Self {
            entries,
            capacity: width,
        }
    }

    /// `push` inserts an entry in front of the terminator.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when the table is full or the entry is a terminator.
    pub fn push(&mut self, info: MemberAccessInfo) -> RaidResult<()> {
        if info.is_terminator() {
            return Err(RaidError::invalid("terminator pushed into access table"));
        }
        if self.len() >= self.capacity {
            return Err(RaidError::invalid(format!(
                "access table full at {} entries",
                self.capacity
            )));
        }
        let at = self.entries.len() - 1;
        self.entries.insert(at, info);
        Ok(())
    }

    /// `len` counts entries, terminator excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn entries(&self) -> &[MemberAccessInfo] {
        &self.entries[..self.len()]
    }

    /// `raw` includes the terminator.
    #[must_use]
    pub fn raw(&self) -> &[MemberAccessInfo] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemberAccessInfo> {
        self.entries().iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, MemberAccessInfo> {
        let len = self.len();
        self.entries[..len].iter_mut()
    }

    #[must_use]
    pub fn find(&self, position: usize) -> Option<&MemberAccessInfo> {
        self.iter().find(|e| e.position == position)
    }
}

impl<'a> IntoIterator for &'a AccessTable {
    type Item = &'a MemberAccessInfo;
    type IntoIter = std::slice::Iter<'a, MemberAccessInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// StripeRequest is a host read confined to one parity stripe, with its member accesses.
///
/// The read table has one entry per member in extent order (data positions, then
/// parity). The write table has an entry for every data position with host data,
/// in data position order; it describes what the host sees of that member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StripeRequest {
    pub lba: u64,
    pub block_count: u64,
    pub stripe: StripeGeometry,
    pub dead_positions: [Option<usize>; 2],
    pub dead_data: DeadDataPositions,
    pub preread: PrereadBlocks,
    pub degraded: DegradedRange,
    pub read_info: AccessTable,
    pub write_info: AccessTable,
    address_offset: u64,
    blocks_per_element: u64,
    data_disks: usize,
}

impl StripeRequest {
    /// `new` maps a host read and builds its member access tables.
    ///
    /// # Arguments
    /// * `geometry` - Array layout.
    /// * `lba` - First host block, array relative.
    /// * `count` - Host blocks; the range may not cross a parity stripe.
    /// * `dead` - Up to two dead physical members.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for malformed ranges, dead positions the raid type
    /// cannot tolerate, or a read that has no dead data position in this stripe.
    pub fn new(
        geometry: &Geometry,
        lba: u64,
        count: u64,
        dead: [Option<usize>; 2],
    ) -> RaidResult<Self> {
        let stripe = geometry.map_host_range(lba, count)?;
        let dead_data = geometry.resolve_dead_positions(dead, stripe.parity_pos)?;
        if dead_data.is_empty() {
            return Err(RaidError::invalid(format!(
                "no dead data position in parity stripe {} (dead {dead:?})",
                stripe.parity_stripe
            )));
        }

        let data_disks = geometry.data_disks();
        let preread = calc_preread_blocks(
            lba,
            &stripe,
            count,
            geometry.blocks_per_element(),
            data_disks,
            stripe.parity_start,
            stripe.parity_count,
        )?;
        let degraded =
            calc_degraded_range(dead_data, &preread, stripe.parity_start, stripe.parity_count)?;

        let is_dead = |position: usize| dead.contains(&Some(position));
        let width = geometry.width();
        let mut read_info = AccessTable::with_width(width);
        let mut write_info = AccessTable::with_width(data_disks);

        for data_pos in 0..data_disks {
            let position = geometry.physical_position(data_pos, stripe.parity_pos)?;
            read_info.push(MemberAccessInfo {
                position,
                lba: stripe.parity_start,
                block_count: stripe.parity_count,
                sg_index: 0,
                op: if is_dead(position) {
                    AccessOp::Nop
                } else {
                    AccessOp::Read
                },
            })?;
            let host_blocks = preread.host_blocks(data_pos, stripe.parity_count);
            if host_blocks > 0 {
                write_info.push(MemberAccessInfo {
                    position,
                    lba: stripe.parity_start + preread.r1[data_pos],
                    block_count: host_blocks,
                    sg_index: 0,
                    op: AccessOp::Read,
                })?;
            }
        }
        for position in geometry.parity_positions(stripe.parity_pos) {
            read_info.push(MemberAccessInfo {
                position,
                lba: stripe.parity_start,
                block_count: stripe.parity_count,
                sg_index: 0,
                op: if is_dead(position) {
                    AccessOp::Nop
                } else {
                    AccessOp::Read
                },
            })?;
        }

        debug!(
            lba,
            count,
            parity_start = stripe.parity_start,
            parity_count = stripe.parity_count,
            degraded_offset = degraded.offset,
            degraded_count = degraded.count,
            "stripe request"
        );
        Ok(Self {
            lba,
            block_count: count,
            stripe,
            dead_positions: dead,
            dead_data,
            preread,
            degraded,
            read_info,
            write_info,
            address_offset: geometry.address_offset(),
            blocks_per_element: geometry.blocks_per_element(),
            data_disks,
        })
    }

    #[must_use]
    pub const fn parity_start(&self) -> u64 {
        self.stripe.parity_start
    }

    #[must_use]
    pub const fn parity_count(&self) -> u64 {
        self.stripe.parity_count
    }

    #[must_use]
    pub const fn address_offset(&self) -> u64 {
        self.address_offset
    }

    /// `total_blocks_to_read` sums every read entry, dead members included.
    #[must_use]
    pub fn total_blocks_to_read(&self) -> u64 {
        self.read_info.iter().map(|e| e.block_count).sum()
    }

    /// `host_placement` describes where the host blocks fall on the data positions.
    #[must_use]
    pub const fn host_placement(&self) -> HostPlacement {
        HostPlacement {
            lba: self.lba,
            blocks: self.block_count,
            start_pos: self.stripe.start_index,
            blocks_per_element: self.blocks_per_element,
            data_disks: self.data_disks,
        }
    }

    /// `is_dead` reports whether a physical member is one of the dead positions.
    #[must_use]
    pub fn is_dead(&self, position: usize) -> bool {
        self.dead_positions.contains(&Some(position))
    }
}
