//! Array geometry: rotating parity placement, position mapping and host range mapping.

#[cfg(test)]
mod geometry_tests;

use crate::error::{RaidError, RaidResult};

/// MAX_WIDTH is the widest array the planner accepts.
pub const MAX_WIDTH: usize = 16;

/// RaidType selects single (row) parity or dual (row + diagonal) parity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RaidType {
    Raid5,
    Raid6,
}

impl RaidType {
    #[inline]
    #[must_use]
    pub const fn parity_count(self) -> usize {
        match self {
            Self::Raid5 => 1,
            Self::Raid6 => 2,
        }
    }

    #[inline]
    #[must_use]
    pub const fn min_width(self) -> usize {
        match self {
            Self::Raid5 => 3,
            Self::Raid6 => 4,
        }
    }
}

fn check_shape(width: usize, parity_count: usize) -> RaidResult<()> {
    if !(1..=2).contains(&parity_count) || width <= parity_count || width > MAX_WIDTH {
        return Err(RaidError::invalid(format!(
            "malformed array shape: width {width}, parity count {parity_count}"
        )));
    }
    Ok(())
}

/// `position_to_stripe_relative` maps a physical member to its data position.
///
/// Data positions follow the parity member(s) around the array, so the mapping
/// rotates with `parity_position`.
///
/// # Arguments
/// * `physical_position` - Member slot in array order.
/// * `parity_position` - Physical slot of the row parity for this stripe.
/// * `width` - Number of members.
/// * `parity_count` - 1 for row parity, 2 for row + diagonal parity.
///
/// # Errors
/// Returns `InvalidParameter` when the member is a parity member or the shape is malformed.
pub fn position_to_stripe_relative(
    physical_position: usize,
    parity_position: usize,
    width: usize,
    parity_count: usize,
) -> RaidResult<usize> {
    check_shape(width, parity_count)?;
    if physical_position >= width || parity_position >= width {
        return Err(RaidError::invalid(format!(
            "position {physical_position} / parity {parity_position} outside width {width}"
        )));
    }
    let rel = (physical_position + width - parity_position) % width;
    if rel < parity_count {
        return Err(RaidError::invalid(format!(
            "position {physical_position} is a parity member (parity at {parity_position})"
        )));
    }
    Ok(rel - parity_count)
}

/// `stripe_relative_to_position` is the inverse of [`position_to_stripe_relative`].
///
/// # Errors
/// Returns `InvalidParameter` when `data_position` is not a data position of the shape.
pub fn stripe_relative_to_position(
    data_position: usize,
    parity_position: usize,
    width: usize,
    parity_count: usize,
) -> RaidResult<usize> {
    check_shape(width, parity_count)?;
    if data_position >= width - parity_count || parity_position >= width {
        return Err(RaidError::invalid(format!(
            "data position {data_position} / parity {parity_position} outside width {width}"
        )));
    }
    Ok((parity_position + parity_count + data_position) % width)
}

/// DeadDataPositions holds up to two dead members translated to data positions.
///
/// The first slot is always filled before the second.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeadDataPositions {
    pub first: Option<usize>,
    pub second: Option<usize>,
}

impl DeadDataPositions {
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        self.first.into_iter().chain(self.second)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// StripeGeometry is the layout of one host request inside its parity stripe.
///
/// Member addresses here are relative to the start of the array's region on each
/// member; [`Geometry::address_offset`] turns them into absolute member LBAs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StripeGeometry {
    pub parity_stripe: u64,
    pub parity_pos: usize,
    /// Data position holding the first host block.
    pub start_index: usize,
    /// Blocks from the first host block to the end of its element.
    pub blocks_remaining_in_data: u64,
    /// First member row of the parity stripe.
    pub logical_parity_start: u64,
    /// First member row touched by the request.
    pub parity_start: u64,
    /// Member rows touched by the request.
    pub parity_count: u64,
}

impl StripeGeometry {
    #[inline]
    #[must_use]
    pub const fn parity_start_offset(&self) -> u64 {
        self.parity_start - self.logical_parity_start
    }
}

/// Geometry describes a parity array: raid type, width and element sizing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    raid_type: RaidType,
    width: usize,
    blocks_per_element: u64,
    elements_per_parity: u64,
    address_offset: u64,
}

impl Geometry {
    /// `new` validates and builds an array geometry.
    ///
    /// # Arguments
    /// * `raid_type` - Single or dual parity.
    /// * `width` - Number of members.
    /// * `blocks_per_element` - Blocks written to one member before moving to the next.
    /// * `elements_per_parity` - Element rows sharing one parity placement.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for widths outside the raid type's range or zero sizes.
    pub fn new(
        raid_type: RaidType,
        width: usize,
        blocks_per_element: u64,
        elements_per_parity: u64,
    ) -> RaidResult<Self> {
        if width < raid_type.min_width() || width > MAX_WIDTH {
            return Err(RaidError::invalid(format!(
                "width {width} unsupported for {raid_type:?} (min {}, max {MAX_WIDTH})",
                raid_type.min_width()
            )));
        }
        if blocks_per_element == 0 || elements_per_parity == 0 {
            return Err(RaidError::invalid(format!(
                "zero element sizing: blocks_per_element {blocks_per_element}, \
                 elements_per_parity {elements_per_parity}"
            )));
        }
        blocks_per_element
            .checked_mul(elements_per_parity)
            .and_then(|rows| rows.checked_mul((width - raid_type.parity_count()) as u64))
            .ok_or_else(|| RaidError::invalid("parity stripe size overflows"))?;
        Ok(Self {
            raid_type,
            width,
            blocks_per_element,
            elements_per_parity,
            address_offset: 0,
        })
    }

    /// `with_address_offset` places the array `offset` blocks into every member.
    #[must_use]
    pub const fn with_address_offset(mut self, offset: u64) -> Self {
        self.address_offset = offset;
        self
    }

    #[inline]
    #[must_use]
    pub const fn raid_type(&self) -> RaidType {
        self.raid_type
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn parity_count(&self) -> usize {
        self.raid_type.parity_count()
    }

    #[inline]
    #[must_use]
    pub const fn data_disks(&self) -> usize {
        self.width - self.raid_type.parity_count()
    }

    #[inline]
    #[must_use]
    pub const fn blocks_per_element(&self) -> u64 {
        self.blocks_per_element
    }

    #[inline]
    #[must_use]
    pub const fn elements_per_parity(&self) -> u64 {
        self.elements_per_parity
    }

    #[inline]
    #[must_use]
    pub const fn address_offset(&self) -> u64 {
        self.address_offset
    }

    /// `rows_per_parity_stripe` is the member block count of one parity stripe.
    #[inline]
    #[must_use]
    pub const fn rows_per_parity_stripe(&self) -> u64 {
        self.blocks_per_element * self.elements_per_parity
    }

    /// `data_blocks_per_parity_stripe` is the host block count of one parity stripe.
    #[inline]
    #[must_use]
    pub const fn data_blocks_per_parity_stripe(&self) -> u64 {
        self.rows_per_parity_stripe() * self.data_disks() as u64
    }

    /// `parity_position` returns the row parity slot for a parity stripe.
    ///
    /// Parity starts on the last member and walks backwards one member per parity stripe.
    #[must_use]
    pub const fn parity_position(&self, parity_stripe: u64) -> usize {
        let width = self.width as u64;
        #[allow(clippy::cast_possible_truncation)]
        let pos = (width - 1 - parity_stripe % width) as usize;
        pos
    }

    /// `parity_positions` lists the physical slots of every parity member.
    pub fn parity_positions(&self, parity_pos: usize) -> impl Iterator<Item = usize> + use<> {
        let width = self.width;
        (0..self.parity_count()).map(move |j| (parity_pos + j) % width)
    }

    #[must_use]
    pub fn is_parity_position(&self, position: usize, parity_pos: usize) -> bool {
        self.parity_positions(parity_pos).any(|p| p == position)
    }

    /// `stripe_relative` is [`position_to_stripe_relative`] for this geometry.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `position` is a parity member.
    pub fn stripe_relative(&self, position: usize, parity_pos: usize) -> RaidResult<usize> {
        position_to_stripe_relative(position, parity_pos, self.width, self.parity_count())
    }

    /// `physical_position` is [`stripe_relative_to_position`] for this geometry.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `data_pos` is out of range.
    pub fn physical_position(&self, data_pos: usize, parity_pos: usize) -> RaidResult<usize> {
        stripe_relative_to_position(data_pos, parity_pos, self.width, self.parity_count())
    }

    /// `extent_position` orders members as data positions, then row parity, then diagonal parity.
    #[inline]
    #[must_use]
    pub const fn extent_position(&self, position: usize, parity_pos: usize) -> usize {
        (position + 2 * self.width - parity_pos - self.parity_count()) % self.width
    }

    /// `extent_to_physical` is the inverse of [`Self::extent_position`].
    #[inline]
    #[must_use]
    pub const fn extent_to_physical(&self, extent: usize, parity_pos: usize) -> usize {
        (parity_pos + self.parity_count() + extent) % self.width
    }

    /// `resolve_dead_positions` converts dead members into dead data positions.
    ///
    /// Dead parity members are skipped; if the first slot is absent or parity the
    /// second slot is promoted.
    ///
    /// # Arguments
    /// * `dead` - Up to two dead physical positions.
    /// * `parity_pos` - Row parity slot for the stripe in question.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for out of range or duplicated positions, or more
    /// dead members than the raid type tolerates.
    pub fn resolve_dead_positions(
        &self,
        dead: [Option<usize>; 2],
        parity_pos: usize,
    ) -> RaidResult<DeadDataPositions> {
        let dead_count = dead.iter().flatten().count();
        if dead_count > self.parity_count() {
            return Err(RaidError::invalid(format!(
                "{dead_count} dead positions exceed {:?} redundancy",
                self.raid_type
            )));
        }
        if let [Some(a), Some(b)] = dead {
            if a == b {
                return Err(RaidError::invalid(format!("dead position {a} listed twice")));
            }
        }

        let mut resolved = DeadDataPositions::default();
        for position in dead.into_iter().flatten() {
            if position >= self.width {
                return Err(RaidError::invalid(format!(
                    "dead position {position} outside width {}",
                    self.width
                )));
            }
            if self.is_parity_position(position, parity_pos) {
                continue;
            }
            let data_pos = self.stripe_relative(position, parity_pos)?;
            if resolved.first.is_none() {
                resolved.first = Some(data_pos);
            } else {
                resolved.second = Some(data_pos);
            }
        }
        Ok(resolved)
    }

    /// `map_host_range` lays a host request out inside its parity stripe.
    ///
    /// # Arguments
    /// * `lba` - First host block (array relative).
    /// * `count` - Host block count.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for empty requests, overflow, or a request that
    /// crosses a parity stripe boundary.
    pub fn map_host_range(&self, lba: u64, count: u64) -> RaidResult<StripeGeometry> {
        if count == 0 {
            return Err(RaidError::invalid("host request has zero blocks"));
        }
        let last = lba
            .checked_add(count - 1)
            .ok_or_else(|| RaidError::invalid(format!("host range {lba}+{count} overflows")))?;
        let per_parity = self.data_blocks_per_parity_stripe();
        let parity_stripe = lba / per_parity;
        if last / per_parity != parity_stripe {
            return Err(RaidError::invalid(format!(
                "host range {lba}+{count} crosses parity stripe {parity_stripe}"
            )));
        }

        let element = self.blocks_per_element;
        let data_disks = self.data_disks() as u64;
        let first_el = lba / element;
        let last_el = last / element;

        let mut lo = u64::MAX;
        let mut hi = 0;
        for el in first_el..=last_el {
            let row = (el / data_disks) * element;
            let first = if el == first_el { lba % element } else { 0 };
            let end = if el == last_el { last % element } else { element - 1 };
            lo = lo.min(row + first);
            hi = hi.max(row + end);
        }

        #[allow(clippy::cast_possible_truncation)]
        let start_index = (first_el % data_disks) as usize;
        Ok(StripeGeometry {
            parity_stripe,
            parity_pos: self.parity_position(parity_stripe),
            start_index,
            blocks_remaining_in_data: element - lba % element,
            logical_parity_start: parity_stripe * self.rows_per_parity_stripe(),
            parity_start: lo,
            parity_count: hi - lo + 1,
        })
    }

    /// `locate_host_block` returns the physical member and member row holding a host block.
    #[must_use]
    pub const fn locate_host_block(&self, lba: u64) -> (usize, u64) {
        let element = self.blocks_per_element;
        let data_disks = self.data_disks() as u64;
        let per_parity = self.data_blocks_per_parity_stripe();
        let parity_stripe = lba / per_parity;
        let local = lba % per_parity;
        let el = local / element;
        let row = parity_stripe * self.rows_per_parity_stripe()
            + (el / data_disks) * element
            + local % element;
        #[allow(clippy::cast_possible_truncation)]
        let data_pos = (el % data_disks) as usize;
        let position = (self.parity_position(parity_stripe) + self.parity_count() + data_pos)
            % self.width;
        (position, row)
    }

    /// `split_host_range` cuts a host range into parity-stripe-bounded pieces.
    ///
    /// # Returns
    /// `(lba, count)` pairs in ascending order.
    #[must_use]
    pub fn split_host_range(&self, lba: u64, count: u64) -> Vec<(u64, u64)> {
        let per_parity = self.data_blocks_per_parity_stripe();
        let mut pieces = Vec::new();
        let mut cursor = lba;
        let mut remaining = count;
        while remaining > 0 {
            let room = per_parity - cursor % per_parity;
            let take = room.min(remaining);
            pieces.push((cursor, take));
            cursor += take;
            remaining -= take;
        }
        pieces
    }
}
