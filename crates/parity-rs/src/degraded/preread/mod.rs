//! Pre-read gaps (r1/r2) per data position and the degraded sub-range.


use crate::error::{RaidError, RaidResult};
use crate::layout::geometry::{DeadDataPositions, StripeGeometry};

/// PrereadBlocks holds, per data position, the parity-range blocks before (`r1`)
/// and after (`r2`) the host data on that position.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PrereadBlocks {
    pub r1: Vec<u64>,
    pub r2: Vec<u64>,
}

impl PrereadBlocks {
    /// `host_blocks` is the host-visible part of a position's parity range.
    #[must_use]
    pub fn host_blocks(&self, data_pos: usize, parity_count: u64) -> u64 {
        parity_count.saturating_sub(self.r1[data_pos] + self.r2[data_pos])
    }
}

/// `calc_preread_blocks` splits every data position's parity range around the host data.
///
/// The first stripe row contributes `r1` on positions up to the starting position,
/// the last row contributes `r2` on positions from the ending position onwards.
///
/// # Arguments
/// * `host_start` - First host block.
/// * `stripe` - Layout of the request within its parity stripe.
/// * `host_count` - Host block count.
/// * `blocks_per_element` - Element size in blocks.
/// * `data_disks` - Number of data positions.
/// * `parity_start` - First member row of the parity range.
/// * `parity_count` - Member rows of the parity range.
///
/// # Errors
/// Returns `InvalidParameter` when the arguments disagree with each other.
pub fn calc_preread_blocks(
    host_start: u64,
    stripe: &StripeGeometry,
    host_count: u64,
    blocks_per_element: u64,
    data_disks: usize,
    parity_start: u64,
    parity_count: u64,
) -> RaidResult<PrereadBlocks> {
    let element = blocks_per_element;
    if element == 0 || data_disks == 0 || parity_count == 0 || host_count == 0 {
        return Err(RaidError::invalid(format!(
            "pre-read with element {element}, data disks {data_disks}, \
             parity count {parity_count}, host count {host_count}"
        )));
    }
    if stripe.start_index >= data_disks
        || stripe.blocks_remaining_in_data == 0
        || stripe.blocks_remaining_in_data > element
    {
        return Err(RaidError::invalid(format!(
            "start index {} / blocks remaining {} outside element {element} x {data_disks}",
            stripe.start_index, stripe.blocks_remaining_in_data
        )));
    }

    let start_write_offset = element - stripe.blocks_remaining_in_data;
    if host_start % element != start_write_offset {
        return Err(RaidError::invalid(format!(
            "host start {host_start} disagrees with element offset {start_write_offset}"
        )));
    }

    let mut r1 = vec![0u64; data_disks];
    let mut r2 = vec![0u64; data_disks];

    // First stripe row: positions before the start read their whole portion of the row.
    if stripe.start_index != 0 || start_write_offset != 0 {
        let read_offset = parity_start % element;
        let read_limit = parity_count.min(element - read_offset);
        let write_bound = start_write_offset;
        if write_bound < read_offset || write_bound >= read_offset + read_limit {
            return Err(RaidError::invalid(format!(
                "host offset {write_bound} outside first-row read [{read_offset}, +{read_limit})"
            )));
        }
        let mut blocks_read = write_bound - read_offset;
        for pos in (0..=stripe.start_index).rev() {
            r1[pos] += blocks_read;
            blocks_read = read_limit;
        }
    }

    // Last stripe row: positions from the end onwards read the rest of the row.
    let blocks_before_write = stripe.start_index as u64 * element + start_write_offset;
    let end = blocks_before_write
        .checked_add(host_count)
        .ok_or_else(|| RaidError::invalid("host end overflows"))?;
    let end_bound = end % element;
    #[allow(clippy::cast_possible_truncation)]
    let end_pos = ((end / element) % data_disks as u64) as usize;
    if end_pos != 0 || end_bound != 0 {
        let mut read_limit = (parity_start + parity_count) % element;
        if read_limit == 0 {
            read_limit = element;
        }
        let read_offset = read_limit.saturating_sub(parity_count);
        let write_bound = if end_bound == 0 { read_offset } else { end_bound };
        if write_bound > read_limit {
            return Err(RaidError::invalid(format!(
                "host end {write_bound} beyond last-row read limit {read_limit}"
            )));
        }
        let mut blocks_read = read_limit - write_bound;
        read_limit -= read_offset;
        for slot in &mut r2[end_pos..] {
            *slot += blocks_read;
            blocks_read = read_limit;
        }
    }

    for pos in 0..data_disks {
        if r1[pos] + r2[pos] > parity_count {
            return Err(RaidError::invalid(format!(
                "pre-read r1 {} + r2 {} exceeds parity count {parity_count} on position {pos}",
                r1[pos], r2[pos]
            )));
        }
    }
    Ok(PrereadBlocks { r1, r2 })
}

/// DegradedRange is the member range that has to be reconstructed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DegradedRange {
    /// First member row to reconstruct (array relative).
    pub offset: u64,
    pub count: u64,
    /// Offset of `offset` from the start of the parity range.
    pub dead_offset: u64,
}

impl DegradedRange {
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.count
    }
}

fn dead_range(
    data_pos: usize,
    preread: &PrereadBlocks,
    parity_start: u64,
    parity_count: u64,
) -> RaidResult<DegradedRange> {
    let (Some(&r1), Some(&r2)) = (preread.r1.get(data_pos), preread.r2.get(data_pos)) else {
        return Err(RaidError::invalid(format!(
            "dead data position {data_pos} outside {} data positions",
            preread.r1.len()
        )));
    };
    let Some(count) = parity_count.checked_sub(r1 + r2) else {
        return Err(RaidError::invalid(format!(
            "dead position {data_pos}: r1 {r1} + r2 {r2} exceed parity count {parity_count}"
        )));
    };
    Ok(DegradedRange {
        offset: parity_start + r1,
        count,
        dead_offset: r1,
    })
}

/// `calc_degraded_range` returns the contiguous range covering every dead data position.
///
/// With two dead positions the union of both ranges is taken, unless one of them
/// is empty, in which case the other is used as is.
///
/// # Errors
/// Returns `InvalidParameter` when no dead data position is given or the pre-read
/// counts do not fit the parity range.
pub fn calc_degraded_range(
    dead: DeadDataPositions,
    preread: &PrereadBlocks,
    parity_start: u64,
    parity_count: u64,
) -> RaidResult<DegradedRange> {
    let Some(first) = dead.first else {
        return Err(RaidError::invalid("degraded range without a dead data position"));
    };
    let range = dead_range(first, preread, parity_start, parity_count)?;
    let Some(second) = dead.second else {
        return Ok(range);
    };
    let other = dead_range(second, preread, parity_start, parity_count)?;

    if other.count == 0 {
        return Ok(range);
    }
    if range.count == 0 {
        return Ok(other);
    }
    let offset = range.offset.min(other.offset);
    let end = range.end().max(other.end());
    Ok(DegradedRange {
        offset,
        count: end - offset,
        dead_offset: offset - parity_start,
    })
}
