//! Erasure solving for rows with missing or untrusted members.

use crate::error::RaidResult;
use crate::layout::sector::Sector;

/// Restore rebuilds erased members of a row from the survivors.
pub trait Restore {
    /// restore recomputes every extent listed in `erased`.
    ///
    /// # Arguments
    /// * `row` - One sector per member in extent order; erased slots may hold anything.
    /// * `erased` - Extent positions to rebuild.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when more extents are erased than the code can solve
    /// or an extent is out of range.
    fn restore(&self, row: &mut [Sector], erased: &[usize]) -> RaidResult<()>;

    /// inconsistent_parity returns parity extents that disagree with the data sectors.
    fn inconsistent_parity(&self, row: &[Sector]) -> Vec<usize>;
}
