//! Forward parity encoding for one row of a parity stripe.

use crate::layout::sector::Sector;

/// Encode computes parity sectors from the data sectors of a row.
///
/// Rows are in extent order: data positions first, then row parity, then
/// diagonal parity when present.
pub trait Encode {
    /// parity_count is the number of parity sectors at the end of every row.
    fn parity_count(&self) -> usize;

    /// encode overwrites the parity sectors of `row` from its data sectors.
    ///
    /// # Arguments
    /// * `row` - One sector per member in extent order.
    ///
    /// # Panics
    /// Panics if `row` is not wider than the parity count.
    fn encode(&self, row: &mut [Sector]);
}
