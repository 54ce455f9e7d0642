//! Single parity: the last sector of a row is the XOR of the data sectors.

mod encode_impl;
mod restore_impl;

#[cfg(test)]
mod restore_trait_tests;
#[cfg(test)]
mod encode_trait_tests;

use crate::layout::sector::Sector;

/// Raid5 is the XOR parity codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct Raid5;

impl Raid5 {
    pub const PARITY: usize = 1;

    /// `xor_except` folds every sector of `row` except `skip`.
    #[must_use]
    pub fn xor_except(row: &[Sector], skip: usize) -> Sector {
        let mut acc = Sector::zero();
        for (i, s) in row.iter().enumerate() {
            if i != skip {
                acc ^= s;
            }
        }
        acc
    }
}
