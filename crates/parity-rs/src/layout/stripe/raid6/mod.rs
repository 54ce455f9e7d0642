//! Dual parity: row parity P = xor(D_i) and diagonal parity Q = xor(g^i * D_i).

mod encode_impl;
mod restore_impl;

#[cfg(test)]
mod encode_trait_tests;

use crate::layout::sector::Sector;
use crate::layout::stripe::gf;

/// Raid6 is the P+Q Reed-Solomon codec over GF(2^8).
#[derive(Clone, Copy, Debug, Default)]
pub struct Raid6;

impl Raid6 {
    pub const PARITY: usize = 2;

    /// `p_syndrome` folds the data sectors of `row` that are not in `skip`.
    fn p_syndrome(row: &[Sector], data: usize, skip: &[usize]) -> Sector {
        let mut acc = Sector::zero();
        for (i, s) in row[..data].iter().enumerate() {
            if !skip.contains(&i) {
                acc ^= s;
            }
        }
        acc
    }

    /// `q_syndrome` weights each data sector not in `skip` by `g^i` and folds them.
    fn q_syndrome(row: &[Sector], data: usize, skip: &[usize]) -> Sector {
        let mut acc = Sector::zero();
        for (i, s) in row[..data].iter().enumerate() {
            if !skip.contains(&i) {
                gf::mul_xor_into(gf::pow2(i), s.as_bytes(), acc.as_bytes_mut());
            }
        }
        acc
    }
}
