use crate::error::{RaidError, RaidResult};
use crate::layout::sector::Sector;
use crate::layout::stripe::raid5::Raid5;
use crate::layout::stripe::traits::restore::Restore;

impl Restore for Raid5 {
    fn restore(&self, row: &mut [Sector], erased: &[usize]) -> RaidResult<()> {
        let mut lost = erased.to_vec();
        lost.sort_unstable();
        lost.dedup();
        match lost.as_slice() {
            [] => Ok(()),
            [i] if *i < row.len() => {
                row[*i] = Self::xor_except(row, *i);
                Ok(())
            }
            _ => Err(RaidError::invalid(format!(
                "RAID5 cannot restore extents {lost:?} of a {}-wide row",
                row.len()
            ))),
        }
    }

    fn inconsistent_parity(&self, row: &[Sector]) -> Vec<usize> {
        let Some(parity) = row.len().checked_sub(1) else {
            return Vec::new();
        };
        // Parity is consistent when the whole row folds to zero.
        if Self::xor_except(row, usize::MAX) == Sector::zero() {
            Vec::new()
        } else {
            vec![parity]
        }
    }
}
