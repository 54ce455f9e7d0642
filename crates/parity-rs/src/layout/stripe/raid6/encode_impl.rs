use crate::layout::sector::Sector;
use crate::layout::stripe::raid6::Raid6;
use crate::layout::stripe::traits::encode::Encode;

impl Encode for Raid6 {
    fn parity_count(&self) -> usize {
        Self::PARITY
    }

    fn encode(&self, row: &mut [Sector]) {
        assert!(
            row.len() > Self::PARITY + 1,
            "RAID6 row needs at least two data sectors, got {}.",
            row.len()
        );
        let data = row.len() - Self::PARITY;
        row[data] = Self::p_syndrome(row, data, &[]);
        row[data + 1] = Self::q_syndrome(row, data, &[]);
    }
}
