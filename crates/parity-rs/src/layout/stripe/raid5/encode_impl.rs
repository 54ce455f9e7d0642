use crate::layout::sector::Sector;
use crate::layout::stripe::raid5::Raid5;
use crate::layout::stripe::traits::encode::Encode;

impl Encode for Raid5 {
    fn parity_count(&self) -> usize {
        Self::PARITY
    }

    fn encode(&self, row: &mut [Sector]) {
        assert!(
            row.len() > Self::PARITY,
            "RAID5 row needs data sectors, got {}.",
            row.len()
        );
        let parity = row.len() - 1;
        row[parity] = Self::xor_except(&row[..parity], parity);
    }
}
