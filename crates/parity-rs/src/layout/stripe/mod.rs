//! Parity codecs for single (RAID-5) and dual (RAID-6) redundancy.

pub mod gf;
pub mod raid5;
pub mod raid6;
pub mod traits;

use crate::layout::geometry::RaidType;
use raid5::Raid5;
use raid6::Raid6;
use traits::encode::Encode;
use traits::restore::Restore;

/// ParityCodec is a codec that can both encode and restore rows.
pub trait ParityCodec: Encode + Restore + Sync {}

impl<T: Encode + Restore + Sync> ParityCodec for T {}

/// `codec` returns the parity codec for a raid type.
#[must_use]
pub fn codec(raid_type: RaidType) -> &'static dyn ParityCodec {
    match raid_type {
        RaidType::Raid5 => &Raid5,
        RaidType::Raid6 => &Raid6,
    }
}
