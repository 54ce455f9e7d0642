//! In-memory members with formatted, parity-consistent contents.

use rand::{RngCore, SeedableRng, rngs::StdRng};

use crate::error::{RaidError, RaidResult};
use crate::layout::geometry::Geometry;
use crate::layout::sector::{BLOCK_BYTES, DATA_BYTES, Sector};
use crate::layout::stripe::codec;
use crate::retention::BlockDevice;

pub(crate) struct MemDevice {
    pub data: Vec<u8>,
    pub fail_reads: bool,
}

impl MemDevice {
    pub fn sector(&self, lba: u64) -> Sector {
        let at = lba as usize * BLOCK_BYTES;
        Sector::from_bytes(&self.data[at..at + BLOCK_BYTES]).expect("block")
    }

    pub fn put(&mut self, lba: u64, sector: &Sector) {
        let at = lba as usize * BLOCK_BYTES;
        self.data[at..at + BLOCK_BYTES].copy_from_slice(sector.as_bytes());
    }
}

impl BlockDevice for MemDevice {
    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> RaidResult<()> {
        let at = lba as usize * BLOCK_BYTES;
        match self.data.get(at..at + buf.len()) {
            Some(src) if !self.fail_reads => {
                buf.copy_from_slice(src);
                Ok(())
            }
            _ => Err(RaidError::Media {
                position: 0,
                lba,
                reason: "unreadable".into(),
            }),
        }
    }

    fn write_blocks(&mut self, lba: u64, data: &[u8]) -> RaidResult<()> {
        let at = lba as usize * BLOCK_BYTES;
        let dst = self.data.get_mut(at..at + data.len()).ok_or(RaidError::Media {
            position: 0,
            lba,
            reason: "out of range".into(),
        })?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

/// `formatted_members` fills `rows` member rows with random payloads and parity.
pub(crate) fn formatted_members(geometry: &Geometry, rows: u64, seed: u64) -> Vec<MemDevice> {
    let width = geometry.width();
    let offset = geometry.address_offset();
    let total = (offset + rows) as usize * BLOCK_BYTES;
    let mut devices: Vec<MemDevice> = (0..width)
        .map(|_| MemDevice {
            data: vec![0u8; total],
            fail_reads: false,
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let codec = codec(geometry.raid_type());
    let mut payload = [0u8; DATA_BYTES];
    for row in 0..rows {
        let lba = offset + row;
        let parity_pos = geometry.parity_position(row / geometry.rows_per_parity_stripe());
        let mut sectors: Vec<Sector> = (0..width)
            .map(|_| {
                rng.fill_bytes(&mut payload);
                Sector::formatted(&payload, lba)
            })
            .collect();
        codec.encode(&mut sectors);
        for (extent, sector) in sectors.iter().enumerate() {
            devices[geometry.extent_to_physical(extent, parity_pos)].put(lba, sector);
        }
    }
    devices
}

/// `expected_host` collects the sectors a host read of `lba..lba+count` must return.
pub(crate) fn expected_host(
    geometry: &Geometry,
    devices: &[MemDevice],
    lba: u64,
    count: u64,
) -> Vec<Sector> {
    (lba..lba + count)
        .map(|block| {
            let (position, row) = geometry.locate_host_block(block);
            devices[position].sector(geometry.address_offset() + row)
        })
        .collect()
}

/// `host_sectors` splits a host buffer into sectors.
pub(crate) fn host_sectors(bytes: &[u8]) -> Vec<Sector> {
    bytes
        .chunks_exact(BLOCK_BYTES)
        .map(|b| Sector::from_bytes(b).expect("block"))
        .collect()
}
