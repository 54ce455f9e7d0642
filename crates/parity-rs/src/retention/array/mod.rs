#[cfg(test)]
mod array_tests;

use std::collections::BTreeMap;
use std::fmt::Write;

use tracing::{debug, info};

use crate::degraded::{DegradedRead, DegradedReadOptions, PlannerConfig, ReconstructReport};
use crate::layout::geometry::Geometry;
use crate::layout::sector::{BLOCK_BYTES, DATA_BYTES, Sector};
use crate::layout::stripe::codec;
use crate::memory::{HostBuffer, PagePool};
use crate::retention::BlockDevice;
use crate::retention::disk::Disk;

/// ArrayConfig is the shape of an array and the memory it may use for reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArrayConfig {
    pub geometry: Geometry,
    /// Blocks per member image.
    pub disk_blocks: u64,
    pub planner: PlannerConfig,
    /// Upper bound on data pages held by one read.
    pub max_pages: usize,
}

/// HostRead is the payload of a host read plus what reconstruction found.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostRead {
    /// 512 bytes per host block.
    pub payload: Vec<u8>,
    pub report: ReconstructReport,
    /// Parity stripes that went through degraded reconstruction.
    pub degraded_stripes: usize,
}

pub struct Array {
    disks: Vec<Disk>,
    config: ArrayConfig,
    pool: PagePool,
}

impl Array {
    /// `init_array` opens one image per member.
    ///
    /// # Errors
    /// Returns an error if the path count differs from the width or an image cannot be opened.
    pub fn init_array(paths: &[String], config: ArrayConfig) -> anyhow::Result<Self> {
        let width = config.geometry.width();
        if paths.len() != width {
            anyhow::bail!("{} disk paths for an array of width {width}", paths.len());
        }
        if config.disk_blocks <= config.geometry.address_offset() {
            anyhow::bail!(
                "disks of {} blocks leave no room past offset {}",
                config.disk_blocks,
                config.geometry.address_offset()
            );
        }
        let disks = paths
            .iter()
            .enumerate()
            .map(|(i, p)| Disk::open_prealloc(i, p, config.disk_blocks))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let pool = PagePool::new(config.planner.page_blocks, config.max_pages);
        Ok(Self {
            disks,
            config,
            pool,
        })
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.config.geometry
    }

    /// `parity_stripes` is the number of whole parity stripes on the members.
    #[must_use]
    pub const fn parity_stripes(&self) -> u64 {
        let usable = self.config.disk_blocks - self.config.geometry.address_offset();
        usable / self.config.geometry.rows_per_parity_stripe()
    }

    /// `capacity_blocks` is the host-visible size of the array.
    #[must_use]
    pub const fn capacity_blocks(&self) -> u64 {
        self.parity_stripes() * self.config.geometry.data_blocks_per_parity_stripe()
    }

    /// # Errors
    /// Returns an error if `i` is out of range or the image cannot be renamed.
    pub fn fail_disk(&mut self, i: usize) -> anyhow::Result<()> {
        let width = self.disks.len();
        let Some(disk) = self.disks.get_mut(i) else {
            anyhow::bail!("disk index out of range: {i} (width={width})");
        };
        disk.fail()
    }

    /// # Errors
    /// Returns an error if `i` is out of range or the image cannot be recreated.
    pub fn replace_disk(&mut self, i: usize) -> anyhow::Result<()> {
        let width = self.disks.len();
        let Some(disk) = self.disks.get_mut(i) else {
            anyhow::bail!("disk index out of range: {i} (width={width})");
        };
        disk.replace()
    }

    /// `dead_positions` lists members that are missing or not yet rebuilt.
    ///
    /// # Errors
    /// Returns an error when more members are dead than the raid type tolerates.
    pub fn dead_positions(&self) -> anyhow::Result<[Option<usize>; 2]> {
        let dead: Vec<usize> = self
            .disks
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_missing() || d.needs_rebuild())
            .map(|(i, _)| i)
            .collect();
        let tolerated = self.config.geometry.parity_count();
        if dead.len() > tolerated {
            anyhow::bail!("{} members dead ({dead:?}), array tolerates {tolerated}", dead.len());
        }
        Ok([dead.first().copied(), dead.get(1).copied()])
    }

    #[must_use]
    pub fn status_string(&self) -> String {
        let g = &self.config.geometry;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:?} width={} element={} elements_per_parity={} capacity={} blocks",
            g.raid_type(),
            g.width(),
            g.blocks_per_element(),
            g.elements_per_parity(),
            self.capacity_blocks()
        );
        for (i, d) in self.disks.iter().enumerate() {
            let state = if d.is_missing() {
                "FAILED"
            } else if d.needs_rebuild() {
                "NEEDS_REBUILD"
            } else {
                "OK"
            };
            let exists = d.path().exists();
            let _ = writeln!(
                out,
                "disk {i}: {state} (image_exists={exists}, path={})",
                d.path().display()
            );
        }
        out
    }

    fn require_present(&self) -> anyhow::Result<()> {
        if let Some(i) = self.disks.iter().position(|d| d.is_missing()) {
            anyhow::bail!("disk {i} is missing; writes need every member");
        }
        Ok(())
    }

    fn row_parity_pos(&self, row: u64) -> usize {
        let g = &self.config.geometry;
        g.parity_position(row / g.rows_per_parity_stripe())
    }

    fn read_row(&self, row: u64) -> anyhow::Result<Vec<Sector>> {
        let g = &self.config.geometry;
        let parity_pos = self.row_parity_pos(row);
        let lba = g.address_offset() + row;
        let mut sectors = vec![Sector::zero(); g.width()];
        let mut buf = [0u8; BLOCK_BYTES];
        for (position, disk) in self.disks.iter().enumerate() {
            disk.read_blocks(lba, &mut buf)?;
            sectors[g.extent_position(position, parity_pos)] = Sector(buf);
        }
        Ok(sectors)
    }

    fn write_row(&mut self, row: u64, sectors: &[Sector]) -> anyhow::Result<()> {
        let g = self.config.geometry;
        let parity_pos = self.row_parity_pos(row);
        let lba = g.address_offset() + row;
        for (position, disk) in self.disks.iter_mut().enumerate() {
            disk.write_blocks(lba, sectors[g.extent_position(position, parity_pos)].as_bytes())?;
        }
        Ok(())
    }

    /// `format` writes zero payloads with valid metadata and parity to every row.
    ///
    /// # Errors
    /// Returns an error if a member is missing or cannot be written.
    pub fn format(&mut self) -> anyhow::Result<()> {
        self.require_present()?;
        let g = self.config.geometry;
        let codec = codec(g.raid_type());
        let rows = self.parity_stripes() * g.rows_per_parity_stripe();
        for row in 0..rows {
            let lba = g.address_offset() + row;
            let mut sectors = vec![Sector::formatted(&[], lba); g.width()];
            codec.encode(&mut sectors);
            self.write_row(row, &sectors)?;
        }
        for disk in &mut self.disks {
            disk.set_needs_rebuild(false)?;
        }
        info!(rows, "array formatted");
        Ok(())
    }

    fn check_range(&self, lba: u64, count: u64) -> anyhow::Result<()> {
        let capacity = self.capacity_blocks();
        if count == 0 || lba.checked_add(count).is_none_or(|end| end > capacity) {
            anyhow::bail!("host range {lba}+{count} outside capacity {capacity}");
        }
        Ok(())
    }

    /// `write_host` stores host payload blocks at `lba`, updating parity.
    ///
    /// # Errors
    /// Returns an error for misaligned payloads, out-of-range writes or missing members.
    pub fn write_host(&mut self, lba: u64, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() % DATA_BYTES != 0 {
            anyhow::bail!("payload of {} bytes is not block aligned", payload.len());
        }
        let count = (payload.len() / DATA_BYTES) as u64;
        self.check_range(lba, count)?;
        self.require_present()?;
        let dead = self.dead_positions()?;

        let g = self.config.geometry;
        let mut rows: BTreeMap<u64, Vec<(usize, &[u8])>> = BTreeMap::new();
        for (block, chunk) in (lba..lba + count).zip(payload.chunks_exact(DATA_BYTES)) {
            let (position, row) = g.locate_host_block(block);
            rows.entry(row).or_default().push((position, chunk));
        }

        let codec = codec(g.raid_type());
        for (row, blocks) in rows {
            let parity_pos = self.row_parity_pos(row);
            let member_lba = g.address_offset() + row;
            let mut sectors = self.read_row(row)?;
            // Untrusted members hold no data yet; recover their sectors before re-encoding.
            let erased: Vec<usize> = dead
                .iter()
                .flatten()
                .map(|&p| g.extent_position(p, parity_pos))
                .collect();
            if !erased.is_empty() {
                codec.restore(&mut sectors, &erased)?;
            }
            for (position, chunk) in blocks {
                sectors[g.extent_position(position, parity_pos)] =
                    Sector::formatted(chunk, member_lba);
            }
            codec.encode(&mut sectors);
            self.write_row(row, &sectors)?;
        }
        debug!(lba, count, "host write");
        Ok(())
    }

    fn read_direct(&self, lba: u64, count: u64, payload: &mut Vec<u8>) -> anyhow::Result<()> {
        let g = &self.config.geometry;
        let mut buf = [0u8; BLOCK_BYTES];
        for block in lba..lba + count {
            let (position, row) = g.locate_host_block(block);
            self.disks[position].read_blocks(g.address_offset() + row, &mut buf)?;
            payload.extend_from_slice(&buf[..DATA_BYTES]);
        }
        Ok(())
    }

    /// `read_host` reads host blocks, reconstructing parity stripes with dead data members.
    ///
    /// # Errors
    /// Returns an error for out-of-range reads, too many dead members, or a failed pass.
    pub fn read_host(
        &mut self,
        lba: u64,
        count: u64,
        options: DegradedReadOptions,
    ) -> anyhow::Result<HostRead> {
        self.check_range(lba, count)?;
        let dead = self.dead_positions()?;
        let g = self.config.geometry;
        let engine = DegradedRead::new(&g, self.config.planner);
        let mut out = HostRead::default();

        for (piece_lba, piece_count) in g.split_host_range(lba, count) {
            let parity_pos = g.parity_position(piece_lba / g.data_blocks_per_parity_stripe());
            if g.resolve_dead_positions(dead, parity_pos)?.is_empty() {
                self.read_direct(piece_lba, piece_count, &mut out.payload)?;
                continue;
            }
            let mut host = HostBuffer::new(piece_count)?;
            let members: Vec<&dyn BlockDevice> =
                self.disks.iter().map(|d| d as &dyn BlockDevice).collect();
            let report = engine.run(
                piece_lba,
                piece_count,
                dead,
                &members,
                &mut host,
                &mut self.pool,
                options,
            )?;
            for block in host.as_bytes().chunks_exact(BLOCK_BYTES) {
                out.payload.extend_from_slice(&block[..DATA_BYTES]);
            }
            out.report.absorb(&report);
            out.degraded_stripes += 1;
        }
        Ok(out)
    }

    /// `corrupt_block` flips payload bits of one member block, leaving its checksum stale.
    ///
    /// # Errors
    /// Returns an error if the position or row is out of range or the disk is missing.
    pub fn corrupt_block(&mut self, position: usize, row: u64) -> anyhow::Result<()> {
        let lba = self.config.geometry.address_offset() + row;
        let Some(disk) = self.disks.get_mut(position) else {
            anyhow::bail!("disk index out of range: {position}");
        };
        let mut buf = [0u8; BLOCK_BYTES];
        disk.read_blocks(lba, &mut buf)?;
        buf[DATA_BYTES / 2] ^= 0xFF;
        disk.write_blocks(lba, &buf)?;
        info!(position, row, "block corrupted");
        Ok(())
    }
}
