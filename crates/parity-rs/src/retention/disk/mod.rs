//! Member disk images backed by memory-mapped files.


use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RaidError, RaidResult};
use crate::layout::sector::BLOCK_BYTES;
use crate::retention::BlockDevice;

/// Disk is one member image of `blocks` 520-byte blocks.
pub struct Disk {
    position: usize,
    path: PathBuf,
    file: Option<File>,
    map: Option<MmapMut>,
    blocks: u64,
    needs_rebuild: bool,
}

/// `rebuild_marker` is the file whose presence keeps the member at `path` untrusted.
fn rebuild_marker(path: &Path) -> PathBuf {
    let mut marker = path.as_os_str().to_owned();
    marker.push(".rebuild");
    PathBuf::from(marker)
}

/// `image_bytes` is the byte length of an image of `blocks` blocks.
fn image_bytes(blocks: u64) -> anyhow::Result<u64> {
    blocks
        .checked_mul(BLOCK_BYTES as u64)
        .ok_or_else(|| anyhow::anyhow!("{blocks} blocks overflow the image size"))
}

/// `map_image` opens `path` read-write, sizes it to `bytes` and maps it.
fn map_image(path: &Path, bytes: u64, truncate: bool) -> anyhow::Result<(File, MmapMut)> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)?;
    file.set_len(bytes)?;
    let map_len = usize::try_from(bytes)
        .map_err(|_| anyhow::anyhow!("image of {bytes} bytes is not addressable"))?;
    // SAFETY: the image is private to this process and was just sized to `map_len`.
    let map = unsafe { MmapOptions::new().len(map_len).map_mut(&file)? };
    Ok((file, map))
}

impl Disk {
    /// `open_prealloc` opens or creates the image of member `position`.
    ///
    /// A new or resized image, or one left with a rebuild marker by an earlier
    /// `fail`/`replace`, is untrusted until [`Disk::set_needs_rebuild`] clears it.
    ///
    /// # Errors
    /// Returns an error if the image cannot be opened, sized or mapped.
    pub fn open_prealloc(position: usize, path: &str, blocks: u64) -> anyhow::Result<Self> {
        let path = PathBuf::from(path);
        let bytes = image_bytes(blocks)?;
        let prior = std::fs::metadata(&path).ok().map(|m| m.len());
        let marked = rebuild_marker(&path).exists();
        let (file, map) = map_image(&path, bytes, false)?;

        let mut disk = Self {
            position,
            path,
            file: Some(file),
            map: Some(map),
            blocks,
            needs_rebuild: false,
        };
        disk.set_needs_rebuild(marked || prior != Some(bytes))?;
        Ok(disk)
    }

    #[must_use]
    pub const fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// `set_needs_rebuild` records whether the member's contents are trusted, on disk
    /// as well as in memory, so the state survives reopening the image.
    ///
    /// # Errors
    /// Returns an error if the rebuild marker cannot be created or removed.
    pub fn set_needs_rebuild(&mut self, needs_rebuild: bool) -> anyhow::Result<()> {
        let marker = rebuild_marker(&self.path);
        if needs_rebuild {
            std::fs::write(&marker, b"")?;
        } else {
            match std::fs::remove_file(&marker) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        self.needs_rebuild = needs_rebuild;
        Ok(())
    }

    /// `fail` pulls the member: its image is renamed to `*.img.failed.<secs>` and unmapped.
    /// The member stays untrusted across reopens until it is rebuilt or formatted.
    ///
    /// # Errors
    /// Returns an error if the image cannot be renamed.
    pub fn fail(&mut self) -> anyhow::Result<()> {
        if self.path.exists() {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            std::fs::rename(&self.path, self.path.with_extension(format!("img.failed.{secs}")))?;
        }
        self.map = None;
        self.file = None;
        self.set_needs_rebuild(true)
    }

    /// `replace` inserts a blank image in place of the member; it stays dead until rebuilt.
    ///
    /// # Errors
    /// Returns an error if the image cannot be recreated or mapped.
    pub fn replace(&mut self) -> anyhow::Result<()> {
        let (file, map) = map_image(&self.path, image_bytes(self.blocks)?, true)?;
        self.file = Some(file);
        self.map = Some(map);
        self.set_needs_rebuild(true)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub const fn blocks(&self) -> u64 {
        self.blocks
    }

    /// `is_missing` is true once the member was failed or its image unlinked underneath us.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match (&self.file, &self.map) {
            (Some(file), Some(_)) => file.metadata().map_or(true, |meta| meta.nlink() == 0),
            _ => true,
        }
    }

    fn byte_range(&self, lba: u64, len: usize) -> Option<std::ops::Range<usize>> {
        if len % BLOCK_BYTES != 0 {
            return None;
        }
        let start = usize::try_from(lba).ok()?.checked_mul(BLOCK_BYTES)?;
        let end = start.checked_add(len)?;
        let disk_len = usize::try_from(self.blocks).ok()?.checked_mul(BLOCK_BYTES)?;
        (end <= disk_len).then_some(start..end)
    }

    fn media_error(&self, lba: u64, reason: &str) -> RaidError {
        RaidError::Media {
            position: self.position,
            lba,
            reason: reason.to_string(),
        }
    }
}

impl BlockDevice for Disk {
    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> RaidResult<()> {
        if self.is_missing() {
            return Err(self.media_error(lba, "disk missing"));
        }
        let (Some(map), Some(range)) = (self.map.as_ref(), self.byte_range(lba, buf.len())) else {
            return Err(self.media_error(lba, "read outside the image"));
        };
        buf.copy_from_slice(&map[range]);
        Ok(())
    }

    fn write_blocks(&mut self, lba: u64, data: &[u8]) -> RaidResult<()> {
        if self.is_missing() {
            return Err(self.media_error(lba, "disk missing"));
        }
        let Some(range) = self.byte_range(lba, data.len()) else {
            return Err(self.media_error(lba, "write outside the image"));
        };
        let Some(map) = self.map.as_mut() else {
            return Err(self.media_error(lba, "disk missing"));
        };
        map[range].copy_from_slice(data);
        Ok(())
    }
}
