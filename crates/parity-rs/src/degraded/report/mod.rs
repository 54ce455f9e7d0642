//! Error regions and outcome of a reconstruction pass.

use std::fmt;

/// MAX_ERROR_REGIONS is the number of regions a report keeps before it overflows.
pub const MAX_ERROR_REGIONS: usize = 16;

/// ErrorKind classifies what was wrong with a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Stored checksum does not match the payload.
    Checksum,
    /// LBA stamp belongs to another address.
    LbaStamp,
    /// Parity disagrees with data that checks out, or rebuilt data does not check out.
    Coherency,
    /// The member could not be read.
    Media,
}

impl ErrorKind {
    pub const ALL: [Self; 4] = [Self::Checksum, Self::LbaStamp, Self::Coherency, Self::Media];

    const fn index(self) -> usize {
        match self {
            Self::Checksum => 0,
            Self::LbaStamp => 1,
            Self::Coherency => 2,
            Self::Media => 3,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checksum => "checksum",
            Self::LbaStamp => "lba-stamp",
            Self::Coherency => "coherency",
            Self::Media => "media",
        };
        f.write_str(name)
    }
}

/// ErrorRegion is a run of member blocks sharing one error signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ErrorRegion {
    /// Absolute member LBA of the first block.
    pub lba: u64,
    pub blocks: u32,
    /// Physical positions involved, one bit each.
    pub pos_bitmask: u16,
    pub kind: ErrorKind,
    pub correctable: bool,
}

impl ErrorRegion {
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.lba + self.blocks as u64
    }
}

impl fmt::Display for ErrorRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lba {:#x}+{} positions {:#06x} {} {}",
            self.lba,
            self.blocks,
            self.pos_bitmask,
            self.kind,
            if self.correctable { "corrected" } else { "uncorrectable" }
        )
    }
}

/// ErrorRegions is the bounded region list of a report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorRegions {
    regions: Vec<ErrorRegion>,
    overflowed: bool,
}

impl ErrorRegions {
    /// `record` adds one errored block, extending a region it directly follows.
    pub fn record(&mut self, lba: u64, pos_bitmask: u16, kind: ErrorKind, correctable: bool) {
        if pos_bitmask == 0 {
            return;
        }
        if let Some(region) = self.regions.iter_mut().find(|r| {
            r.end() == lba
                && r.pos_bitmask == pos_bitmask
                && r.kind == kind
                && r.correctable == correctable
                && r.blocks < u32::MAX
        }) {
            region.blocks += 1;
            return;
        }
        if self.regions.len() == MAX_ERROR_REGIONS {
            self.overflowed = true;
            return;
        }
        self.regions.push(ErrorRegion {
            lba,
            blocks: 1,
            pos_bitmask,
            kind,
            correctable,
        });
    }

    /// `absorb` appends the regions of a later pass.
    pub fn absorb(&mut self, other: &Self) {
        for region in &other.regions {
            if self.regions.len() == MAX_ERROR_REGIONS {
                self.overflowed = true;
                break;
            }
            self.regions.push(*region);
        }
        self.overflowed |= other.overflowed;
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ErrorRegion] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorRegion> {
        self.regions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// `overflowed` reports whether regions were dropped for lack of room.
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }
}

/// ErrorBoard accumulates per-kind position bitmaps over a pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ErrorBoard {
    correctable: [u16; 4],
    uncorrectable: [u16; 4],
}

impl ErrorBoard {
    pub fn mark(&mut self, kind: ErrorKind, pos_bitmask: u16, correctable: bool) {
        if correctable {
            self.correctable[kind.index()] |= pos_bitmask;
        } else {
            self.uncorrectable[kind.index()] |= pos_bitmask;
        }
    }

    #[must_use]
    pub const fn correctable(&self, kind: ErrorKind) -> u16 {
        self.correctable[kind.index()]
    }

    #[must_use]
    pub const fn uncorrectable(&self, kind: ErrorKind) -> u16 {
        self.uncorrectable[kind.index()]
    }

    #[must_use]
    pub fn any_correctable(&self) -> bool {
        self.correctable.iter().any(|&b| b != 0)
    }

    #[must_use]
    pub fn any_uncorrectable(&self) -> bool {
        self.uncorrectable.iter().any(|&b| b != 0)
    }

    pub fn absorb(&mut self, other: &Self) {
        for i in 0..4 {
            self.correctable[i] |= other.correctable[i];
            self.uncorrectable[i] |= other.uncorrectable[i];
        }
    }
}

/// Outcome is the verdict of a pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// No member had a problem.
    #[default]
    Clean,
    /// Problems were found and repaired in the returned data.
    Corrected,
    /// Some blocks could not be rebuilt; running the pass again may help.
    RetryRequested,
    /// Some blocks could not be rebuilt on the final attempt and were invalidated.
    Uncorrectable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clean => "clean",
            Self::Corrected => "corrected",
            Self::RetryRequested => "retry-requested",
            Self::Uncorrectable => "uncorrectable",
        };
        f.write_str(name)
    }
}

/// ReconstructReport is what a pass hands back besides the rebuilt data.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReconstructReport {
    pub regions: ErrorRegions,
    pub board: ErrorBoard,
    pub outcome: Outcome,
    /// Dead-position blocks written into result buffers.
    pub rebuilt_blocks: u64,
    /// Blocks replaced by the invalidated pattern.
    pub invalidated_blocks: u64,
}

impl ReconstructReport {
    pub fn record(&mut self, lba: u64, pos_bitmask: u16, kind: ErrorKind, correctable: bool) {
        self.regions.record(lba, pos_bitmask, kind, correctable);
        self.board.mark(kind, pos_bitmask, correctable);
    }

    /// `finish` derives the outcome from what was recorded.
    pub fn finish(&mut self, final_recovery_attempt: bool) {
        self.outcome = if self.board.any_uncorrectable() {
            if final_recovery_attempt {
                Outcome::Uncorrectable
            } else {
                Outcome::RetryRequested
            }
        } else if self.board.any_correctable() {
            Outcome::Corrected
        } else {
            Outcome::Clean
        };
    }

    /// `absorb` folds the report of another parity stripe into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.regions.absorb(&other.regions);
        self.board.absorb(&other.board);
        self.outcome = self.outcome.max(other.outcome);
        self.rebuilt_blocks += other.rebuilt_blocks;
        self.invalidated_blocks += other.invalidated_blocks;
    }
}
