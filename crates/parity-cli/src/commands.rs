use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use parity_rs::degraded::{DegradedReadOptions, PlannerConfig};
use parity_rs::layout::geometry::Geometry;
use parity_rs::layout::sector::DATA_BYTES;
use parity_rs::retention::array::{Array, ArrayConfig, HostRead};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::cli::{ArrayArgs, CorruptArgs, FailArgs, InitArgs, ReadArgs};

fn disk_paths(disk_dir: &Path, width: usize) -> Result<Vec<String>> {
    std::fs::create_dir_all(disk_dir)
        .with_context(|| format!("failed to create disk directory {}", disk_dir.display()))?;
    Ok((0..width)
        .map(|i| {
            disk_dir
                .join(format!("disk-{i}.img"))
                .to_string_lossy()
                .into_owned()
        })
        .collect())
}

fn open_array(args: &ArrayArgs) -> Result<Array> {
    let geometry = Geometry::new(
        args.raid.into(),
        args.width,
        args.element_blocks,
        args.elements_per_parity,
    )?;
    let config = ArrayConfig {
        geometry,
        disk_blocks: args.disk_blocks,
        planner: PlannerConfig {
            page_blocks: args.page_blocks,
        },
        max_pages: args.max_pages,
    };
    let paths = disk_paths(&args.disk_dir, args.width)?;
    Array::init_array(&paths, config)
}

pub(crate) fn run_init(args: &InitArgs) -> Result<String> {
    let mut array = open_array(&args.array)?;
    array.format()?;
    if args.blocks > 0 {
        let capacity = array.capacity_blocks();
        if args.blocks > capacity {
            anyhow::bail!("{} payload blocks exceed capacity {capacity}", args.blocks);
        }
        let len = usize::try_from(args.blocks)?
            .checked_mul(DATA_BYTES)
            .context("payload size overflows")?;
        let mut payload = vec![0u8; len];
        StdRng::seed_from_u64(args.seed).fill(payload.as_mut_slice());
        array.write_host(0, &payload)?;
        info!(blocks = args.blocks, seed = args.seed, "payload written");
    }
    Ok(array.status_string())
}

pub(crate) fn run_fail(args: &FailArgs) -> Result<String> {
    let mut array = open_array(&args.array)?;
    array.fail_disk(args.position)?;
    Ok(array.status_string())
}

pub(crate) fn run_corrupt(args: &CorruptArgs) -> Result<String> {
    let mut array = open_array(&args.array)?;
    array.corrupt_block(args.position, args.lba)?;
    Ok(format!("corrupted disk {} row {}\n", args.position, args.lba))
}

pub(crate) fn run_status(args: &ArrayArgs) -> Result<String> {
    Ok(open_array(args)?.status_string())
}

pub(crate) fn run_read(args: &ReadArgs) -> Result<String> {
    let mut array = open_array(&args.array)?;
    let options = DegradedReadOptions {
        final_recovery_attempt: args.final_attempt,
    };
    let read = array.read_host(args.lba, args.count, options)?;
    if let Some(out) = &args.out {
        std::fs::write(out, &read.payload)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }
    Ok(summary(args.count, &read))
}

fn hex_digest(data: &[u8]) -> String {
    Sha256::digest(data).iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn summary(count: u64, read: &HostRead) -> String {
    let report = &read.report;
    let mut out = String::new();
    for region in report.regions.iter() {
        let _ = writeln!(out, "{region}");
    }
    if report.regions.overflowed() {
        let _ = writeln!(out, "(more regions not shown)");
    }
    let uncorrectable: u64 = report
        .regions
        .iter()
        .filter(|r| !r.correctable)
        .map(|r| u64::from(r.blocks))
        .sum();
    let _ = writeln!(
        out,
        "blocks={count} degraded_stripes={} rebuilt={} uncorrectable={uncorrectable} invalidated={} outcome={}",
        read.degraded_stripes, report.rebuilt_blocks, report.invalidated_blocks, report.outcome
    );
    let _ = writeln!(out, "sha256={}", hex_digest(&read.payload));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RaidMode;

    fn array_args(dir: &Path) -> ArrayArgs {
        ArrayArgs {
            disk_dir: dir.to_path_buf(),
            raid: RaidMode::Raid5,
            width: 4,
            element_blocks: 4,
            elements_per_parity: 2,
            disk_blocks: 32,
            page_blocks: 8,
            max_pages: 64,
        }
    }

    fn read_args(dir: &Path, out: Option<std::path::PathBuf>) -> ReadArgs {
        ReadArgs {
            array: array_args(dir),
            lba: 0,
            count: 96,
            final_attempt: false,
            out,
        }
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            hex_digest(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn degraded_read_matches_healthy_digest() {
        let dir = tempfile::tempdir().unwrap();
        run_init(&InitArgs {
            array: array_args(dir.path()),
            blocks: 96,
            seed: 7,
        })
        .unwrap();

        let healthy_out = dir.path().join("healthy.bin");
        let healthy = run_read(&read_args(dir.path(), Some(healthy_out.clone()))).unwrap();
        assert!(healthy.contains("degraded_stripes=0"));

        run_fail(&FailArgs {
            array: array_args(dir.path()),
            position: 1,
        })
        .unwrap();
        let digest = |s: &str| s.lines().find(|l| l.starts_with("sha256=")).map(str::to_owned);
        for _ in 0..2 {
            let degraded = run_read(&read_args(dir.path(), None)).unwrap();
            assert!(degraded.contains("uncorrectable=0"));
            assert!(degraded.contains("degraded_stripes=3"));
            assert_eq!(digest(&healthy), digest(&degraded));
        }
        let status = run_status(&array_args(dir.path())).unwrap();
        assert!(status.contains("disk 1: NEEDS_REBUILD"));
        assert_eq!(std::fs::read(healthy_out).unwrap().len(), 96 * DATA_BYTES);
    }

    #[test]
    fn init_rejects_oversized_payload() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_init(&InitArgs {
            array: array_args(dir.path()),
            blocks: 97,
            seed: 0,
        })
        .unwrap_err();
        assert!(err.to_string().contains("exceed capacity"));
    }
}
