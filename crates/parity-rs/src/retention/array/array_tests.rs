use super::*;
use crate::degraded::{ErrorKind, Outcome};
use crate::layout::geometry::RaidType;
use rand::RngCore;
use tempfile::TempDir;

fn config(raid_type: RaidType, width: usize) -> ArrayConfig {
    ArrayConfig {
        geometry: Geometry::new(raid_type, width, 4, 2).expect("geometry"),
        disk_blocks: 32,
        planner: PlannerConfig { page_blocks: 8 },
        max_pages: 64,
    }
}

fn formatted_array(dir: &TempDir, cfg: ArrayConfig) -> Array {
    let paths: Vec<String> = (0..cfg.geometry.width())
        .map(|i| dir.path().join(format!("disk-{i}.img")).to_string_lossy().into_owned())
        .collect();
    let mut array = Array::init_array(&paths, cfg).expect("array");
    array.format().expect("format");
    array
}

fn random_payload(blocks: u64) -> Vec<u8> {
    let mut payload = vec![0u8; blocks as usize * DATA_BYTES];
    rand::rng().fill_bytes(&mut payload);
    payload
}

#[test]
fn init_rejects_wrong_path_count() {
    let dir = TempDir::new().expect("tmp dir");
    let paths = vec![dir.path().join("only.img").to_string_lossy().into_owned()];
    assert!(Array::init_array(&paths, config(RaidType::Raid5, 4)).is_err());
}

#[test]
fn capacity_counts_whole_parity_stripes() {
    let dir = TempDir::new().expect("tmp dir");
    let array = formatted_array(&dir, config(RaidType::Raid5, 5));
    assert_eq!(array.parity_stripes(), 4);
    assert_eq!(array.capacity_blocks(), 4 * 32);
    assert_eq!(array.dead_positions().expect("dead"), [None, None]);
}

#[test]
fn healthy_read_returns_written_payload() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid5, 5));
    let payload = random_payload(40);
    array.write_host(7, &payload).expect("write");

    let read = array
        .read_host(7, 40, DegradedReadOptions::default())
        .expect("read");
    assert_eq!(read.payload, payload);
    assert_eq!(read.degraded_stripes, 0);
    assert_eq!(read.report.outcome, Outcome::Clean);
}

#[test]
fn write_after_replace_keeps_the_unrebuilt_member_recoverable() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid5, 4));
    let mut expected = random_payload(24);
    array.write_host(0, &expected).expect("write");
    array.fail_disk(1).expect("fail");
    array.replace_disk(1).expect("replace");

    let block = random_payload(1);
    array.write_host(0, &block).expect("overwrite block on member 0");
    expected[..DATA_BYTES].copy_from_slice(&block);

    let read = array
        .read_host(0, 24, DegradedReadOptions::default())
        .expect("read");
    assert_eq!(read.payload, expected);
    assert_eq!(read.report.outcome, Outcome::Clean);
    assert_eq!(read.degraded_stripes, 1);
}

#[test]
fn reopened_array_keeps_failed_member_dead() {
    let dir = TempDir::new().expect("tmp dir");
    let cfg = config(RaidType::Raid5, 4);
    let mut array = formatted_array(&dir, cfg);
    let payload = random_payload(48);
    array.write_host(0, &payload).expect("write");
    array.fail_disk(1).expect("fail");
    drop(array);

    let paths: Vec<String> = (0..4)
        .map(|i| dir.path().join(format!("disk-{i}.img")).to_string_lossy().into_owned())
        .collect();
    for _ in 0..2 {
        let mut array = Array::init_array(&paths, cfg).expect("reopen");
        assert_eq!(array.dead_positions().expect("dead"), [Some(1), None]);
        assert!(array.status_string().contains("disk 1: NEEDS_REBUILD"));
        let read = array
            .read_host(0, 48, DegradedReadOptions::default())
            .expect("read");
        assert_eq!(read.payload, payload);
    }
}

#[test]
fn failed_member_is_reconstructed_across_parity_stripes() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid5, 5));
    let payload = random_payload(100);
    array.write_host(10, &payload).expect("write");
    array.fail_disk(2).expect("fail");
    assert_eq!(array.dead_positions().expect("dead"), [Some(2), None]);
    assert!(array.status_string().contains("disk 2: FAILED"));

    let read = array
        .read_host(10, 100, DegradedReadOptions::default())
        .expect("read");
    assert_eq!(read.payload, payload);
    assert_eq!(read.report.outcome, Outcome::Clean);
    assert!(read.degraded_stripes >= 3);
    assert!(read.report.rebuilt_blocks > 0);
}

#[test]
fn two_failed_members_on_dual_parity() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid6, 6));
    let capacity = array.capacity_blocks();
    let payload = random_payload(capacity);
    array.write_host(0, &payload).expect("write");
    array.fail_disk(0).expect("fail");
    array.replace_disk(4).expect("replace");
    assert!(array.status_string().contains("disk 4: NEEDS_REBUILD"));

    let read = array
        .read_host(0, capacity, DegradedReadOptions::default())
        .expect("read");
    assert_eq!(read.payload, payload);
    assert_eq!(read.report.outcome, Outcome::Clean);

    array.fail_disk(1).expect("fail third");
    assert!(array.dead_positions().is_err());
    assert!(array.write_host(0, &payload[..DATA_BYTES]).is_err());
}

#[test]
fn corrupted_block_is_corrected_during_degraded_read() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid6, 6));
    let payload = random_payload(32);
    array.write_host(0, &payload).expect("write");
    // Parity stripe 0: P on member 5, Q on member 0, data on members 1..=4.
    array.corrupt_block(2, 1).expect("corrupt");
    array.fail_disk(3).expect("fail");

    let read = array
        .read_host(0, 32, DegradedReadOptions::default())
        .expect("read");
    assert_eq!(read.payload, payload);
    assert_eq!(read.report.outcome, Outcome::Corrected);
    assert_eq!(read.report.board.correctable(ErrorKind::Checksum), 1 << 2);
}

#[test]
fn out_of_range_host_access_is_rejected() {
    let dir = TempDir::new().expect("tmp dir");
    let mut array = formatted_array(&dir, config(RaidType::Raid5, 4));
    let capacity = array.capacity_blocks();
    assert!(array.write_host(capacity, &random_payload(1)).is_err());
    assert!(array.write_host(0, &[0u8; 100]).is_err());
    assert!(array
        .read_host(capacity - 1, 2, DegradedReadOptions::default())
        .is_err());
    assert!(array.read_host(0, 0, DegradedReadOptions::default()).is_err());
}
