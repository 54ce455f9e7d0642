use crate::layout::sector::Sector;
use crate::layout::stripe::raid5::Raid5;
use crate::layout::stripe::traits::encode::Encode;
use crate::layout::stripe::traits::restore::Restore;
use rand::RngCore;

fn random_row(width: usize) -> Vec<Sector> {
    let mut rng = rand::rng();
    let mut row: Vec<Sector> = (0..width)
        .map(|i| {
            let mut payload = [0u8; 512];
            rng.fill_bytes(&mut payload);
            Sector::formatted(&payload, i as u64)
        })
        .collect();
    Raid5.encode(&mut row);
    row
}

#[test]
fn restore_rebuilds_any_single_extent() {
    let original = random_row(5);
    for lost in 0..5 {
        let mut row = original.clone();
        row[lost] = Sector::zero();
        Raid5.restore(&mut row, &[lost]).expect("single erasure");
        assert_eq!(row, original, "extent {lost}");
    }
}

#[test]
fn restore_without_erasures_is_a_no_op() {
    let original = random_row(4);
    let mut row = original.clone();
    Raid5.restore(&mut row, &[]).expect("nothing to do");
    assert_eq!(row, original);
}

#[test]
fn restore_rejects_two_erasures() {
    let mut row = random_row(4);
    assert!(Raid5.restore(&mut row, &[0, 1]).is_err());
    assert!(Raid5.restore(&mut row, &[4]).is_err());
}

#[test]
fn inconsistent_parity_flags_stale_parity() {
    let mut row = random_row(4);
    assert!(Raid5.inconsistent_parity(&row).is_empty());

    row[1].data_mut()[0] ^= 0xFF;
    assert_eq!(Raid5.inconsistent_parity(&row), vec![3]);
}
