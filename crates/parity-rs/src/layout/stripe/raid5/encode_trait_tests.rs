use crate::layout::sector::Sector;
use crate::layout::stripe::raid5::Raid5;
use crate::layout::stripe::traits::encode::Encode;

fn data(seed: u8) -> Sector {
    Sector::formatted(&[seed; 512], u64::from(seed))
}

#[test]
fn encode_writes_xor_of_data_into_last_sector() {
    let mut row = [data(1), data(2), data(3), Sector::zero()];
    Raid5.encode(&mut row);

    let mut expected = Sector::zero();
    expected ^= row[0];
    expected ^= row[1];
    expected ^= row[2];
    assert_eq!(row[3], expected);
    assert_eq!(Raid5.parity_count(), 1);
}

#[test]
fn encode_leaves_data_untouched() {
    let original = [data(9), data(8), Sector::zero()];
    let mut row = original;
    Raid5.encode(&mut row);
    assert_eq!(row[..2], original[..2]);
}

#[test]
#[should_panic(expected = "RAID5 row needs data sectors, got 1.")]
fn encode_panics_without_data() {
    let mut row = [Sector::zero()];
    Raid5.encode(&mut row);
}
