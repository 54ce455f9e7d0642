use super::*;
use rand::RngCore;

fn random_payload() -> Vec<u8> {
    let mut payload = vec![0u8; DATA_BYTES];
    rand::rng().fill_bytes(&mut payload);
    payload
}

#[test]
fn formatted_sector_passes_both_checks() {
    let payload = random_payload();
    let s = Sector::formatted(&payload, 0x1234_5678);

    assert_eq!(s.data(), &payload[..]);
    assert!(s.has_valid_checksum());
    assert!(s.has_valid_lba_stamp(0x1234_5678));
}

#[test]
fn flipped_data_bit_breaks_checksum() {
    let mut s = Sector::formatted(&random_payload(), 9);
    s.data_mut()[100] ^= 0x04;
    assert!(!s.has_valid_checksum());
}

#[test]
fn checksum_depends_on_word_order() {
    let mut a = [0u8; DATA_BYTES];
    let mut b = [0u8; DATA_BYTES];
    a[0] = 1;
    b[4] = 1;
    assert_ne!(checksum(&a), checksum(&b));
}

#[test]
fn lba_stamp_rejects_wrong_address_but_accepts_unstamped() {
    let s = Sector::formatted(&random_payload(), 0x10);
    assert!(!s.has_valid_lba_stamp(0x11));

    let mut unstamped = s;
    let mut meta = unstamped.metadata();
    meta.lba_stamp = 0;
    unstamped.set_metadata(meta);
    assert!(unstamped.has_valid_lba_stamp(0x11));
}

#[test]
fn lba_stamp_folds_high_words() {
    assert_eq!(lba_stamp(0x0001_0000), 0x0001);
    assert_eq!(lba_stamp(0x0001_0001), 0x0000);
    assert_eq!(lba_stamp(0xABCD), 0xABCD);
}

#[test]
fn metadata_roundtrips_through_trailing_bytes() {
    let mut s = Sector::zero();
    let meta = Metadata {
        crc: 0xBEEF,
        time_stamp: 0x7FFF,
        write_stamp: 0x0003,
        lba_stamp: 0x1111,
    };
    s.set_metadata(meta);
    assert_eq!(s.metadata(), meta);
    assert_eq!(&s.as_bytes()[DATA_BYTES..DATA_BYTES + 2], &[0xEF, 0xBE]);
    assert!(s.data().iter().all(|&b| b == 0));
}

#[test]
fn invalidated_sector_is_recognized_and_fails_checksum() {
    let mut s = Sector::formatted(&random_payload(), 77);
    assert!(!s.is_invalidated());

    s.invalidate(77);
    assert!(s.is_invalidated());
    assert!(!s.has_valid_checksum());
    assert!(s.has_valid_lba_stamp(77));
}

#[test]
fn from_bytes_requires_exact_length() {
    assert!(Sector::from_bytes(&[0u8; BLOCK_BYTES - 1]).is_none());
    let s = Sector::from_bytes(&[7u8; BLOCK_BYTES]).expect("one block");
    assert!(s.as_bytes().iter().all(|&b| b == 7));
}

#[test]
fn xor_operators_are_self_inverse() {
    let a = Sector::formatted(&random_payload(), 1);
    let b = Sector::formatted(&random_payload(), 2);

    let mut c = a ^ b;
    c ^= &b;
    assert_eq!(c, a);

    let mut d = a;
    d ^= a;
    assert_eq!(d, Sector::zero());
}
