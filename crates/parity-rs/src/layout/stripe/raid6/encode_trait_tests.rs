use crate::layout::sector::Sector;
use crate::layout::stripe::gf;
use crate::layout::stripe::raid6::Raid6;
use crate::layout::stripe::traits::encode::Encode;

#[test]
fn encode_writes_p_and_q() {
    let d: Vec<Sector> = (1..=3u8).map(|v| Sector::formatted(&[v; 512], 0)).collect();
    let mut row = vec![d[0], d[1], d[2], Sector::zero(), Sector::zero()];
    Raid6.encode(&mut row);

    assert_eq!(row[3], d[0] ^ d[1] ^ d[2]);
    for b in 0..16 {
        let expected = d[0].as_bytes()[b]
            ^ gf::mul(2, d[1].as_bytes()[b])
            ^ gf::mul(4, d[2].as_bytes()[b]);
        assert_eq!(row[4].as_bytes()[b], expected, "byte {b}");
    }
    assert_eq!(Raid6.parity_count(), 2);
}

#[test]
fn q_differs_from_p_for_non_trivial_rows() {
    let mut row = vec![
        Sector::formatted(&[0x11; 512], 1),
        Sector::formatted(&[0x22; 512], 2),
        Sector::zero(),
        Sector::zero(),
    ];
    Raid6.encode(&mut row);
    assert_ne!(row[2], row[3]);
}

#[test]
#[should_panic(expected = "RAID6 row needs at least two data sectors, got 3.")]
fn encode_panics_on_narrow_row() {
    let mut row = [Sector::zero(); 3];
    Raid6.encode(&mut row);
}
