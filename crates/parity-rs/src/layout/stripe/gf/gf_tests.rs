use super::*;

#[test]
fn generator_powers_cycle_after_255() {
    assert_eq!(pow2(0), 1);
    assert_eq!(pow2(1), 2);
    assert_eq!(pow2(8), 0x1D);
    assert_eq!(pow2(255), 1);
}

#[test]
fn every_non_zero_element_has_an_inverse() {
    for a in 1..=255u8 {
        let inv = div(1, a);
        assert_eq!(mul(a, inv), 1, "inverse of {a:#x}");
    }
}

#[test]
fn mul_is_commutative_and_distributive() {
    for a in [0u8, 1, 2, 0x53, 0xCA, 0xFF] {
        for b in [0u8, 3, 0x1D, 0x80, 0xFE] {
            assert_eq!(mul(a, b), mul(b, a));
            for c in [5u8, 0x77] {
                assert_eq!(mul(a, b ^ c), mul(a, b) ^ mul(a, c));
            }
        }
    }
}

#[test]
fn mul_xor_into_matches_scalar_mul() {
    let src = [0u8, 1, 2, 0x80, 0xFF];
    let mut dst = [0xAAu8; 5];
    mul_xor_into(0x1D, &src, &mut dst);
    for (i, s) in src.iter().enumerate() {
        assert_eq!(dst[i], 0xAA ^ mul(0x1D, *s));
    }
}

#[test]
fn scale_then_divide_restores_buffer() {
    let mut buf = [7u8, 0, 0x99, 0xFE];
    scale(0x35, &mut buf);
    for b in buf.iter_mut() {
        *b = div(*b, 0x35);
    }
    assert_eq!(buf, [7u8, 0, 0x99, 0xFE]);
}
