//! GF(2^8) arithmetic for the diagonal (Q) parity, polynomial 0x11D, generator 2.

#[cfg(test)]
mod gf_tests;

const POLY: u16 = 0x11D;

const fn build_tables() -> ([u8; 512], [u8; 256]) {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= POLY;
        }
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    (exp, log)
}

const TABLES: ([u8; 512], [u8; 256]) = build_tables();
const EXP: [u8; 512] = TABLES.0;
const LOG: [u8; 256] = TABLES.1;

#[inline]
#[must_use]
/// `pow2` returns the generator raised to `power`.
pub const fn pow2(power: usize) -> u8 {
    EXP[power % 255]
}

#[inline]
#[must_use]
pub const fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

#[inline]
#[must_use]
/// `div` divides `a` by a non-zero `b`; dividing by zero yields zero.
pub const fn div(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + 255 - LOG[b as usize] as usize]
}

/// `mul_xor_into` accumulates `coef * src` into `dst` byte by byte.
pub fn mul_xor_into(coef: u8, src: &[u8], dst: &mut [u8]) {
    if coef == 0 {
        return;
    }
    if coef == 1 {
        for (d, s) in dst.iter_mut().zip(src) {
            *d ^= *s;
        }
        return;
    }
    let log_c = LOG[coef as usize] as usize;
    for (d, s) in dst.iter_mut().zip(src) {
        if *s != 0 {
            *d ^= EXP[LOG[*s as usize] as usize + log_c];
        }
    }
}

/// `scale` multiplies every byte of `buf` by `coef` in place.
pub fn scale(coef: u8, buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = mul(*b, coef);
    }
}
