use crate::error::{RaidError, RaidResult};
use crate::layout::sector::Sector;
use crate::layout::stripe::gf;
use crate::layout::stripe::raid6::Raid6;
use crate::layout::stripe::traits::restore::Restore;

impl Raid6 {
    fn rebuild_from_p(row: &mut [Sector], data: usize, x: usize) {
        let mut acc = Self::p_syndrome(row, data, &[x]);
        acc ^= &row[data];
        row[x] = acc;
    }

    fn rebuild_from_q(row: &mut [Sector], data: usize, x: usize) {
        let mut acc = Self::q_syndrome(row, data, &[x]);
        acc ^= &row[data + 1];
        let inv = gf::div(1, gf::pow2(x));
        gf::scale(inv, acc.as_bytes_mut());
        row[x] = acc;
    }

    fn rebuild_two_data(row: &mut [Sector], data: usize, x: usize, y: usize) {
        // P_xy = D_x ^ D_y and Q_xy = g^x D_x ^ g^y D_y.
        let mut pxy = Self::p_syndrome(row, data, &[x, y]);
        pxy ^= &row[data];
        let mut qxy = Self::q_syndrome(row, data, &[x, y]);
        qxy ^= &row[data + 1];

        let gx = gf::pow2(x);
        let gy = gf::pow2(y);
        let denom = gx ^ gy;

        let mut dx = Sector::zero();
        for (out, (p, q)) in dx
            .as_bytes_mut()
            .iter_mut()
            .zip(pxy.as_bytes().iter().zip(qxy.as_bytes()))
        {
            *out = gf::div(gf::mul(gy, *p) ^ *q, denom);
        }
        let dy = pxy ^ dx;
        row[x] = dx;
        row[y] = dy;
    }
}

impl Restore for Raid6 {
    fn restore(&self, row: &mut [Sector], erased: &[usize]) -> RaidResult<()> {
        let width = row.len();
        if width < Self::PARITY + 2 {
            return Err(RaidError::invalid(format!("RAID6 row of width {width}")));
        }
        let data = width - Self::PARITY;
        let (p, q) = (data, data + 1);

        let mut lost = erased.to_vec();
        lost.sort_unstable();
        lost.dedup();
        if lost.len() > Self::PARITY || lost.iter().any(|&e| e >= width) {
            return Err(RaidError::invalid(format!(
                "RAID6 cannot restore extents {lost:?} of a {width}-wide row"
            )));
        }

        match *lost.as_slice() {
            [] => {}
            [x] if x == p => row[p] = Self::p_syndrome(row, data, &[]),
            [x] if x == q => row[q] = Self::q_syndrome(row, data, &[]),
            [x] => Self::rebuild_from_p(row, data, x),
            [x, y] if x == p && y == q => {
                row[p] = Self::p_syndrome(row, data, &[]);
                row[q] = Self::q_syndrome(row, data, &[]);
            }
            [x, y] if y == q => {
                Self::rebuild_from_p(row, data, x);
                row[q] = Self::q_syndrome(row, data, &[]);
            }
            [x, y] if y == p => {
                Self::rebuild_from_q(row, data, x);
                row[p] = Self::p_syndrome(row, data, &[]);
            }
            [x, y] => Self::rebuild_two_data(row, data, x, y),
            _ => unreachable!("erasure count checked above"),
        }
        Ok(())
    }

    fn inconsistent_parity(&self, row: &[Sector]) -> Vec<usize> {
        if row.len() < Self::PARITY + 2 {
            return Vec::new();
        }
        let data = row.len() - Self::PARITY;
        let mut stale = Vec::new();
        if Self::p_syndrome(row, data, &[]) != row[data] {
            stale.push(data);
        }
        if Self::q_syndrome(row, data, &[]) != row[data + 1] {
            stale.push(data + 1);
        }
        stale
    }
}
