//! Sector format, array geometry and parity codecs.

pub mod geometry;
pub mod sector;
pub mod stripe;
