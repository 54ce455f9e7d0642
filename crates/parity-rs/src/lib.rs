//! Degraded-read reconstruction for parity RAID layouts.
//!
//! A host read that lands on a stripe with one or two missing members is planned,
//! bound to buffers, read from the surviving members and rebuilt in place. The
//! pieces are usable on their own; [`degraded::DegradedRead`] strings them together.
#![allow(clippy::cargo_common_metadata)]

pub mod degraded;
pub mod error;
pub mod layout;
pub mod memory;
pub mod retention;

pub use error::{RaidError, RaidResult};
