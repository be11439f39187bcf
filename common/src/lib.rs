//! Trellis Common Types
//!
//! This crate contains shared types used across the Trellis ledger,
//! including entity identifiers, asset units, and time helpers.

pub mod identifiers;
pub mod time;
pub mod units;

pub use identifiers::*;
pub use time::*;
pub use units::*;
