//! Query functions organized by pool record.

pub mod economics;
pub mod notes;
pub mod nullifiers;
pub mod params;
pub mod vault;
