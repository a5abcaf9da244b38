//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - observation and alignment records (`ObservationRow`, `AtomicBin`, `InterpolationEdge`)
//! - model state (`SpeciesParams`, `GearParams`, `WeightGrid`, `ModelSnapshot`)
//! - session requests (`Stage`, `MatchRequest`, `PenaltyWeights`)

pub mod types;

pub use types::*;
