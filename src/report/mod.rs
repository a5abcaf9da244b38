//! Reporting: formatted terminal output for alignments, objectives, sessions
//! and pipeline runs.

pub mod format;

pub use format::*;
