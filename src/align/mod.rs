//! Observation alignment.
//!
//! - `bins`: normalize, gap-fill and tile observation bins; restrict the grid
//! - `interp`: piecewise-linear interpolation weights from grid to bins

pub mod bins;
pub mod interp;

pub use bins::*;
pub use interp::*;
