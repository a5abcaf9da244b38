//! Gear calibration.
//!
//! - `grid`: candidate axes (linear and log spaced)
//! - `likelihood`: objective value of one candidate gear
//! - `optimizer`: the [`Optimizer`] seam and the parallel grid search

pub mod grid;
pub mod likelihood;
pub mod optimizer;

pub use grid::*;
pub use likelihood::*;
pub use optimizer::*;
