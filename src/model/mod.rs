//! Reference size-spectrum engine.
//!
//! A deliberately small single-species steady-state model: enough for the
//! stages to have real parameters to move and for the biomass invariant to be
//! meaningful. Everything here is a pure function over domain values.

pub mod biomass;
pub mod rates;
pub mod setup;
pub mod steady;

pub use biomass::*;
pub use rates::*;
pub use setup::*;
pub use steady::*;
