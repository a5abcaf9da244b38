//! Input/output helpers.
//!
//! - observation CSV ingest (`ingest`)
//! - model file read/write (`model_file`)
//! - bins/edges/objective exports (`export`)

pub mod export;
pub mod ingest;
pub mod model_file;

pub use export::*;
pub use ingest::*;
pub use model_file::*;
