//! `spectrum-match` library crate.
//!
//! Calibrates a size-spectrum model against binned field observations. The
//! binary (`smatch`) is a thin wrapper around this library so that:
//!
//! - alignment, objective assembly and the pipeline are testable without
//!   spawning processes
//! - a host other than the CLI can drive a [`session::Session`] directly

pub mod align;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod model;
pub mod objective;
pub mod report;
pub mod session;
pub mod stages;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;
