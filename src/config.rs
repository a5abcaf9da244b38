//! Session configuration.
//!
//! Resolution order, highest first:
//!
//! 1. command-line flags
//! 2. environment (`SMATCH_SESSION_DIR`, `SMATCH_TOLERANCE`,
//!    `SMATCH_L50_STEPS`, `SMATCH_RATIO_STEPS`, `SMATCH_Q_STEPS`), with a
//!    `.env` file in the working directory loaded first
//! 3. defaults

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{MatchError, Result};
use crate::fit::GridSearchOptimizer;
use crate::session::DEFAULT_TOLERANCE;

pub const DEFAULT_SESSION_DIR: &str = ".smatch-session";

/// Values given on the command line; `None` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub session_dir: Option<PathBuf>,
    pub tolerance: Option<f64>,
    pub l50_steps: Option<usize>,
    pub ratio_steps: Option<usize>,
    pub catchability_steps: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub session_dir: PathBuf,
    /// Relative tolerance of the biomass consistency check.
    pub tolerance: f64,
    pub optimizer: GridSearchOptimizer,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            tolerance: DEFAULT_TOLERANCE,
            optimizer: GridSearchOptimizer::default(),
        }
    }
}

impl SessionConfig {
    /// Resolve against the process environment (after loading `.env`).
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve(overrides: ConfigOverrides, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SessionConfig::default();

        let session_dir = overrides
            .session_dir
            .or_else(|| env("SMATCH_SESSION_DIR").filter(|s| !s.trim().is_empty()).map(PathBuf::from))
            .unwrap_or(defaults.session_dir);
        let tolerance = pick(overrides.tolerance, &env, "SMATCH_TOLERANCE", defaults.tolerance)?;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(MatchError::validation(format!(
                "tolerance must be finite and > 0 (got {tolerance})"
            )));
        }

        let optimizer = GridSearchOptimizer {
            l50_steps: pick(overrides.l50_steps, &env, "SMATCH_L50_STEPS", defaults.optimizer.l50_steps)?,
            ratio_steps: pick(
                overrides.ratio_steps,
                &env,
                "SMATCH_RATIO_STEPS",
                defaults.optimizer.ratio_steps,
            )?,
            catchability_steps: pick(
                overrides.catchability_steps,
                &env,
                "SMATCH_Q_STEPS",
                defaults.optimizer.catchability_steps,
            )?,
            ..defaults.optimizer
        };
        optimizer.validate()?;

        Ok(Self {
            session_dir,
            tolerance,
            optimizer,
        })
    }
}

fn pick<T: FromStr>(
    flag: Option<T>,
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    if let Some(value) = flag {
        return Ok(value);
    }
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| MatchError::validation(format!("{key}: cannot parse '{raw}'"))),
        _ => Ok(default),
    }
}
