//! Error types.
//!
//! Two layers:
//!
//! - [`MatchError`]: typed failures raised by the aligner, the model, the
//!   stages and the snapshot log. Library callers match on these.
//! - [`AppError`]: what the `smatch` binary prints, carrying a process exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Stage;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Bad input: missing columns, mixed gears, overlapping bins, bad parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// The biomass invariant failed after a stage. Always a defect in the stage.
    #[error("consistency fault after {stage} stage: {message}")]
    Consistency { stage: Stage, message: String },

    #[error("corrupt snapshot log at '{}': {message}", path.display())]
    CorruptLog { path: PathBuf, message: String },

    #[error("optimizer failed: {0}")]
    Optimizer(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        MatchError::Validation(message.into())
    }

    /// Short machine-readable label, used in stage failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Validation(_) => "validation",
            MatchError::Consistency { .. } => "consistency",
            MatchError::CorruptLog { .. } => "corrupt-log",
            MatchError::Optimizer(_) => "optimizer",
            MatchError::Internal(_) => "internal",
            MatchError::Io(_) => "io",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            MatchError::Validation(_) => 2,
            MatchError::Optimizer(_) | MatchError::Io(_) => 4,
            MatchError::Consistency { .. } => 5,
            MatchError::CorruptLog { .. } => 6,
            MatchError::Internal(_) => 70,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_errors_map_to_distinct_exit_codes() {
        let v: AppError = MatchError::validation("bad").into();
        assert_eq!(v.exit_code(), 2);
        assert!(v.to_string().contains("bad"));

        let c: AppError = MatchError::Consistency {
            stage: Stage::Yield,
            message: "drift".into(),
        }
        .into();
        assert_eq!(c.exit_code(), 5);
        assert!(c.to_string().contains("yield"));
    }
}
