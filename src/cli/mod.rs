//! Command-line parsing for `smatch`.
//!
//! Parsing only; dispatch lives in `app`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::domain::Stage;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "smatch", version, about = "Size-spectrum model calibration sessions")]
pub struct Cli {
    /// More log output (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Session directory (default: $SMATCH_SESSION_DIR or .smatch-session).
    #[arg(long, global = true, value_name = "DIR")]
    pub session_dir: Option<PathBuf>,

    /// Relative tolerance of the biomass consistency check.
    #[arg(long, global = true)]
    pub tolerance: Option<f64>,

    /// Grid-search steps for l50.
    #[arg(long, global = true)]
    pub l50_steps: Option<usize>,

    /// Grid-search steps for the l25/l50 ratio.
    #[arg(long, global = true)]
    pub ratio_steps: Option<usize>,

    /// Grid-search steps for catchability.
    #[arg(long, global = true)]
    pub q_steps: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            session_dir: self.session_dir.clone(),
            tolerance: self.tolerance,
            l50_steps: self.l50_steps,
            ratio_steps: self.ratio_steps,
            catchability_steps: self.q_steps,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a session from a model file (snapshot or setup JSON).
    New(NewArgs),
    /// Run matching stages on the current snapshot and commit the result.
    Match(MatchArgs),
    /// Step back one snapshot.
    Undo,
    /// Step forward one snapshot.
    Redo,
    /// Go back to the first snapshot.
    Rewind,
    /// Write the current snapshot to a JSON file.
    Download(DownloadArgs),
    /// End the session and delete its snapshots.
    End,
    /// Show the log position and per-species summaries.
    Status,
    /// Show how observations align onto the weight grid.
    Align(InspectArgs),
    /// Show (and optionally export) the optimizer payload.
    Objective(InspectArgs),
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Model JSON: a snapshot or a setup (grid + species + gear).
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    #[arg(long)]
    pub species: String,

    /// Stages to run (repeatable or comma-separated); all when omitted.
    #[arg(long = "stage", value_enum, value_delimiter = ',')]
    pub stages: Vec<Stage>,

    /// Catch-at-length CSV used by the catch stage.
    #[arg(long, value_name = "CSV")]
    pub observations: Option<PathBuf>,

    #[arg(long, default_value_t = 1.0)]
    pub yield_lambda: f64,

    #[arg(long, default_value_t = 1.0)]
    pub production_lambda: f64,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[arg(long)]
    pub species: String,

    /// Catch-at-length CSV.
    #[arg(long, value_name = "CSV")]
    pub observations: Option<PathBuf>,

    /// Use this model file instead of the session's current snapshot.
    #[arg(long, value_name = "JSON")]
    pub model: Option<PathBuf>,

    #[arg(long, default_value_t = 1.0)]
    pub yield_lambda: f64,

    #[arg(long, default_value_t = 1.0)]
    pub production_lambda: f64,

    /// Export atomic bins (align) or the objective record (objective).
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Export interpolation edges as CSV (align only).
    #[arg(long, value_name = "CSV")]
    pub export_edges: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_accept_commas_and_repeats() {
        let cli = Cli::parse_from([
            "smatch", "match", "--species", "cod", "--stage", "yield,growth", "--stage", "catch",
        ]);
        let Command::Match(args) = cli.command else {
            panic!("match subcommand");
        };
        assert_eq!(args.stages, vec![Stage::Yield, Stage::Growth, Stage::Catch]);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["smatch", "status", "--session-dir", "/tmp/s", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides().session_dir, Some(PathBuf::from("/tmp/s")));
    }
}
