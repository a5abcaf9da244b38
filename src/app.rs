//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main:
//! - parses CLI arguments and resolves configuration
//! - installs the tracing subscriber
//! - opens the session and runs one command
//! - prints reports and writes exports

use std::sync::Arc;

use clap::Parser;
use tracing::warn;

use crate::align::align_observations;
use crate::cli::{Cli, Command, InspectArgs, MatchArgs};
use crate::config::SessionConfig;
use crate::domain::{MatchRequest, ModelSnapshot, ObservationRow, PenaltyWeights, Stage};
use crate::error::AppError;
use crate::io::{
    load_observations, read_model_json, write_bins_csv, write_edges_csv, write_model_json,
    write_objective_json,
};
use crate::objective::{build_objective_data, ObjectiveOutcome};
use crate::session::{MatchPipeline, Session, SessionCommand, SessionEvent, SnapshotLog};
use crate::stages::standard_stages;

/// Exit code for "nothing to do" outcomes (no data, boundary of the log).
const EXIT_NOTHING_TO_DO: u8 = 3;

/// Entry point for the `smatch` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    if let Err(err) = crate::telemetry::init_tracing(cli.verbose) {
        eprintln!("warning: {err}");
    }
    let config = SessionConfig::from_env(cli.overrides())?;

    match cli.command {
        Command::New(args) => {
            let initial = read_model_json(&args.model)?;
            let session = Session::start(&config.session_dir, &initial, pipeline(&config, Vec::new()))?;
            print_event(&session.started_event()?)
        }
        Command::Match(args) => handle_match(&config, args),
        Command::Undo => simple_command(&config, SessionCommand::Undo),
        Command::Redo => simple_command(&config, SessionCommand::Redo),
        Command::Rewind => simple_command(&config, SessionCommand::RewindToStart),
        Command::Download(args) => {
            let mut session = Session::resume(&config.session_dir, pipeline(&config, Vec::new()))?;
            if let SessionEvent::Current(snapshot) = session.execute(SessionCommand::DownloadCurrent)? {
                write_model_json(&args.out, &snapshot)?;
                println!("Wrote {}", args.out.display());
            }
            Ok(())
        }
        Command::End => simple_command(&config, SessionCommand::End),
        Command::Status => {
            let log = SnapshotLog::open(&config.session_dir)?;
            let snapshot = log.current()?;
            print!("{}", crate::report::format_status(&log, &snapshot));
            Ok(())
        }
        Command::Align(args) => handle_align(&config, args),
        Command::Objective(args) => handle_objective(&config, args),
    }
}

fn pipeline(config: &SessionConfig, rows: Vec<ObservationRow>) -> MatchPipeline {
    MatchPipeline::new(standard_stages(rows, Arc::new(config.optimizer.clone())))
        .with_tolerance(config.tolerance)
}

fn simple_command(config: &SessionConfig, command: SessionCommand) -> Result<(), AppError> {
    let mut session = Session::resume(&config.session_dir, pipeline(config, Vec::new()))?;
    let event = session.execute(command)?;
    print_event(&event)
}

fn handle_match(config: &SessionConfig, args: MatchArgs) -> Result<(), AppError> {
    let rows = match &args.observations {
        Some(path) => load_observations(path)?.for_species(&args.species),
        None => Vec::new(),
    };
    let stages: Vec<Stage> = if args.stages.is_empty() {
        Stage::CANONICAL.to_vec()
    } else {
        args.stages
    };
    let request = MatchRequest::new(args.species, stages).with_penalties(PenaltyWeights {
        yield_lambda: args.yield_lambda,
        production_lambda: args.production_lambda,
    });

    let mut session = Session::resume(&config.session_dir, pipeline(config, rows))?;
    let event = session.execute(SessionCommand::RequestMatch(request))?;
    print_event(&event)
}

fn print_event(event: &SessionEvent) -> Result<(), AppError> {
    match event {
        SessionEvent::Started { entries, cursor } => {
            println!("Session ready: {entries} snapshot(s), cursor at {cursor}.");
        }
        SessionEvent::Matched { report, cursor } => {
            print!("{}", crate::report::format_pipeline_report(report));
            if report.applied() == 0 {
                return Err(AppError::new(EXIT_NOTHING_TO_DO, "No stage applied; nothing committed."));
            }
            println!("Committed; cursor at {cursor}.");
        }
        SessionEvent::MatchFailed(failure) => {
            print!("{}", crate::report::format_failure(failure));
            return Err(AppError::new(failure.exit_code, failure.to_string()));
        }
        SessionEvent::Moved { cursor, entries } => {
            println!("Cursor at {cursor} of {entries}.");
        }
        SessionEvent::NothingToUndo => {
            return Err(AppError::new(EXIT_NOTHING_TO_DO, "Nothing to undo."));
        }
        SessionEvent::NothingToRedo => {
            return Err(AppError::new(EXIT_NOTHING_TO_DO, "Nothing to redo."));
        }
        SessionEvent::Current(_) => {}
        SessionEvent::Ended => println!("Session ended; snapshots deleted."),
    }
    Ok(())
}

/// The snapshot to inspect: `--model` if given, else the session's current one.
fn inspected_snapshot(config: &SessionConfig, args: &InspectArgs) -> Result<ModelSnapshot, AppError> {
    match &args.model {
        Some(path) => Ok(read_model_json(path)?),
        None => Ok(SnapshotLog::open(&config.session_dir)?.current()?),
    }
}

fn inspected_rows(args: &InspectArgs) -> Result<Vec<ObservationRow>, AppError> {
    match &args.observations {
        Some(path) => Ok(load_observations(path)?.for_species(&args.species)),
        None => Ok(Vec::new()),
    }
}

fn handle_align(config: &SessionConfig, args: InspectArgs) -> Result<(), AppError> {
    let snapshot = inspected_snapshot(config, &args)?;
    let idx = snapshot.species_index(&args.species)?;
    let rows = inspected_rows(&args)?;
    let aligned = align_observations(&snapshot.species[idx].params, &snapshot.grid, &rows)?;

    print!("{}", crate::report::format_alignment(&args.species, &aligned));
    if let Some(path) = &args.export {
        write_bins_csv(path, &aligned)?;
    }
    if let Some(path) = &args.export_edges {
        write_edges_csv(path, &aligned)?;
    }
    Ok(())
}

fn handle_objective(config: &SessionConfig, args: InspectArgs) -> Result<(), AppError> {
    let snapshot = inspected_snapshot(config, &args)?;
    let idx = snapshot.species_index(&args.species)?;
    let rows = inspected_rows(&args)?;
    let aligned = align_observations(&snapshot.species[idx].params, &snapshot.grid, &rows)?;
    let penalties = PenaltyWeights {
        yield_lambda: args.yield_lambda,
        production_lambda: args.production_lambda,
    };
    if args.export_edges.is_some() {
        warn!("--export-edges is only used by `align`");
    }

    match build_objective_data(&snapshot, idx, &aligned, &penalties)? {
        ObjectiveOutcome::Ready(data) => {
            print!("{}", crate::report::format_objective(&data));
            if let Some(path) = &args.export {
                write_objective_json(path, &data)?;
            }
            Ok(())
        }
        ObjectiveOutcome::NoData { species } => Err(AppError::new(
            EXIT_NOTHING_TO_DO,
            format!("No counts and no production target for '{species}'; nothing to fit."),
        )),
    }
}
