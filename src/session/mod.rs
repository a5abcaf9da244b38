//! Calibration sessions.
//!
//! - `log`: persisted snapshot history with undo/redo
//! - `pipeline`: staged matching with the biomass consistency check
//!
//! [`Session`] ties the two together as a command/event object: the host
//! sends [`SessionCommand`]s through [`Session::execute`] and listens for
//! [`SessionEvent`]s on channels from [`Session::subscribe`]. The aligner and
//! the pipeline stay pure functions over values.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use tracing::debug;

use crate::domain::{MatchRequest, ModelSnapshot};
use crate::error::{MatchError, Result};

pub mod log;
pub mod pipeline;

pub use log::*;
pub use pipeline::*;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    RequestMatch(MatchRequest),
    Undo,
    Redo,
    RewindToStart,
    DownloadCurrent,
    /// Delete the session's log.
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { entries: usize, cursor: usize },
    Matched { report: Box<PipelineReport>, cursor: usize },
    MatchFailed(StageFailure),
    Moved { cursor: usize, entries: usize },
    NothingToUndo,
    NothingToRedo,
    Current(Box<ModelSnapshot>),
    Ended,
}

pub struct Session {
    log: Option<SnapshotLog>,
    pipeline: MatchPipeline,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Session {
    /// Open the log in `dir` and initialize it with `initial` unless history
    /// already exists there.
    pub fn start(dir: impl Into<PathBuf>, initial: &ModelSnapshot, pipeline: MatchPipeline) -> Result<Self> {
        initial.validate()?;
        let mut log = SnapshotLog::open(dir)?;
        log.initialize(initial)?;
        Ok(Self {
            log: Some(log),
            pipeline,
            subscribers: Vec::new(),
        })
    }

    /// Reattach to an existing session; an empty directory is an error.
    pub fn resume(dir: impl Into<PathBuf>, pipeline: MatchPipeline) -> Result<Self> {
        let log = SnapshotLog::open(dir)?;
        if log.is_empty() {
            return Err(MatchError::validation(format!(
                "no session in '{}'; start one with `smatch new`",
                log.dir().display()
            )));
        }
        log.current()?;
        Ok(Self {
            log: Some(log),
            pipeline,
            subscribers: Vec::new(),
        })
    }

    /// A new event stream; dropped receivers are pruned on the next event.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// `None` once the session has ended.
    pub fn log(&self) -> Option<&SnapshotLog> {
        self.log.as_ref()
    }

    pub fn started_event(&self) -> Result<SessionEvent> {
        let log = self.live_log()?;
        Ok(SessionEvent::Started {
            entries: log.len(),
            cursor: log.cursor(),
        })
    }

    pub fn execute(&mut self, command: SessionCommand) -> Result<SessionEvent> {
        debug!(?command, "session command");
        let event = match command {
            SessionCommand::RequestMatch(request) => {
                let log = self.log.as_mut().ok_or_else(ended)?;
                match self.pipeline.run_and_commit(log, &request) {
                    Ok(report) => SessionEvent::Matched {
                        report: Box::new(report),
                        cursor: log.cursor(),
                    },
                    Err(failure) => SessionEvent::MatchFailed(failure),
                }
            }
            SessionCommand::Undo => {
                let log = self.log.as_mut().ok_or_else(ended)?;
                match log.undo()? {
                    LogStep::Moved(_) => moved(log),
                    LogStep::NothingToUndo => SessionEvent::NothingToUndo,
                    LogStep::NothingToRedo => SessionEvent::NothingToRedo,
                }
            }
            SessionCommand::Redo => {
                let log = self.log.as_mut().ok_or_else(ended)?;
                match log.redo()? {
                    LogStep::Moved(_) => moved(log),
                    LogStep::NothingToUndo => SessionEvent::NothingToUndo,
                    LogStep::NothingToRedo => SessionEvent::NothingToRedo,
                }
            }
            SessionCommand::RewindToStart => {
                let log = self.log.as_mut().ok_or_else(ended)?;
                log.rewind_to_start()?;
                moved(log)
            }
            SessionCommand::DownloadCurrent => {
                let log = self.live_log()?;
                SessionEvent::Current(Box::new(log.current()?))
            }
            SessionCommand::End => {
                let log = self.log.take().ok_or_else(ended)?;
                log.close()?;
                SessionEvent::Ended
            }
        };
        self.broadcast(&event);
        Ok(event)
    }

    fn live_log(&self) -> Result<&SnapshotLog> {
        self.log.as_ref().ok_or_else(ended)
    }

    fn broadcast(&mut self, event: &SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn moved(log: &SnapshotLog) -> SessionEvent {
    SessionEvent::Moved {
        cursor: log.cursor(),
        entries: log.len(),
    }
}

fn ended() -> MatchError {
    MatchError::validation("session has ended")
}
