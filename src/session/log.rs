//! Disk-persisted snapshot history with an undo/redo cursor.
//!
//! Layout of a session directory:
//!
//! - `snapshot-{seq:06}-{YYYYMMDDTHHMMSS}.json`: one artifact per entry,
//!   holding its sequence number, UTC creation time and the snapshot
//! - `cursor.json`: sequence number of the current entry
//!
//! Entries are ordered by sequence number. Every file is written to a
//! temporary name and renamed into place, so readers never see a partial
//! artifact. A missing or stale cursor file recovers to the last entry.
//!
//! One live log per directory; nothing here guards against a second process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::ModelSnapshot;
use crate::error::{MatchError, Result};

const ARTIFACT_PREFIX: &str = "snapshot-";
const ARTIFACT_SUFFIX: &str = ".json";
const CURSOR_FILE: &str = "cursor.json";

/// One persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub path: PathBuf,
}

/// Whether anything has been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Empty,
    Active,
}

/// Result of a cursor move.
#[derive(Debug, Clone, PartialEq)]
pub enum LogStep {
    Moved(ModelSnapshot),
    NothingToUndo,
    NothingToRedo,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    seq: u64,
    created_at: DateTime<Utc>,
    snapshot: ModelSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    seq: u64,
}

#[derive(Debug)]
pub struct SnapshotLog {
    dir: PathBuf,
    entries: Vec<LogEntry>,
    /// 1-based position of the current entry; 0 iff `entries` is empty.
    cursor: usize,
    next_seq: u64,
}

impl SnapshotLog {
    /// Scan `dir` for persisted entries. A missing directory is an empty log;
    /// it is created by the first commit.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => Some(listing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in listing.into_iter().flatten() {
            let path = item?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !(name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_SUFFIX)) {
                continue;
            }
            let seq = parse_seq(name).ok_or_else(|| MatchError::CorruptLog {
                path: path.clone(),
                message: "artifact name has no sequence number".into(),
            })?;
            entries.push(LogEntry { seq, path });
        }
        entries.sort_by_key(|e| e.seq);
        if let Some(pair) = entries.windows(2).find(|p| p[0].seq == p[1].seq) {
            return Err(MatchError::CorruptLog {
                path: pair[1].path.clone(),
                message: format!("duplicate sequence number {}", pair[1].seq),
            });
        }

        let next_seq = entries.last().map_or(1, |e| e.seq + 1);
        let mut log = Self {
            dir,
            entries,
            cursor: 0,
            next_seq,
        };
        log.cursor = log.recover_cursor();
        debug!(dir = %log.dir.display(), entries = log.entries.len(), cursor = log.cursor, "log opened");
        Ok(log)
    }

    /// Recover the persisted history, or persist `current` as its first entry.
    ///
    /// Returns the snapshot the session should continue from.
    pub fn initialize(&mut self, current: &ModelSnapshot) -> Result<ModelSnapshot> {
        if self.entries.is_empty() {
            self.commit(current)?;
            info!(dir = %self.dir.display(), "session started");
            return Ok(current.with_changed(false));
        }
        info!(
            dir = %self.dir.display(),
            entries = self.entries.len(),
            cursor = self.cursor,
            "session recovered"
        );
        self.current()
    }

    /// Persist `snapshot` right after the cursor and move onto it.
    ///
    /// Entries after the cursor are dropped once the new artifact is on disk;
    /// a failed write leaves the log as it was.
    pub fn commit(&mut self, snapshot: &ModelSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let seq = self.next_seq;
        let created_at = Utc::now();
        let path = self.dir.join(artifact_name(seq, created_at));
        let artifact = Artifact {
            seq,
            created_at,
            snapshot: snapshot.with_changed(false),
        };
        write_atomic(&path, &artifact)?;

        let forward: Vec<LogEntry> = self.entries.drain(self.cursor..).collect();
        self.entries.push(LogEntry { seq, path });
        self.next_seq = seq + 1;
        self.cursor = self.entries.len();
        self.persist_cursor()?;

        for entry in forward {
            match remove_if_present(&entry.path) {
                Ok(()) => debug!(seq = entry.seq, "discarded forward entry"),
                Err(err) => warn!(seq = entry.seq, %err, "could not delete forward entry"),
            }
        }
        info!(seq, entries = self.entries.len(), "snapshot committed");
        Ok(())
    }

    pub fn undo(&mut self) -> Result<LogStep> {
        if self.cursor <= 1 {
            return Ok(LogStep::NothingToUndo);
        }
        self.move_to(self.cursor - 1).map(LogStep::Moved)
    }

    pub fn redo(&mut self) -> Result<LogStep> {
        if self.cursor >= self.entries.len() {
            return Ok(LogStep::NothingToRedo);
        }
        self.move_to(self.cursor + 1).map(LogStep::Moved)
    }

    pub fn rewind_to_start(&mut self) -> Result<ModelSnapshot> {
        if self.entries.is_empty() {
            return Err(empty_log());
        }
        self.move_to(1)
    }

    /// Read the snapshot at the cursor from disk.
    pub fn current(&self) -> Result<ModelSnapshot> {
        let entry = self.cursor.checked_sub(1).and_then(|i| self.entries.get(i));
        match entry {
            Some(entry) => read_artifact(entry),
            None => Err(empty_log()),
        }
    }

    /// Delete every artifact of this session.
    pub fn close(self) -> Result<()> {
        for entry in &self.entries {
            remove_if_present(&entry.path)?;
        }
        remove_if_present(&self.dir.join(CURSOR_FILE))?;
        // Leave the directory alone if anything else lives there.
        if fs::remove_dir(&self.dir).is_err() {
            debug!(dir = %self.dir.display(), "session directory kept");
        }
        info!(entries = self.entries.len(), "session closed");
        Ok(())
    }

    pub fn state(&self) -> LogState {
        if self.entries.is_empty() {
            LogState::Empty
        } else {
            LogState::Active
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based cursor; 0 when empty.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn move_to(&mut self, cursor: usize) -> Result<ModelSnapshot> {
        let snapshot = read_artifact(&self.entries[cursor - 1])?;
        self.cursor = cursor;
        self.persist_cursor()?;
        debug!(cursor, "cursor moved");
        Ok(snapshot)
    }

    fn persist_cursor(&self) -> Result<()> {
        let Some(entry) = self.cursor.checked_sub(1).and_then(|i| self.entries.get(i)) else {
            return Ok(());
        };
        write_atomic(&self.dir.join(CURSOR_FILE), &CursorFile { seq: entry.seq })
    }

    fn recover_cursor(&self) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        let last = self.entries.len();
        let path = self.dir.join(CURSOR_FILE);
        let stored = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<CursorFile>(&text).ok(),
            Err(_) => None,
        };
        match stored.and_then(|c| self.entries.iter().position(|e| e.seq == c.seq)) {
            Some(idx) => idx + 1,
            None => {
                warn!(path = %path.display(), "cursor missing or stale, using last entry");
                last
            }
        }
    }
}

fn empty_log() -> MatchError {
    MatchError::validation("session log is empty; start a session first")
}

fn artifact_name(seq: u64, created_at: DateTime<Utc>) -> String {
    format!(
        "{ARTIFACT_PREFIX}{seq:06}-{}{ARTIFACT_SUFFIX}",
        created_at.format("%Y%m%dT%H%M%S")
    )
}

/// `snapshot-000042-20250101T120000.json` -> 42
fn parse_seq(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(ARTIFACT_PREFIX)?;
    let digits = rest.split('-').next()?;
    digits.parse().ok()
}

fn read_artifact(entry: &LogEntry) -> Result<ModelSnapshot> {
    let corrupt = |message: String| MatchError::CorruptLog {
        path: entry.path.clone(),
        message,
    };
    let text = fs::read_to_string(&entry.path).map_err(|e| corrupt(e.to_string()))?;
    let artifact: Artifact = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
    if artifact.seq != entry.seq {
        return Err(corrupt(format!(
            "artifact holds sequence {} but is named {}",
            artifact.seq, entry.seq
        )));
    }
    artifact
        .snapshot
        .validate()
        .map_err(|e| corrupt(e.to_string()))?;
    Ok(artifact.snapshot)
}

/// Write `value` as JSON to a temporary sibling, then rename over `path`.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| MatchError::Internal(format!("failed to encode {}: {e}", path.display())))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
