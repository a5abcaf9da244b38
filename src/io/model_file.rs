//! Model parameter files.
//!
//! A model file is JSON holding either a full [`ModelSnapshot`] (as written by
//! `smatch download`) or a [`ModelSetup`] from which a steady state is built.

use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domain::ModelSnapshot;
use crate::error::{MatchError, Result};
use crate::model::ModelSetup;

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelFile {
    Snapshot(ModelSnapshot),
    Setup(ModelSetup),
}

pub fn read_model_json(path: &Path) -> Result<ModelSnapshot> {
    let file = File::open(path).map_err(|e| {
        MatchError::validation(format!("failed to open model file '{}': {e}", path.display()))
    })?;
    let parsed: ModelFile = serde_json::from_reader(file).map_err(|e| {
        MatchError::validation(format!(
            "'{}' is neither a model snapshot nor a model setup: {e}",
            path.display()
        ))
    })?;

    let snapshot = match parsed {
        ModelFile::Snapshot(snapshot) => {
            snapshot.validate()?;
            snapshot
        }
        ModelFile::Setup(setup) => {
            info!(path = %path.display(), species = setup.species.len(), "computing initial steady state");
            setup.into_snapshot()?
        }
    };
    Ok(snapshot.with_changed(false))
}

pub fn write_model_json(path: &Path, snapshot: &ModelSnapshot) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        MatchError::validation(format!("failed to create model file '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, snapshot)
        .map_err(|e| MatchError::Internal(format!("failed to write model JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cod_setup, cod_snapshot};
    use tempfile::TempDir;

    #[test]
    fn setup_files_are_settled_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("setup.json");
        std::fs::write(&path, serde_json::to_string(&cod_setup()).unwrap()).unwrap();
        assert_eq!(read_model_json(&path).unwrap(), cod_snapshot());
    }

    #[test]
    fn written_snapshots_read_back_identically() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        let snapshot = cod_snapshot();
        write_model_json(&path, &snapshot).unwrap();
        assert_eq!(read_model_json(&path).unwrap(), snapshot);
    }

    #[test]
    fn garbage_is_a_validation_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        std::fs::write(&path, r#"{"species": 3}"#).unwrap();
        let err = read_model_json(&path).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }
}
