//! Staged parameter matching with a biomass-consistency check.
//!
//! The requested stages run in canonical order on working copies. After each
//! applied stage the working copy is compared with an independent biomass
//! match of itself: the target species' cutoff biomass must agree within the
//! relative tolerance. Anything failing aborts the run; only a fully
//! successful run reaches the log.

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{MatchRequest, ModelSnapshot, Stage};
use crate::error::MatchError;
use crate::model::{cutoff_biomass, match_biomass};
use crate::session::log::SnapshotLog;
use crate::stages::{MatchStage, StageOutcome};

pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    /// `None` when the run failed before any stage (unknown species, log errors).
    pub stage: Option<Stage>,
    /// [`MatchError::kind`] of the underlying error.
    pub kind: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl StageFailure {
    pub fn new(stage: Option<Stage>, err: &MatchError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
            exit_code: err.exit_code(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{stage} stage failed ({}): {}", self.kind, self.message),
            None => write!(f, "match failed ({}): {}", self.kind, self.message),
        }
    }
}

/// What happened to one requested stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub applied: bool,
    /// Skip reason, or empty.
    pub note: String,
    /// Target species' cutoff biomass after the stage.
    pub biomass: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub species: String,
    pub records: Vec<StageRecord>,
    pub snapshot: ModelSnapshot,
}

impl PipelineReport {
    pub fn applied(&self) -> usize {
        self.records.iter().filter(|r| r.applied).count()
    }
}

pub struct MatchPipeline {
    stages: Vec<Box<dyn MatchStage>>,
    tolerance: f64,
}

impl MatchPipeline {
    pub fn new(stages: Vec<Box<dyn MatchStage>>) -> Self {
        Self {
            stages,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Run the requested stages on a copy of `current`.
    pub fn run(
        &self,
        current: &ModelSnapshot,
        request: &MatchRequest,
    ) -> Result<PipelineReport, StageFailure> {
        let idx = current
            .species_index(&request.species)
            .map_err(|e| StageFailure::new(None, &e))?;

        let mut working = current.clone();
        let mut records = Vec::new();
        for stage in request.ordered_stages() {
            let runner = self
                .stages
                .iter()
                .find(|s| s.stage() == stage)
                .ok_or_else(|| {
                    let err = MatchError::Internal(format!("no implementation for the {stage} stage"));
                    StageFailure::new(Some(stage), &err)
                })?;

            let outcome = runner
                .apply(&working, idx, request)
                .map_err(|e| StageFailure::new(Some(stage), &e))?;
            match outcome {
                StageOutcome::Applied(next) => {
                    let biomass = self
                        .check_consistency(stage, &next, idx)
                        .map_err(|e| StageFailure::new(Some(stage), &e))?;
                    info!(species = %request.species, %stage, biomass, "stage applied");
                    records.push(StageRecord {
                        stage,
                        applied: true,
                        note: String::new(),
                        biomass,
                    });
                    working = next;
                }
                StageOutcome::Skipped { reason } => {
                    warn!(species = %request.species, %stage, %reason, "stage skipped");
                    let state = &working.species[idx];
                    records.push(StageRecord {
                        stage,
                        applied: false,
                        note: reason,
                        biomass: cutoff_biomass(&state.params, &working.grid, &state.abundance),
                    });
                }
            }
        }

        Ok(PipelineReport {
            species: request.species.clone(),
            records,
            snapshot: working,
        })
    }

    /// Run on the log's current snapshot and commit the result.
    ///
    /// A run in which no stage applied commits nothing.
    pub fn run_and_commit(
        &self,
        log: &mut SnapshotLog,
        request: &MatchRequest,
    ) -> Result<PipelineReport, StageFailure> {
        let current = log.current().map_err(|e| StageFailure::new(None, &e))?;
        let report = self.run(&current, request)?;
        if report.applied() > 0 {
            log.commit(&report.snapshot)
                .map_err(|e| StageFailure::new(None, &e))?;
        }
        Ok(report)
    }

    fn check_consistency(&self, stage: Stage, working: &ModelSnapshot, idx: usize) -> Result<f64, MatchError> {
        let reference = match_biomass(working, idx)?;
        let state = &working.species[idx];
        let expected = &reference.species[idx];
        let got = cutoff_biomass(&state.params, &working.grid, &state.abundance);
        let want = cutoff_biomass(&expected.params, &reference.grid, &expected.abundance);

        let scale = got.abs().max(want.abs());
        if !(got.is_finite() && want.is_finite()) || (got - want).abs() > self.tolerance * scale {
            return Err(MatchError::Consistency {
                stage,
                message: format!(
                    "cutoff biomass {got} differs from the biomass-matched reference {want}"
                ),
            });
        }
        Ok(got)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SpeciesState;
    use crate::test_support::{cod_snapshot, COD};

    /// Doubles abundance without re-matching biomass.
    struct Sloppy;

    impl MatchStage for Sloppy {
        fn stage(&self) -> Stage {
            Stage::Yield
        }

        fn apply(&self, s: &ModelSnapshot, idx: usize, _r: &MatchRequest) -> crate::error::Result<StageOutcome> {
            let mut state: SpeciesState = s.species[idx].clone();
            state.abundance.iter_mut().for_each(|n| *n *= 2.0);
            Ok(StageOutcome::Applied(s.with_species(idx, state)))
        }
    }

    struct Faithful(Stage);

    impl MatchStage for Faithful {
        fn stage(&self) -> Stage {
            self.0
        }

        fn apply(&self, s: &ModelSnapshot, idx: usize, _r: &MatchRequest) -> crate::error::Result<StageOutcome> {
            let mut state = s.species[idx].clone();
            state.params.h *= 1.01;
            crate::stages::settle(s, idx, state).map(StageOutcome::Applied)
        }
    }

    #[test]
    fn consistency_fault_names_the_stage() {
        let pipeline = MatchPipeline::new(vec![Box::new(Faithful(Stage::Growth)), Box::new(Sloppy)]);
        let request = MatchRequest::new("cod", [Stage::Growth, Stage::Yield]);
        let failure = pipeline.run(&cod_snapshot(), &request).unwrap_err();
        assert_eq!(failure.stage, Some(Stage::Yield));
        assert_eq!(failure.kind, "consistency");
    }

    #[test]
    fn unrequested_stages_do_not_run() {
        let pipeline = MatchPipeline::new(vec![Box::new(Faithful(Stage::Growth)), Box::new(Sloppy)]);
        let request = MatchRequest::new("cod", [Stage::Growth]);
        let report = pipeline.run(&cod_snapshot(), &request).unwrap();
        assert_eq!(report.records.len(), 1);
        assert!(report.snapshot.changed);
    }

    #[test]
    fn unknown_species_is_a_validation_failure() {
        let pipeline = MatchPipeline::new(vec![Box::new(Faithful(Stage::Growth))]);
        let request = MatchRequest::new("hake", [Stage::Growth]);
        let failure = pipeline.run(&cod_snapshot(), &request).unwrap_err();
        assert_eq!(failure.stage, None);
        assert_eq!(failure.kind, "validation");
    }

    #[test]
    fn input_snapshot_is_untouched() {
        let snapshot = cod_snapshot();
        let before = snapshot.clone();
        let pipeline = MatchPipeline::new(vec![Box::new(Faithful(Stage::Growth))]);
        pipeline
            .run(&snapshot, &MatchRequest::new("cod", [Stage::Growth]))
            .unwrap();
        assert_eq!(snapshot, before);
        assert_eq!(snapshot.species[COD].params.h, 30.0);
    }
}
