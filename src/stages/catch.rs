//! Catch matching: fit gear selectivity and catchability to catch-at-length.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{MatchRequest, ModelSnapshot, ObservationRow, Selectivity, Stage};
use crate::error::Result;
use crate::fit::Optimizer;
use crate::objective::{prepare_objective, ObjectiveOutcome};
use crate::stages::{settle, species, MatchStage, StageOutcome};

pub struct CatchStage {
    rows: Vec<ObservationRow>,
    optimizer: Arc<dyn Optimizer>,
}

impl CatchStage {
    /// `rows` may cover several species; rows without a species column apply
    /// to whichever species is being matched.
    pub fn new(rows: Vec<ObservationRow>, optimizer: Arc<dyn Optimizer>) -> Self {
        Self { rows, optimizer }
    }

    fn rows_for(&self, species: &str) -> Vec<ObservationRow> {
        self.rows
            .iter()
            .filter(|r| r.species.as_deref().is_none_or(|s| s == species))
            .cloned()
            .collect()
    }
}

impl MatchStage for CatchStage {
    fn stage(&self) -> Stage {
        Stage::Catch
    }

    fn apply(&self, snapshot: &ModelSnapshot, idx: usize, request: &MatchRequest) -> Result<StageOutcome> {
        let state = species(snapshot, idx)?;
        let rows = self.rows_for(&state.params.name);
        debug!(species = %state.params.name, rows = rows.len(), "catch stage");

        let data = match prepare_objective(snapshot, idx, &rows, &request.penalties)? {
            ObjectiveOutcome::Ready(data) => data,
            ObjectiveOutcome::NoData { species } => {
                return Ok(StageOutcome::Skipped {
                    reason: format!("no catch counts or production target for '{species}'"),
                });
            }
        };

        let fit = self.optimizer.optimize(&data)?;
        info!(
            species = %state.params.name,
            l50 = fit.l50,
            l25 = fit.l25,
            catchability = fit.catchability,
            objective = fit.objective,
            "gear fitted"
        );

        let mut next = state.clone();
        next.gear.selectivity = Selectivity::SigmoidLength {
            l50: fit.l50,
            l25: fit.l25,
        };
        next.gear.catchability = fit.catchability;
        settle(snapshot, idx, next).map(StageOutcome::Applied)
    }
}
