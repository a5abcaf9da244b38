//! Parameter-matching stages.
//!
//! Each stage moves some parameters of one species towards an observation,
//! then re-settles that species: steady state refreshed, abundance rescaled
//! to the observed biomass. Stages never touch the snapshot they are given.
//!
//! - `growth`: maturation age
//! - `catch`: gear selectivity and catchability from catch-at-length
//! - `fishery_yield`: catchability from the observed yield
//! - `consumption`: intake rate from the observed consumption

use std::sync::Arc;

use tracing::debug;

use crate::domain::{MatchRequest, ModelSnapshot, ObservationRow, SpeciesState, Stage, WeightGrid};
use crate::error::{MatchError, Result};
use crate::fit::Optimizer;
use crate::model::{match_biomass_state, refresh_steady_state};

pub mod catch;
pub mod consumption;
pub mod fishery_yield;
pub mod growth;

pub use catch::CatchStage;
pub use consumption::ConsumptionStage;
pub use fishery_yield::YieldStage;
pub use growth::GrowthStage;

/// Upper bound on fixed-point rescaling iterations.
pub const MAX_RESCALE_ITERATIONS: usize = 50;
/// Relative gap between model and target at which rescaling stops.
pub const RESCALE_TOLERANCE: f64 = 1e-8;

/// Result of applying one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Applied(ModelSnapshot),
    /// Nothing to match against; the working copy is unchanged.
    Skipped { reason: String },
}

pub trait MatchStage: Send + Sync {
    fn stage(&self) -> Stage;

    /// Apply to species `idx` of `snapshot`, returning a new working copy.
    fn apply(
        &self,
        snapshot: &ModelSnapshot,
        idx: usize,
        request: &MatchRequest,
    ) -> Result<StageOutcome>;
}

/// The four stages in canonical order.
pub fn standard_stages(
    rows: Vec<ObservationRow>,
    optimizer: Arc<dyn Optimizer>,
) -> Vec<Box<dyn MatchStage>> {
    vec![
        Box::new(GrowthStage),
        Box::new(CatchStage::new(rows, optimizer)),
        Box::new(YieldStage),
        Box::new(ConsumptionStage),
    ]
}

pub(crate) fn species(snapshot: &ModelSnapshot, idx: usize) -> Result<&SpeciesState> {
    snapshot
        .species
        .get(idx)
        .ok_or_else(|| MatchError::Internal(format!("species index {idx} out of range")))
}

/// Steady state, then biomass match.
pub(crate) fn settle_state(state: &SpeciesState, grid: &WeightGrid) -> Result<SpeciesState> {
    let steady = refresh_steady_state(state, grid)?;
    match_biomass_state(&steady, grid)
}

pub(crate) fn settle(snapshot: &ModelSnapshot, idx: usize, state: SpeciesState) -> Result<ModelSnapshot> {
    let settled = settle_state(&state, &snapshot.grid)?;
    Ok(snapshot.with_species(idx, settled))
}

/// Rescale until the measured quantity matches `target`.
///
/// `adjust(state, factor)` multiplies the controlling parameter by `factor`.
/// Steps are secant steps in log space: the elasticity of the quantity with
/// respect to the parameter is estimated from the last two iterates (1 on the
/// first step, clamped to `[0.1, 10]`).
pub(crate) fn rescale_to_target(
    quantity: &str,
    state: &SpeciesState,
    grid: &WeightGrid,
    target: f64,
    measure: impl Fn(&SpeciesState, &WeightGrid) -> f64,
    adjust: impl Fn(&mut SpeciesState, f64) -> Result<()>,
) -> Result<SpeciesState> {
    let ln_target = target.ln();
    let mut current = settle_state(state, grid)?;
    let mut x = 0.0;
    let mut previous: Option<(f64, f64)> = None;

    for iteration in 0..MAX_RESCALE_ITERATIONS {
        let value = measure(&current, grid);
        if !(value.is_finite() && value > 0.0) {
            return Err(MatchError::validation(format!(
                "species '{}': model {quantity} is {value}, cannot rescale",
                current.params.name
            )));
        }
        if (target / value - 1.0).abs() <= RESCALE_TOLERANCE {
            debug!(species = %current.params.name, quantity, iteration, "rescale converged");
            return Ok(current);
        }

        let ln_value = value.ln();
        let elasticity = match previous {
            Some((px, pv)) if x != px => ((ln_value - pv) / (x - px)).clamp(0.1, 10.0),
            _ => 1.0,
        };
        let step = (ln_target - ln_value) / elasticity;
        previous = Some((x, ln_value));
        x += step;

        let mut next = current.clone();
        adjust(&mut next, step.exp())?;
        current = settle_state(&next, grid)?;
    }
    Err(MatchError::Optimizer(format!(
        "species '{}': {quantity} did not converge within {MAX_RESCALE_ITERATIONS} iterations",
        current.params.name
    )))
}

fn positive_target(target: Option<f64>) -> Option<f64> {
    target.filter(|v| v.is_finite() && *v > 0.0)
}
