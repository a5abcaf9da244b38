//! Optimizer payload assembly.
//!
//! [`ObjectiveData`] is the whole contract with the optimizer: everything it
//! needs to evaluate a candidate gear, restricted to the grid range the
//! aligner selected. It is serializable so it can be handed to an external
//! optimizer as JSON.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{align_observations, AlignedBins};
use crate::domain::{
    AtomicBin, InterpolationEdge, ModelSnapshot, ObservationRow, PenaltyWeights, Selectivity,
};
use crate::error::{MatchError, Result};
use crate::model::{cutoff_biomass, growth_rate, maturity_index, natural_mortality, species_range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveData {
    pub species: String,
    /// Allometric coefficients (`w = a * l^b`).
    pub a: f64,
    pub b: f64,

    pub bins: Vec<AtomicBin>,
    pub counts: Vec<f64>,
    pub edges: Vec<InterpolationEdge>,

    /// Restricted grid.
    pub w: Vec<f64>,
    pub dw: Vec<f64>,
    pub growth: Vec<f64>,
    pub natural_mortality: Vec<f64>,
    /// Indices of `w` inside the species' viable range.
    pub active: Range<usize>,
    /// Index into `w` just below the maturation weight.
    pub mat_idx: usize,

    pub w_cutoff: f64,
    /// Model biomass above `w_cutoff` on the full grid.
    pub biomass_cutoff: f64,

    pub yield_observed: f64,
    pub production_observed: f64,
    /// Zero when the yield target is absent or non-positive.
    pub yield_lambda: f64,
    /// Zero when the production target is absent or non-positive.
    pub production_lambda: f64,

    /// Current gear, the optimizer's starting point.
    pub selectivity: Selectivity,
    pub catchability: f64,
}

impl ObjectiveData {
    pub fn counts_enabled(&self) -> bool {
        self.counts.iter().any(|c| *c > 0.0)
    }

    /// Lengths of the first and last active grid points.
    pub fn active_length_range(&self) -> Option<(f64, f64)> {
        if self.active.is_empty() {
            return None;
        }
        let to_length = |w: f64| (w / self.a).powf(1.0 / self.b);
        Some((
            to_length(self.w[self.active.start]),
            to_length(self.w[self.active.end - 1]),
        ))
    }
}

/// Result of assembling the payload for one species.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveOutcome {
    Ready(Box<ObjectiveData>),
    /// No counts and no production target: the species must not be fitted.
    NoData { species: String },
}

fn positive(target: Option<f64>) -> Option<f64> {
    target.filter(|v| v.is_finite() && *v > 0.0)
}

/// Assemble the optimizer payload for species `idx` from its aligned bins.
pub fn build_objective_data(
    snapshot: &ModelSnapshot,
    idx: usize,
    aligned: &AlignedBins,
    penalties: &PenaltyWeights,
) -> Result<ObjectiveOutcome> {
    for (name, value) in [
        ("yield_lambda", penalties.yield_lambda),
        ("production_lambda", penalties.production_lambda),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(MatchError::validation(format!(
                "{name} must be finite and >= 0 (got {value})"
            )));
        }
    }

    let state = snapshot
        .species
        .get(idx)
        .ok_or_else(|| MatchError::Internal(format!("species index {idx} out of range")))?;
    let params = &state.params;

    let yield_target = positive(params.yield_observed);
    let production_target = positive(params.production_observed);
    let has_counts = aligned.bins.iter().any(|b| b.count > 0.0);

    if !has_counts && production_target.is_none() {
        debug!(species = %params.name, "no counts and no production target");
        return Ok(ObjectiveOutcome::NoData {
            species: params.name.clone(),
        });
    }

    let range = aligned.grid_range.clone();
    if range.end > snapshot.grid.len() || range.len() < 2 {
        return Err(MatchError::Internal(format!(
            "aligned grid range {range:?} does not fit a grid of {} points",
            snapshot.grid.len()
        )));
    }

    let w = snapshot.grid.w[range.clone()].to_vec();
    let dw = snapshot.grid.dw[range.clone()].to_vec();
    let growth = growth_rate(params, &w);
    let mortality = natural_mortality(params, &w);
    let active = species_range(params, &w);
    let mat_idx = maturity_index(&w, params.w_mat);

    let data = ObjectiveData {
        species: params.name.clone(),
        a: params.a,
        b: params.b,
        bins: aligned.bins.clone(),
        counts: aligned.counts(),
        edges: aligned.edges.clone(),
        w,
        dw,
        growth,
        natural_mortality: mortality,
        active,
        mat_idx,
        w_cutoff: params.biomass_cutoff.unwrap_or(0.0),
        biomass_cutoff: cutoff_biomass(params, &snapshot.grid, &state.abundance),
        yield_observed: yield_target.unwrap_or(0.0),
        production_observed: production_target.unwrap_or(0.0),
        yield_lambda: if yield_target.is_some() {
            penalties.yield_lambda
        } else {
            0.0
        },
        production_lambda: if production_target.is_some() {
            penalties.production_lambda
        } else {
            0.0
        },
        selectivity: state.gear.selectivity,
        catchability: state.gear.catchability,
    };

    debug!(
        species = %data.species,
        bins = data.bins.len(),
        points = data.w.len(),
        yield_lambda = data.yield_lambda,
        production_lambda = data.production_lambda,
        "objective data ready"
    );
    Ok(ObjectiveOutcome::Ready(Box::new(data)))
}

/// Align `rows` for species `idx` and assemble its payload.
pub fn prepare_objective(
    snapshot: &ModelSnapshot,
    idx: usize,
    rows: &[ObservationRow],
    penalties: &PenaltyWeights,
) -> Result<ObjectiveOutcome> {
    let state = snapshot
        .species
        .get(idx)
        .ok_or_else(|| MatchError::Internal(format!("species index {idx} out of range")))?;
    let aligned = align_observations(&state.params, &snapshot.grid, rows)?;
    build_objective_data(snapshot, idx, &aligned, penalties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cod_rows, cod_snapshot, COD};

    fn ready(outcome: ObjectiveOutcome) -> ObjectiveData {
        match outcome {
            ObjectiveOutcome::Ready(data) => *data,
            ObjectiveOutcome::NoData { species } => panic!("unexpected no-data for {species}"),
        }
    }

    #[test]
    fn no_counts_and_no_production_is_no_data() {
        let snapshot = cod_snapshot();
        let outcome = prepare_objective(&snapshot, COD, &[], &PenaltyWeights::default()).unwrap();
        assert_eq!(
            outcome,
            ObjectiveOutcome::NoData {
                species: "cod".into()
            }
        );
    }

    #[test]
    fn production_target_alone_is_enough() {
        let snapshot = cod_snapshot();
        let mut state = snapshot.species[COD].clone();
        state.params.production_observed = Some(1000.0);
        let snapshot = snapshot.with_species(COD, state);

        let data = ready(prepare_objective(&snapshot, COD, &[], &PenaltyWeights::default()).unwrap());
        assert!(!data.counts_enabled());
        assert_eq!(data.production_lambda, 1.0);
        assert_eq!(data.w.len(), snapshot.grid.len());
    }

    #[test]
    fn absent_targets_zero_their_penalties() {
        let snapshot = cod_snapshot();
        let mut state = snapshot.species[COD].clone();
        state.params.yield_observed = Some(-3.0);
        state.params.production_observed = None;
        let snapshot = snapshot.with_species(COD, state);

        let penalties = PenaltyWeights {
            yield_lambda: 5.0,
            production_lambda: 7.0,
        };
        let data = ready(prepare_objective(&snapshot, COD, &cod_rows(), &penalties).unwrap());
        assert_eq!(data.yield_lambda, 0.0);
        assert_eq!(data.production_lambda, 0.0);
        assert!(data.counts_enabled());
    }

    #[test]
    fn cutoff_biomass_is_reproducible() {
        let snapshot = cod_snapshot();
        let data = ready(
            prepare_objective(&snapshot, COD, &cod_rows(), &PenaltyWeights::default()).unwrap(),
        );
        let state = &snapshot.species[COD];
        let again = cutoff_biomass(&state.params, &snapshot.grid, &state.abundance);
        assert_eq!(data.biomass_cutoff.to_bits(), again.to_bits());
    }

    #[test]
    fn restricted_vectors_have_matching_lengths() {
        let snapshot = cod_snapshot();
        let data = ready(
            prepare_objective(&snapshot, COD, &cod_rows(), &PenaltyWeights::default()).unwrap(),
        );
        let n = data.w.len();
        assert_eq!(data.dw.len(), n);
        assert_eq!(data.growth.len(), n);
        assert_eq!(data.natural_mortality.len(), n);
        assert!(data.edges.iter().all(|e| e.segment + 1 < n && e.bin < data.bins.len()));
        assert!(data.mat_idx < n);
    }

    #[test]
    fn negative_penalty_weights_are_rejected() {
        let snapshot = cod_snapshot();
        let penalties = PenaltyWeights {
            yield_lambda: -1.0,
            production_lambda: 0.0,
        };
        let err = prepare_objective(&snapshot, COD, &cod_rows(), &penalties).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }
}
