//! Gear optimizers.
//!
//! An [`Optimizer`] turns an [`ObjectiveData`] payload into fitted gear
//! parameters. The bundled [`GridSearchOptimizer`] evaluates a full
//! `l50 × (l25/l50) × catchability` grid in parallel and keeps the lowest
//! objective, ties broken by grid index so results do not depend on thread
//! scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MatchError, Result};
use crate::fit::grid::{lin_space, log_space};
use crate::fit::likelihood::{GearCandidate, Likelihood};
use crate::objective::ObjectiveData;

/// Fitted gear for one species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearFit {
    pub l50: f64,
    pub l25: f64,
    pub catchability: f64,
    /// Objective value at the optimum.
    pub objective: f64,
}

/// Minimizes the calibration objective for one species.
pub trait Optimizer: Send + Sync {
    fn optimize(&self, data: &ObjectiveData) -> Result<GearFit>;
}

/// Exhaustive grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchOptimizer {
    pub l50_steps: usize,
    pub ratio_steps: usize,
    /// Bounds of `l25 / l50`; both in `(0, 1)`.
    pub ratio_min: f64,
    pub ratio_max: f64,
    pub catchability_steps: usize,
    /// Catchability is searched over `[q0 / span, q0 * span]` on a log scale.
    pub catchability_span: f64,
}

impl Default for GridSearchOptimizer {
    fn default() -> Self {
        Self {
            l50_steps: 40,
            ratio_steps: 10,
            ratio_min: 0.5,
            ratio_max: 0.95,
            catchability_steps: 25,
            catchability_span: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    idx: usize,
    candidate: GearCandidate,
    value: f64,
}

impl GridSearchOptimizer {
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.ratio_min && self.ratio_min < self.ratio_max && self.ratio_max < 1.0) {
            return Err(MatchError::validation(format!(
                "ratio bounds must satisfy 0 < min < max < 1 (got {}, {})",
                self.ratio_min, self.ratio_max
            )));
        }
        if !(self.catchability_span.is_finite() && self.catchability_span > 1.0) {
            return Err(MatchError::validation(format!(
                "catchability span must be > 1 (got {})",
                self.catchability_span
            )));
        }
        if self.l50_steps < 2 || self.ratio_steps < 2 || self.catchability_steps < 2 {
            return Err(MatchError::validation("optimizer grid steps must be >= 2"));
        }
        Ok(())
    }

    pub fn candidate_count(&self) -> usize {
        self.l50_steps * self.ratio_steps * self.catchability_steps
    }

    fn candidates(&self, data: &ObjectiveData) -> Result<Vec<GearCandidate>> {
        let (lo, hi) = l50_bounds(data).ok_or_else(|| {
            MatchError::Optimizer(format!("species '{}': no length range to search", data.species))
        })?;
        let l50s = lin_space(lo, hi, self.l50_steps)?;
        let ratios = lin_space(self.ratio_min, self.ratio_max, self.ratio_steps)?;
        let q0 = if data.catchability.is_finite() && data.catchability > 0.0 {
            data.catchability
        } else {
            1.0
        };
        let qs = log_space(
            q0 / self.catchability_span,
            q0 * self.catchability_span,
            self.catchability_steps,
        )?;

        let mut out = Vec::with_capacity(self.candidate_count());
        for &l50 in &l50s {
            for &ratio in &ratios {
                for &q in &qs {
                    out.push(GearCandidate {
                        l50,
                        l25: l50 * ratio,
                        catchability: q,
                    });
                }
            }
        }
        Ok(out)
    }
}

/// l50 search bounds: the span of bins with positive counts, else the
/// species' active length range.
fn l50_bounds(data: &ObjectiveData) -> Option<(f64, f64)> {
    let observed = data.bins.iter().filter(|b| b.count > 0.0);
    let lo = observed.clone().map(|b| b.l_start).reduce(f64::min);
    let hi = observed.map(|b| b.l_end).reduce(f64::max);
    let (lo, hi) = match (lo, hi) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => data.active_length_range()?,
    };
    let lo = lo.max(f64::MIN_POSITIVE);
    if hi > lo {
        Some((lo, hi))
    } else {
        Some((0.5 * lo, 1.5 * lo))
    }
}

impl Optimizer for GridSearchOptimizer {
    fn optimize(&self, data: &ObjectiveData) -> Result<GearFit> {
        self.validate()?;
        let candidates = self.candidates(data)?;
        let likelihood = Likelihood::new(data);

        let scored: Vec<Scored> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(idx, candidate)| {
                likelihood.evaluate(candidate).map(|value| Scored {
                    idx,
                    candidate: *candidate,
                    value,
                })
            })
            .collect();

        let Some(first) = scored.first() else {
            return Err(MatchError::Optimizer(format!(
                "species '{}': no feasible gear among {} candidates",
                data.species,
                candidates.len()
            )));
        };
        let mut best = first;
        for s in &scored[1..] {
            if s.value < best.value || (s.value == best.value && s.idx < best.idx) {
                best = s;
            }
        }

        debug!(
            species = %data.species,
            feasible = scored.len(),
            candidates = candidates.len(),
            objective = best.value,
            "grid search finished"
        );
        Ok(GearFit {
            l50: best.candidate.l50,
            l25: best.candidate.l25,
            catchability: best.candidate.catchability,
            objective: best.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PenaltyWeights;
    use crate::objective::{prepare_objective, ObjectiveOutcome};
    use crate::test_support::{cod_rows, cod_snapshot, COD};

    fn cod_data() -> ObjectiveData {
        let snapshot = cod_snapshot();
        match prepare_objective(&snapshot, COD, &cod_rows(), &PenaltyWeights::default()).unwrap() {
            ObjectiveOutcome::Ready(data) => *data,
            ObjectiveOutcome::NoData { .. } => panic!("cod rows carry counts"),
        }
    }

    fn small() -> GridSearchOptimizer {
        GridSearchOptimizer {
            l50_steps: 25,
            ratio_steps: 8,
            catchability_steps: 5,
            ..GridSearchOptimizer::default()
        }
    }

    #[test]
    fn recovers_the_gear_that_generated_the_counts() {
        let mut data = cod_data();
        let truth = GearCandidate {
            l50: 30.0,
            l25: 26.0,
            catchability: 0.3,
        };
        let expected = {
            let likelihood = Likelihood::new(&data);
            let state = likelihood.candidate_state(&truth).unwrap();
            likelihood.bin_catch(&state)
        };
        let total = expected.sum();
        // Bin counts keep the observed span so l50 is searched over 10..90 cm.
        data.counts = expected.iter().map(|c| 1e4 * c / total).collect();

        let fit = small().optimize(&data).unwrap();
        assert!((fit.l50 - truth.l50).abs() < 0.15 * truth.l50, "l50 {}", fit.l50);
        assert!(fit.l25 < fit.l50);
        assert!(fit.objective.is_finite());
    }

    #[test]
    fn repeated_runs_agree() {
        let data = cod_data();
        let a = small().optimize(&data).unwrap();
        let b = small().optimize(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_ratio_bounds_are_rejected() {
        let optimizer = GridSearchOptimizer {
            ratio_min: 0.9,
            ratio_max: 0.5,
            ..GridSearchOptimizer::default()
        };
        let err = optimizer.optimize(&cod_data()).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }
}
