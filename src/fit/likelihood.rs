//! Objective function for gear calibration.
//!
//! For a candidate gear `(l50, l25, q)`:
//!
//! 1. fishing mortality `F = q * sel(l(w))` on the active grid points
//! 2. steady-state abundance under `natural_mortality + F`, scaled so the
//!    biomass above `w_cutoff` equals the record's cutoff biomass
//! 3. catch density `F * N` integrated over atomic bins with the interpolation
//!    operator
//!
//! and the value is
//!
//! ```text
//! -Σ_k c_k ln(p_k) + λ_Y ln(Y / Y_obs)^2 + λ_P ln(P / P_obs)^2
//! ```
//!
//! with `p_k` the share of the modelled catch falling in bin `k`.

use nalgebra::{DMatrix, DVector};

use crate::align::interpolation_operator;
use crate::objective::ObjectiveData;
use crate::model::{biomass_above, production, sigmoid_length, steady_profile};

/// One point of the search space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearCandidate {
    pub l50: f64,
    pub l25: f64,
    pub catchability: f64,
}

/// Modelled population under a candidate gear.
#[derive(Debug, Clone)]
pub struct CandidateState {
    pub fishing: Vec<f64>,
    pub abundance: Vec<f64>,
}

/// Objective evaluator with the interpolation operator built once.
pub struct Likelihood<'a> {
    data: &'a ObjectiveData,
    operator: DMatrix<f64>,
}

impl<'a> Likelihood<'a> {
    pub fn new(data: &'a ObjectiveData) -> Self {
        let operator = interpolation_operator(&data.edges, data.bins.len(), data.w.len());
        Self { data, operator }
    }

    /// Abundance and fishing mortality under `candidate`; `None` if the
    /// population cannot be scaled to the cutoff biomass.
    pub fn candidate_state(&self, candidate: &GearCandidate) -> Option<CandidateState> {
        let data = self.data;
        let fishing: Vec<f64> = data
            .w
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                if data.active.contains(&i) {
                    let l = (w / data.a).powf(1.0 / data.b);
                    candidate.catchability * sigmoid_length(l, candidate.l50, candidate.l25)
                } else {
                    0.0
                }
            })
            .collect();
        let mortality: Vec<f64> = data
            .natural_mortality
            .iter()
            .zip(&fishing)
            .map(|(m, f)| m + f)
            .collect();

        let mut abundance =
            steady_profile(&data.growth, &mortality, &data.dw, data.active.clone(), 1.0);
        if data.biomass_cutoff > 0.0 {
            let biomass = biomass_above(&data.w, &data.dw, &abundance, data.w_cutoff);
            if !(biomass.is_finite() && biomass > 0.0) {
                return None;
            }
            let scale = data.biomass_cutoff / biomass;
            abundance.iter_mut().for_each(|n| *n *= scale);
        }
        Some(CandidateState { fishing, abundance })
    }

    /// Modelled catch per atomic bin.
    pub fn bin_catch(&self, state: &CandidateState) -> DVector<f64> {
        let density = DVector::from_iterator(
            state.fishing.len(),
            state.fishing.iter().zip(&state.abundance).map(|(f, n)| f * n),
        );
        &self.operator * density
    }

    /// Objective value, `None` for infeasible candidates.
    pub fn evaluate(&self, candidate: &GearCandidate) -> Option<f64> {
        let data = self.data;
        let state = self.candidate_state(candidate)?;
        let mut value = 0.0;

        if data.counts_enabled() {
            let catch = self.bin_catch(&state);
            let total = catch.sum();
            if !(total.is_finite() && total > 0.0) {
                return None;
            }
            for (k, &count) in data.counts.iter().enumerate() {
                if count <= 0.0 {
                    continue;
                }
                let share = catch[k] / total;
                if !(share > 0.0) {
                    return None;
                }
                value -= count * share.ln();
            }
        }

        if data.yield_lambda > 0.0 {
            let mut yield_ = 0.0;
            for i in 0..data.w.len() {
                yield_ += state.fishing[i] * state.abundance[i] * data.w[i] * data.dw[i];
            }
            if !(yield_.is_finite() && yield_ > 0.0) {
                return None;
            }
            value += data.yield_lambda * (yield_ / data.yield_observed).ln().powi(2);
        }

        if data.production_lambda > 0.0 {
            let prod = production(&data.growth, &data.dw, &state.abundance, data.mat_idx);
            if !(prod.is_finite() && prod > 0.0) {
                return None;
            }
            value += data.production_lambda * (prod / data.production_observed).ln().powi(2);
        }

        value.is_finite().then_some(value)
    }
}
