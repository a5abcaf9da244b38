//! Single-species steady state and the summary quantities derived from it.
//!
//! The steady state solves the McKendrick–von Foerster equation on the grid
//! with an upwind scheme:
//!
//! ```text
//! N[i+1] = N[i] * g[i] / (g[i+1] + Z[i+1] * dw[i+1])
//! ```
//!
//! starting from a given density at the first grid point of the species range.

use std::ops::Range;

use crate::domain::{SpeciesParams, SpeciesState, WeightGrid};
use crate::error::{MatchError, Result};
use crate::model::rates::{
    consumption_rate, fishing_mortality, growth_rate, species_range, total_mortality,
};

/// Steady-state profile over `range`; zero elsewhere.
pub fn steady_profile(
    growth: &[f64],
    mortality: &[f64],
    dw: &[f64],
    range: Range<usize>,
    n0: f64,
) -> Vec<f64> {
    let mut n = vec![0.0; growth.len()];
    if range.is_empty() {
        return n;
    }
    n[range.start] = n0;
    for i in range.start..range.end - 1 {
        let denom = growth[i + 1] + mortality[i + 1] * dw[i + 1];
        n[i + 1] = if growth[i] > 0.0 && denom > 0.0 {
            n[i] * growth[i] / denom
        } else {
            0.0
        };
    }
    n
}

/// Recompute the steady-state abundance of one species.
///
/// The density at `w_min` is preserved when positive, so a refresh changes the
/// shape of the spectrum but not its recruitment level.
pub fn steady_state(state: &SpeciesState, grid: &WeightGrid) -> Result<Vec<f64>> {
    let params = &state.params;
    let range = species_range(params, &grid.w);
    if range.is_empty() {
        return Err(MatchError::validation(format!(
            "species '{}': no grid points inside [{}, {}]",
            params.name, params.w_min, params.w_max
        )));
    }

    let growth = growth_rate(params, &grid.w);
    if growth[range.start] <= 0.0 {
        return Err(MatchError::validation(format!(
            "species '{}': growth rate at w_min is not positive",
            params.name
        )));
    }
    let mortality = total_mortality(params, &state.gear, grid);

    let n0 = state.abundance.get(range.start).copied().unwrap_or(0.0);
    let n0 = if n0.is_finite() && n0 > 0.0 { n0 } else { 1.0 };

    Ok(steady_profile(&growth, &mortality, &grid.dw, range, n0))
}

/// A copy of `state` with its abundance replaced by the steady state.
pub fn refresh_steady_state(state: &SpeciesState, grid: &WeightGrid) -> Result<SpeciesState> {
    let abundance = steady_state(state, grid)?;
    Ok(SpeciesState {
        abundance,
        ..state.clone()
    })
}

/// Biomass of grid points at or above `cutoff`, summed in grid order.
pub fn biomass_above(w: &[f64], dw: &[f64], abundance: &[f64], cutoff: f64) -> f64 {
    let mut total = 0.0;
    for i in 0..w.len() {
        if w[i] >= cutoff {
            total += abundance[i] * w[i] * dw[i];
        }
    }
    total
}

/// Cutoff biomass of one species: all points when no cutoff is configured.
///
/// The pipeline's consistency check compares two results of this function, so
/// every caller must go through it rather than re-summing.
pub fn cutoff_biomass(params: &SpeciesParams, grid: &WeightGrid, abundance: &[f64]) -> f64 {
    biomass_above(&grid.w, &grid.dw, abundance, params.biomass_cutoff.unwrap_or(0.0))
}

pub fn total_yield(state: &SpeciesState, grid: &WeightGrid) -> f64 {
    let f = fishing_mortality(&state.params, &state.gear, &grid.w);
    let mut total = 0.0;
    for i in 0..grid.len() {
        total += f[i] * state.abundance[i] * grid.w[i] * grid.dw[i];
    }
    total
}

/// Largest index with `w[i] < w_mat` (0 when none).
pub fn maturity_index(w: &[f64], w_mat: f64) -> usize {
    w.partition_point(|&x| x < w_mat).saturating_sub(1)
}

/// Somatic production of the mature part of the population.
pub fn production(growth: &[f64], dw: &[f64], abundance: &[f64], mat_idx: usize) -> f64 {
    let mut total = 0.0;
    for i in (mat_idx + 1)..growth.len() {
        total += growth[i] * abundance[i] * dw[i];
    }
    total
}

pub fn species_production(state: &SpeciesState, grid: &WeightGrid) -> f64 {
    let growth = growth_rate(&state.params, &grid.w);
    let mat_idx = maturity_index(&grid.w, state.params.w_mat);
    production(&growth, &grid.dw, &state.abundance, mat_idx)
}

pub fn total_consumption(state: &SpeciesState, grid: &WeightGrid) -> f64 {
    let rate = consumption_rate(&state.params, &grid.w);
    let mut total = 0.0;
    for i in 0..grid.len() {
        total += rate[i] * state.abundance[i] * grid.dw[i];
    }
    total
}

/// Time to grow from `w_min` to `w_mat`; `None` when growth stalls on the way.
pub fn age_at_maturity(params: &SpeciesParams, grid: &WeightGrid) -> Option<f64> {
    let growth = growth_rate(params, &grid.w);
    let range = species_range(params, &grid.w);
    let mut age = 0.0;
    for i in range {
        if grid.w[i] >= params.w_mat {
            break;
        }
        if growth[i] <= 0.0 {
            return None;
        }
        age += grid.dw[i] / growth[i];
    }
    Some(age)
}
