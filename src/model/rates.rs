//! Per-grid-point rates of the reference engine.
//!
//! All functions are pure and take parameters by reference, so the optimizer
//! and the stages can evaluate them on candidate parameter sets without
//! building snapshots.
//!
//! Rates are zero outside the species' `[w_min, w_max]` range.

use std::ops::Range;

use crate::domain::{GearParams, Selectivity, SpeciesParams, WeightGrid};

/// Relative slack used when deciding whether a grid point lies inside `[w_min, w_max]`.
const RANGE_SLACK: f64 = 1e-9;

/// Steepness exponent of the maturity ogive.
const MATURITY_STEEPNESS: f64 = 10.0;

pub fn length_at(params: &SpeciesParams, w: f64) -> f64 {
    (w / params.a).powf(1.0 / params.b)
}

pub fn weight_at(params: &SpeciesParams, l: f64) -> f64 {
    params.a * l.powf(params.b)
}

/// Indices of grid points inside the species' viable weight range.
pub fn species_range(params: &SpeciesParams, w: &[f64]) -> Range<usize> {
    let lo = params.w_min * (1.0 - RANGE_SLACK);
    let hi = params.w_max * (1.0 + RANGE_SLACK);
    let start = w.partition_point(|&x| x < lo);
    let end = w.partition_point(|&x| x <= hi);
    start..end.max(start)
}

/// Logistic length selectivity: 0.5 at `l50`, 0.25 at `l25`.
///
/// A non-positive spread (`l25 >= l50`) degenerates to a knife edge at `l50`.
pub fn sigmoid_length(l: f64, l50: f64, l25: f64) -> f64 {
    let spread = l50 - l25;
    if !(spread > 0.0) {
        return if l >= l50 { 1.0 } else { 0.0 };
    }
    let s1 = l50 * 3.0_f64.ln() / spread;
    let s2 = s1 / l50;
    1.0 / (1.0 + (s1 - s2 * l).exp())
}

pub fn selectivity_at(selectivity: &Selectivity, params: &SpeciesParams, w: f64) -> f64 {
    match *selectivity {
        Selectivity::KnifeEdge { knife_edge_size } => {
            if w >= knife_edge_size {
                1.0
            } else {
                0.0
            }
        }
        Selectivity::SigmoidLength { l50, l25 } => sigmoid_length(length_at(params, w), l50, l25),
    }
}

/// Fraction of mature individuals at weight `w`.
pub fn maturity(params: &SpeciesParams, w: f64) -> f64 {
    if w <= 0.0 {
        return 0.0;
    }
    1.0 / (1.0 + (w / params.w_mat).powf(-MATURITY_STEEPNESS))
}

/// Energy available for growth and reproduction at weight `w`.
pub fn net_energy(params: &SpeciesParams, w: f64) -> f64 {
    params.alpha * params.feeding_level * params.h * w.powf(params.n) - params.ks * w.powf(params.p)
}

/// Somatic growth rate at each grid point.
pub fn growth_rate(params: &SpeciesParams, w: &[f64]) -> Vec<f64> {
    let range = species_range(params, w);
    w.iter()
        .enumerate()
        .map(|(i, &wi)| {
            if !range.contains(&i) {
                return 0.0;
            }
            let investment = maturity(params, wi) * (wi / params.w_max).powf(1.0 - params.n);
            net_energy(params, wi).max(0.0) * (1.0 - investment.min(1.0))
        })
        .collect()
}

pub fn natural_mortality(params: &SpeciesParams, w: &[f64]) -> Vec<f64> {
    let range = species_range(params, w);
    w.iter()
        .enumerate()
        .map(|(i, &wi)| {
            if range.contains(&i) && wi > 0.0 {
                params.mu0 * wi.powf(params.n - 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

pub fn fishing_mortality(params: &SpeciesParams, gear: &GearParams, w: &[f64]) -> Vec<f64> {
    let range = species_range(params, w);
    w.iter()
        .enumerate()
        .map(|(i, &wi)| {
            if range.contains(&i) {
                gear.catchability * selectivity_at(&gear.selectivity, params, wi)
            } else {
                0.0
            }
        })
        .collect()
}

/// Food consumption rate per individual.
pub fn consumption_rate(params: &SpeciesParams, w: &[f64]) -> Vec<f64> {
    let range = species_range(params, w);
    w.iter()
        .enumerate()
        .map(|(i, &wi)| {
            if range.contains(&i) {
                params.feeding_level * params.h * wi.powf(params.n)
            } else {
                0.0
            }
        })
        .collect()
}

pub fn total_mortality(params: &SpeciesParams, gear: &GearParams, grid: &WeightGrid) -> Vec<f64> {
    natural_mortality(params, &grid.w)
        .into_iter()
        .zip(fishing_mortality(params, gear, &grid.w))
        .map(|(m, f)| m + f)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::cod_params;

    #[test]
    fn sigmoid_hits_quartile_points() {
        assert!((sigmoid_length(40.0, 40.0, 35.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid_length(35.0, 40.0, 35.0) - 0.25).abs() < 1e-12);
        assert_eq!(sigmoid_length(39.0, 40.0, 40.0), 0.0);
    }

    #[test]
    fn allometry_round_trips() {
        let params = cod_params();
        let l = length_at(&params, 1000.0);
        assert!((weight_at(&params, l) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn rates_vanish_outside_species_range() {
        let params = cod_params();
        let w = vec![params.w_min / 10.0, params.w_min, 1.0, params.w_max, params.w_max * 10.0];
        let g = growth_rate(&params, &w);
        assert_eq!(g[0], 0.0);
        assert!(g[1] > 0.0 && g[2] > 0.0);
        assert_eq!(g[4], 0.0);
        assert_eq!(natural_mortality(&params, &w)[4], 0.0);
        assert_eq!(species_range(&params, &w), 1..4);
    }
}
