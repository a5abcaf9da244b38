//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory by the aligner, the stages and the optimizer
//! - persisted as snapshot artifacts
//! - exported to JSON/CSV for inspection

use std::collections::BTreeSet;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// One parameter-matching stage.
///
/// The derived ordering is the canonical application order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Growth,
    Catch,
    Yield,
    Consumption,
}

impl Stage {
    pub const CANONICAL: [Stage; 4] = [Stage::Growth, Stage::Catch, Stage::Yield, Stage::Consumption];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Growth => "growth",
            Stage::Catch => "catch",
            Stage::Yield => "yield",
            Stage::Consumption => "consumption",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit of the `length` / `dl` columns of an observation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Centimetres, the canonical unit.
    #[default]
    Cm,
    /// Millimetres; divided by 10 during alignment.
    Mm,
}

impl LengthUnit {
    /// Divisor converting a value in this unit to centimetres.
    pub fn divisor(self) -> f64 {
        match self {
            LengthUnit::Cm => 1.0,
            LengthUnit::Mm => 10.0,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cm" => Some(LengthUnit::Cm),
            "mm" => Some(LengthUnit::Mm),
            _ => None,
        }
    }
}

/// One raw row of an observation table (a length bin with a count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub species: Option<String>,
    pub gear: Option<String>,
    /// Start of the length bin.
    pub length: f64,
    /// Width of the length bin (`dl`).
    pub width: f64,
    pub count: f64,
    pub unit: LengthUnit,
}

/// A derived, non-overlapping bin `[w_start, w_end)` on the weight axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtomicBin {
    pub l_start: f64,
    pub l_end: f64,
    pub w_start: f64,
    pub w_end: f64,
    pub count: f64,
}

/// Contribution of one grid segment's endpoints to the integral over one atomic bin.
///
/// `segment` indexes the restricted grid: segment `j` spans points `j` and `j + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationEdge {
    pub bin: usize,
    pub segment: usize,
    pub left: f64,
    pub right: f64,
}

/// Gear selectivity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selectivity {
    /// Fully selected at and above `knife_edge_size` (a weight).
    KnifeEdge { knife_edge_size: f64 },
    /// Logistic in length: 50% retained at `l50`, 25% at `l25`.
    SigmoidLength { l50: f64, l25: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GearParams {
    pub name: String,
    pub selectivity: Selectivity,
    pub catchability: f64,
}

/// Per-species parameters, including the optional observed targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParams {
    pub name: String,
    /// Allometric coefficient: `w = a * l^b` (l in cm, w in g).
    pub a: f64,
    pub b: f64,
    pub w_min: f64,
    pub w_max: f64,
    pub w_mat: f64,
    /// Assimilation efficiency.
    pub alpha: f64,
    /// Feeding level used by the reference engine.
    pub feeding_level: f64,
    /// Maximum intake rate coefficient.
    pub h: f64,
    /// Metabolic loss coefficient.
    pub ks: f64,
    #[serde(default = "default_exponent")]
    pub n: f64,
    #[serde(default = "default_exponent")]
    pub p: f64,
    /// Natural mortality coefficient: `mu(w) = mu0 * w^(n - 1)`.
    pub mu0: f64,
    #[serde(default)]
    pub biomass_cutoff: Option<f64>,
    #[serde(default)]
    pub biomass_observed: Option<f64>,
    #[serde(default)]
    pub yield_observed: Option<f64>,
    #[serde(default)]
    pub production_observed: Option<f64>,
    #[serde(default)]
    pub consumption_observed: Option<f64>,
    #[serde(default)]
    pub age_mat: Option<f64>,
}

fn default_exponent() -> f64 {
    0.75
}

impl SpeciesParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("a", self.a),
            ("b", self.b),
            ("w_max", self.w_max),
            ("w_mat", self.w_mat),
            ("alpha", self.alpha),
            ("feeding_level", self.feeding_level),
            ("h", self.h),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MatchError::validation(format!(
                    "species '{}': {field} must be finite and > 0 (got {value})",
                    self.name
                )));
            }
        }
        let non_negative = [("w_min", self.w_min), ("ks", self.ks), ("mu0", self.mu0)];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MatchError::validation(format!(
                    "species '{}': {field} must be finite and >= 0 (got {value})",
                    self.name
                )));
            }
        }
        if self.w_max <= self.w_min {
            return Err(MatchError::validation(format!(
                "species '{}': w_max ({}) must exceed w_min ({})",
                self.name, self.w_max, self.w_min
            )));
        }
        if !(self.w_min < self.w_mat && self.w_mat < self.w_max) {
            return Err(MatchError::validation(format!(
                "species '{}': w_mat ({}) must lie inside ({}, {})",
                self.name, self.w_mat, self.w_min, self.w_max
            )));
        }
        Ok(())
    }
}

/// Ordered weight grid shared by every species of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGrid {
    pub w: Vec<f64>,
    pub dw: Vec<f64>,
}

impl WeightGrid {
    /// `points` log-spaced weights between `min_w` and `max_w` (inclusive).
    pub fn log_spaced(min_w: f64, max_w: f64, points: usize) -> Result<Self> {
        let w = crate::fit::log_space(min_w, max_w, points)?;
        Self::from_points(w)
    }

    /// Build a grid from strictly increasing points.
    ///
    /// `dw[i] = w[i+1] - w[i]`; the last width is the previous one scaled by
    /// `w[n-1] / w[n-2]`, which extends a geometric grid by one more step.
    pub fn from_points(w: Vec<f64>) -> Result<Self> {
        check_points(&w)?;

        let n = w.len();
        let mut dw: Vec<f64> = w.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let last = if w[n - 2] > 0.0 {
            dw[n - 2] * (w[n - 1] / w[n - 2])
        } else {
            dw[n - 2]
        };
        dw.push(last);
        Ok(Self { w, dw })
    }

    /// Checks a grid that did not come through `from_points`, e.g. one read from disk.
    pub fn validate(&self) -> Result<()> {
        check_points(&self.w)?;
        if self.dw.len() != self.w.len() {
            return Err(MatchError::validation("grid w and dw lengths differ"));
        }
        if self.dw.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(MatchError::validation("grid widths must be finite and > 0"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.w.is_empty()
    }
}

fn check_points(w: &[f64]) -> Result<()> {
    if w.len() < 2 {
        return Err(MatchError::validation("weight grid needs at least two points"));
    }
    if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(MatchError::validation("weight grid points must be finite and >= 0"));
    }
    if w.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(MatchError::validation("weight grid points must be strictly increasing"));
    }
    Ok(())
}

/// Parameters, gear and abundance of one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesState {
    pub params: SpeciesParams,
    pub gear: GearParams,
    /// Number density per grid point.
    pub abundance: Vec<f64>,
}

/// A complete, self-contained model state at one instant.
///
/// Snapshots are values: stages take `&ModelSnapshot` and return a new one.
/// The grid is shared between all snapshots derived from the same load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub grid: Arc<WeightGrid>,
    pub species: Vec<SpeciesState>,
    /// Set by stages; cleared when the snapshot is committed.
    #[serde(default)]
    pub changed: bool,
}

impl ModelSnapshot {
    pub fn species_index(&self, name: &str) -> Result<usize> {
        self.species
            .iter()
            .position(|s| s.params.name == name)
            .ok_or_else(|| MatchError::validation(format!("unknown species '{name}'")))
    }

    /// A copy with species `idx` replaced and the change tag set.
    pub fn with_species(&self, idx: usize, state: SpeciesState) -> ModelSnapshot {
        let mut species = self.species.clone();
        species[idx] = state;
        ModelSnapshot {
            grid: Arc::clone(&self.grid),
            species,
            changed: true,
        }
    }

    pub fn with_changed(&self, changed: bool) -> ModelSnapshot {
        ModelSnapshot {
            changed,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        let mut names = BTreeSet::new();
        for state in &self.species {
            state.params.validate()?;
            if !names.insert(state.params.name.as_str()) {
                return Err(MatchError::validation(format!(
                    "duplicate species '{}'",
                    state.params.name
                )));
            }
            if state.abundance.len() != self.grid.len() {
                return Err(MatchError::validation(format!(
                    "species '{}': abundance has {} values, grid has {}",
                    state.params.name,
                    state.abundance.len(),
                    self.grid.len()
                )));
            }
            if state.abundance.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(MatchError::validation(format!(
                    "species '{}': abundance must be finite and >= 0",
                    state.params.name
                )));
            }
            if !(state.gear.catchability.is_finite() && state.gear.catchability >= 0.0) {
                return Err(MatchError::validation(format!(
                    "species '{}': catchability must be finite and >= 0",
                    state.params.name
                )));
            }
        }
        Ok(())
    }
}

/// Weights of the optional likelihood penalty terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyWeights {
    pub yield_lambda: f64,
    pub production_lambda: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            yield_lambda: 1.0,
            production_lambda: 1.0,
        }
    }
}

/// What the operator asked the pipeline to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub species: String,
    pub stages: BTreeSet<Stage>,
    pub penalties: PenaltyWeights,
}

impl MatchRequest {
    pub fn new(species: impl Into<String>, stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            species: species.into(),
            stages: stages.into_iter().collect(),
            penalties: PenaltyWeights::default(),
        }
    }

    pub fn with_penalties(mut self, penalties: PenaltyWeights) -> Self {
        self.penalties = penalties;
        self
    }

    /// Requested stages in canonical order.
    pub fn ordered_stages(&self) -> Vec<Stage> {
        Stage::CANONICAL
            .into_iter()
            .filter(|s| self.stages.contains(s))
            .collect()
    }
}
