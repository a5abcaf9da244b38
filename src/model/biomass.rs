//! Biomass matching.
//!
//! Rescales a species' abundance so that its cutoff biomass equals the
//! observed biomass. Used by every stage as its last step and, independently,
//! by the pipeline as the reference for its consistency check.

use crate::domain::{ModelSnapshot, SpeciesState, WeightGrid};
use crate::error::{MatchError, Result};
use crate::model::steady::cutoff_biomass;

/// Match one species state; identity when there is no positive target.
pub fn match_biomass_state(state: &SpeciesState, grid: &WeightGrid) -> Result<SpeciesState> {
    let Some(target) = state.params.biomass_observed.filter(|b| b.is_finite() && *b > 0.0) else {
        return Ok(state.clone());
    };

    let current = cutoff_biomass(&state.params, grid, &state.abundance);
    if !(current.is_finite() && current > 0.0) {
        return Err(MatchError::validation(format!(
            "species '{}': model has no biomass above the cutoff, cannot match observed biomass",
            state.params.name
        )));
    }

    let factor = target / current;
    Ok(SpeciesState {
        abundance: state.abundance.iter().map(|n| n * factor).collect(),
        ..state.clone()
    })
}

/// Match species `idx` of a snapshot.
pub fn match_biomass(snapshot: &ModelSnapshot, idx: usize) -> Result<ModelSnapshot> {
    let state = snapshot
        .species
        .get(idx)
        .ok_or_else(|| MatchError::Internal(format!("species index {idx} out of range")))?;
    let matched = match_biomass_state(state, &snapshot.grid)?;
    Ok(snapshot.with_species(idx, matched))
}
