//! Growth matching: scale the energy budget so the model matures at the
//! observed age.
//!
//! Growth is linear in `h` and `ks` jointly, so scaling both by
//! `age_model / age_mat` hits the target age in one step.

use tracing::debug;

use crate::domain::{MatchRequest, ModelSnapshot, Stage};
use crate::error::{MatchError, Result};
use crate::model::age_at_maturity;
use crate::stages::{positive_target, settle, species, MatchStage, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthStage;

impl MatchStage for GrowthStage {
    fn stage(&self) -> Stage {
        Stage::Growth
    }

    fn apply(&self, snapshot: &ModelSnapshot, idx: usize, _request: &MatchRequest) -> Result<StageOutcome> {
        let state = species(snapshot, idx)?;
        let Some(age_mat) = positive_target(state.params.age_mat) else {
            return Ok(StageOutcome::Skipped {
                reason: "no observed age at maturity".into(),
            });
        };
        let age_model = age_at_maturity(&state.params, &snapshot.grid).ok_or_else(|| {
            MatchError::validation(format!(
                "species '{}': growth stalls before maturation",
                state.params.name
            ))
        })?;
        if !(age_model > 0.0) {
            return Err(MatchError::validation(format!(
                "species '{}': model age at maturity is not positive",
                state.params.name
            )));
        }

        let factor = age_model / age_mat;
        let mut next = state.clone();
        next.params.h *= factor;
        next.params.ks *= factor;
        debug!(species = %next.params.name, age_model, age_mat, factor, "growth rescaled");

        settle(snapshot, idx, next).map(StageOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cutoff_biomass;
    use crate::test_support::{cod_snapshot, COD};

    fn request() -> MatchRequest {
        MatchRequest::new("cod", [Stage::Growth])
    }

    #[test]
    fn matures_at_the_observed_age() {
        let snapshot = cod_snapshot();
        let current = age_at_maturity(&snapshot.species[COD].params, &snapshot.grid).unwrap();
        let mut state = snapshot.species[COD].clone();
        state.params.age_mat = Some(current * 2.0);
        let snapshot = snapshot.with_species(COD, state);

        let StageOutcome::Applied(next) = GrowthStage.apply(&snapshot, COD, &request()).unwrap() else {
            panic!("growth target present");
        };
        let params = &next.species[COD].params;
        let age = age_at_maturity(params, &next.grid).unwrap();
        assert!((age - current * 2.0).abs() <= 1e-9 * age);
        assert!(next.changed);

        let target = params.biomass_observed.unwrap();
        let biomass = cutoff_biomass(params, &next.grid, &next.species[COD].abundance);
        assert!((biomass - target).abs() <= 1e-9 * target);
    }

    #[test]
    fn missing_target_is_skipped() {
        let snapshot = cod_snapshot();
        let outcome = GrowthStage.apply(&snapshot, COD, &request()).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped { .. }));
    }
}
