//! Yield matching: rescale catchability until the model yield equals the
//! observed yield.

use crate::domain::{MatchRequest, ModelSnapshot, Stage};
use crate::error::{MatchError, Result};
use crate::model::total_yield;
use crate::stages::{positive_target, rescale_to_target, species, MatchStage, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct YieldStage;

impl MatchStage for YieldStage {
    fn stage(&self) -> Stage {
        Stage::Yield
    }

    fn apply(&self, snapshot: &ModelSnapshot, idx: usize, _request: &MatchRequest) -> Result<StageOutcome> {
        let state = species(snapshot, idx)?;
        let Some(target) = positive_target(state.params.yield_observed) else {
            return Ok(StageOutcome::Skipped {
                reason: "no observed yield".into(),
            });
        };
        if state.gear.catchability <= 0.0 {
            return Err(MatchError::validation(format!(
                "species '{}': catchability is zero, yield cannot be matched",
                state.params.name
            )));
        }

        let matched = rescale_to_target(
            "yield",
            state,
            &snapshot.grid,
            target,
            total_yield,
            |s, ratio| {
                s.gear.catchability *= ratio;
                Ok(())
            },
        )?;
        Ok(StageOutcome::Applied(snapshot.with_species(idx, matched)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cod_snapshot, COD};

    #[test]
    fn model_yield_reaches_target() {
        let snapshot = cod_snapshot();
        let before = total_yield(&snapshot.species[COD], &snapshot.grid);
        let mut state = snapshot.species[COD].clone();
        state.params.yield_observed = Some(before * 1.2);
        let snapshot = snapshot.with_species(COD, state);

        let request = MatchRequest::new("cod", [Stage::Yield]);
        let StageOutcome::Applied(next) = YieldStage.apply(&snapshot, COD, &request).unwrap() else {
            panic!("yield target present");
        };
        let after = total_yield(&next.species[COD], &next.grid);
        assert!((after - before * 1.2).abs() <= 1e-7 * after);
        assert!(next.species[COD].gear.catchability > 0.3);
    }

    #[test]
    fn missing_target_is_skipped() {
        let request = MatchRequest::new("cod", [Stage::Yield]);
        let outcome = YieldStage.apply(&cod_snapshot(), COD, &request).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped { .. }));
    }
}
