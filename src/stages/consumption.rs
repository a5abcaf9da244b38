//! Consumption matching: rescale the maximum intake rate `h` until model
//! consumption equals the observed consumption.
//!
//! `ks` follows `h` so the net energy available at maturation stays where it
//! was when the stage started.

use crate::domain::{MatchRequest, ModelSnapshot, Stage};
use crate::error::{MatchError, Result};
use crate::model::{net_energy, total_consumption};
use crate::stages::{positive_target, rescale_to_target, species, MatchStage, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumptionStage;

impl MatchStage for ConsumptionStage {
    fn stage(&self) -> Stage {
        Stage::Consumption
    }

    fn apply(&self, snapshot: &ModelSnapshot, idx: usize, _request: &MatchRequest) -> Result<StageOutcome> {
        let state = species(snapshot, idx)?;
        let Some(target) = positive_target(state.params.consumption_observed) else {
            return Ok(StageOutcome::Skipped {
                reason: "no observed consumption".into(),
            });
        };
        let w_mat = state.params.w_mat;
        let energy_at_maturity = net_energy(&state.params, w_mat);

        let matched = rescale_to_target(
            "consumption",
            state,
            &snapshot.grid,
            target,
            total_consumption,
            |s, factor| {
                let p = &mut s.params;
                p.h *= factor;
                let intake = p.alpha * p.feeding_level * p.h * w_mat.powf(p.n);
                let ks = (intake - energy_at_maturity) / w_mat.powf(p.p);
                if !(ks.is_finite() && ks >= 0.0) {
                    return Err(MatchError::validation(format!(
                        "species '{}': consumption target needs a negative metabolic rate",
                        p.name
                    )));
                }
                p.ks = ks;
                Ok(())
            },
        )?;
        Ok(StageOutcome::Applied(snapshot.with_species(idx, matched)))
    }
}
