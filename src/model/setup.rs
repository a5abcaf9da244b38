//! Building an initial snapshot from parameters alone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{GearParams, ModelSnapshot, SpeciesParams, SpeciesState, WeightGrid};
use crate::error::Result;
use crate::model::biomass::match_biomass_state;
use crate::model::steady::refresh_steady_state;

/// Log-spaced weight grid description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub min_w: f64,
    pub max_w: f64,
    pub points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSetup {
    pub params: SpeciesParams,
    pub gear: GearParams,
}

/// Parameters of a model without abundance state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSetup {
    pub grid: GridSpec,
    pub species: Vec<SpeciesSetup>,
}

impl ModelSetup {
    /// Steady state for every species (unit density at `w_min`), then biomass-matched.
    pub fn into_snapshot(self) -> Result<ModelSnapshot> {
        let grid = WeightGrid::log_spaced(self.grid.min_w, self.grid.max_w, self.grid.points)?;

        let mut species = Vec::with_capacity(self.species.len());
        for setup in self.species {
            setup.params.validate()?;
            let seed = SpeciesState {
                abundance: vec![0.0; grid.len()],
                params: setup.params,
                gear: setup.gear,
            };
            let steady = refresh_steady_state(&seed, &grid)?;
            species.push(match_biomass_state(&steady, &grid)?);
        }

        let snapshot = ModelSnapshot {
            grid: Arc::new(grid),
            species,
            changed: false,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}
