//! Shared fixtures for unit tests.

use crate::domain::{GearParams, LengthUnit, ModelSnapshot, ObservationRow, Selectivity, SpeciesParams};
use crate::model::{GridSpec, ModelSetup, SpeciesSetup};

pub const COD: usize = 0;

pub fn cod_params() -> SpeciesParams {
    SpeciesParams {
        name: "cod".into(),
        a: 0.01,
        b: 3.0,
        w_min: 0.001,
        w_max: 10_000.0,
        w_mat: 1_000.0,
        alpha: 0.6,
        feeding_level: 0.6,
        h: 30.0,
        ks: 3.0,
        n: 0.75,
        p: 0.75,
        mu0: 2.0,
        biomass_cutoff: Some(10.0),
        biomass_observed: Some(5e5),
        yield_observed: None,
        production_observed: None,
        consumption_observed: None,
        age_mat: None,
    }
}

pub fn trawl() -> GearParams {
    GearParams {
        name: "trawl".into(),
        selectivity: Selectivity::SigmoidLength { l50: 40.0, l25: 35.0 },
        catchability: 0.3,
    }
}

pub fn cod_setup() -> ModelSetup {
    ModelSetup {
        grid: GridSpec {
            min_w: 0.001,
            max_w: 10_000.0,
            points: 120,
        },
        species: vec![SpeciesSetup {
            params: cod_params(),
            gear: trawl(),
        }],
    }
}

pub fn cod_snapshot() -> ModelSnapshot {
    cod_setup().into_snapshot().unwrap()
}

/// Trawl length frequencies between 10 and 90 cm.
pub fn cod_rows() -> Vec<ObservationRow> {
    [
        (10.0, 5.0, 3.0),
        (15.0, 5.0, 8.0),
        (20.0, 10.0, 15.0),
        (30.0, 10.0, 22.0),
        (40.0, 10.0, 18.0),
        (50.0, 10.0, 11.0),
        (60.0, 15.0, 6.0),
        (75.0, 15.0, 2.0),
    ]
    .into_iter()
    .map(|(length, width, count)| ObservationRow {
        species: Some("cod".into()),
        gear: Some("trawl".into()),
        length,
        width,
        count,
        unit: LengthUnit::Cm,
    })
    .collect()
}
