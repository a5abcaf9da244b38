use std::sync::Arc;

use spectrum_match::domain::{
    GearParams, LengthUnit, MatchRequest, ModelSnapshot, ObservationRow, Selectivity,
    SpeciesParams, Stage,
};
use spectrum_match::error::Result;
use spectrum_match::fit::GridSearchOptimizer;
use spectrum_match::model::{cutoff_biomass, total_yield, GridSpec, ModelSetup, SpeciesSetup};
use spectrum_match::session::{LogStep, MatchPipeline, SnapshotLog};
use spectrum_match::stages::{standard_stages, MatchStage, StageOutcome};
use tempfile::TempDir;

fn herring() -> ModelSnapshot {
    let params = SpeciesParams {
        name: "herring".into(),
        a: 0.008,
        b: 3.1,
        w_min: 0.001,
        w_max: 500.0,
        w_mat: 60.0,
        alpha: 0.6,
        feeding_level: 0.6,
        h: 25.0,
        ks: 2.5,
        n: 0.75,
        p: 0.75,
        mu0: 1.5,
        biomass_cutoff: Some(5.0),
        biomass_observed: Some(2e5),
        yield_observed: None,
        production_observed: None,
        consumption_observed: None,
        age_mat: None,
    };
    let setup = ModelSetup {
        grid: GridSpec {
            min_w: 0.001,
            max_w: 500.0,
            points: 80,
        },
        species: vec![SpeciesSetup {
            params,
            gear: GearParams {
                name: "pelagic trawl".into(),
                selectivity: Selectivity::SigmoidLength { l50: 20.0, l25: 17.0 },
                catchability: 0.4,
            },
        }],
    };
    setup.into_snapshot().unwrap()
}

fn with_catchability(snapshot: &ModelSnapshot, q: f64) -> ModelSnapshot {
    let mut state = snapshot.species[0].clone();
    state.gear.catchability = q;
    snapshot.with_species(0, state)
}

fn moved(step: LogStep) -> ModelSnapshot {
    match step {
        LogStep::Moved(snapshot) => snapshot,
        other => panic!("expected a move, got {other:?}"),
    }
}

/// Breaks the biomass invariant on purpose.
struct Inflate;

impl MatchStage for Inflate {
    fn stage(&self) -> Stage {
        Stage::Consumption
    }

    fn apply(&self, snapshot: &ModelSnapshot, idx: usize, _request: &MatchRequest) -> Result<StageOutcome> {
        let mut state = snapshot.species[idx].clone();
        state.abundance.iter_mut().for_each(|n| *n *= 1.5);
        Ok(StageOutcome::Applied(snapshot.with_species(idx, state)))
    }
}

#[test]
fn undo_then_redo_restores_every_field() {
    let tmp = TempDir::new().unwrap();
    let mut log = SnapshotLog::open(tmp.path()).unwrap();
    let base = log.initialize(&herring()).unwrap();

    let mut committed = vec![base.clone()];
    for q in [0.5, 0.6, 0.7] {
        let next = with_catchability(&base, q);
        log.commit(&next).unwrap();
        committed.push(next.with_changed(false));
    }
    let top = log.current().unwrap();
    assert_eq!(top, committed[3]);

    for k in (0..3).rev() {
        assert_eq!(moved(log.undo().unwrap()), committed[k]);
    }
    for k in 1..4 {
        assert_eq!(moved(log.redo().unwrap()), committed[k]);
    }
    assert_eq!(log.current().unwrap(), top);
}

#[test]
fn commit_after_undo_discards_forward_history() {
    let tmp = TempDir::new().unwrap();
    let mut log = SnapshotLog::open(tmp.path()).unwrap();
    let base = log.initialize(&herring()).unwrap();
    log.commit(&with_catchability(&base, 0.5)).unwrap();
    log.commit(&with_catchability(&base, 0.6)).unwrap();
    let forward: Vec<_> = log.entries()[1..].iter().map(|e| e.path.clone()).collect();

    log.undo().unwrap();
    log.undo().unwrap();
    log.commit(&with_catchability(&base, 0.9)).unwrap();

    assert_eq!(log.len(), 2);
    assert_eq!(log.cursor(), 2);
    assert_eq!(log.redo().unwrap(), LogStep::NothingToRedo);
    assert!(forward.iter().all(|p| !p.exists()));
    assert_eq!(log.current().unwrap().species[0].gear.catchability, 0.9);
    assert!(log.entries()[1].seq > log.entries()[0].seq);
}

#[test]
fn faulting_stage_leaves_the_log_untouched() {
    let tmp = TempDir::new().unwrap();
    let mut log = SnapshotLog::open(tmp.path()).unwrap();
    let mut start = herring();
    start.species[0].params.age_mat = Some(2.0);
    log.initialize(&start).unwrap();
    let before = log.current().unwrap();

    let mut stages = standard_stages(Vec::new(), Arc::new(GridSearchOptimizer::default()));
    stages.retain(|s| s.stage() == Stage::Growth);
    stages.push(Box::new(Inflate));
    let pipeline = MatchPipeline::new(stages);

    let request = MatchRequest::new("herring", [Stage::Growth, Stage::Consumption]);
    let failure = pipeline.run_and_commit(&mut log, &request).unwrap_err();
    assert_eq!(failure.stage, Some(Stage::Consumption));
    assert_eq!(failure.kind, "consistency");
    assert_eq!(log.len(), 1);
    assert_eq!(log.current().unwrap(), before);
}

#[test]
fn catch_and_yield_run_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let mut log = SnapshotLog::open(tmp.path()).unwrap();
    let mut start = herring();
    let target = total_yield(&start.species[0], &start.grid) * 0.8;
    start.species[0].params.yield_observed = Some(target);
    log.initialize(&start).unwrap();

    let rows: Vec<ObservationRow> = [(80.0, 20.0, 5.0), (100.0, 20.0, 20.0), (120.0, 20.0, 35.0), (140.0, 40.0, 12.0)]
        .into_iter()
        .map(|(length, width, count)| ObservationRow {
            species: Some("herring".into()),
            gear: Some("pelagic trawl".into()),
            length,
            width,
            count,
            unit: LengthUnit::Mm,
        })
        .collect();
    let optimizer = GridSearchOptimizer {
        l50_steps: 12,
        ratio_steps: 4,
        catchability_steps: 5,
        ..GridSearchOptimizer::default()
    };
    let pipeline = MatchPipeline::new(standard_stages(rows, Arc::new(optimizer)));
    let request = MatchRequest::new("herring", [Stage::Yield, Stage::Catch]);
    let report = pipeline.run_and_commit(&mut log, &request).unwrap();

    assert_eq!(report.applied(), 2);
    assert_eq!(report.records[0].stage, Stage::Catch);
    assert_eq!(log.len(), 2);

    let current = log.current().unwrap();
    let state = &current.species[0];
    let yield_now = total_yield(state, &current.grid);
    assert!((yield_now - target).abs() <= 1e-6 * target);
    let biomass = cutoff_biomass(&state.params, &current.grid, &state.abundance);
    assert!((biomass - 2e5).abs() <= 1e-9 * 2e5);
    let Selectivity::SigmoidLength { l50, l25 } = state.gear.selectivity else {
        panic!("catch stage writes a sigmoid gear");
    };
    assert!(l25 < l50 && (8.0..=18.0).contains(&l50), "l50 {l50}");
}

#[test]
fn reopened_session_continues_where_it_stopped() {
    let tmp = TempDir::new().unwrap();
    let base = herring();
    let expected = {
        let mut log = SnapshotLog::open(tmp.path()).unwrap();
        log.initialize(&base).unwrap();
        log.commit(&with_catchability(&base, 0.5)).unwrap();
        log.commit(&with_catchability(&base, 0.6)).unwrap();
        moved(log.undo().unwrap())
    };

    let mut log = SnapshotLog::open(tmp.path()).unwrap();
    assert_eq!(log.initialize(&base).unwrap(), expected);
    assert_eq!(moved(log.redo().unwrap()).species[0].gear.catchability, 0.6);
    assert_eq!(log.rewind_to_start().unwrap(), base.with_changed(false));
}

#[test]
fn close_removes_every_artifact() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("session");
    let mut log = SnapshotLog::open(&dir).unwrap();
    let base = log.initialize(&herring()).unwrap();
    log.commit(&with_catchability(&base, 0.5)).unwrap();
    log.close().unwrap();
    assert!(!dir.exists());
    assert!(SnapshotLog::open(&dir).unwrap().is_empty());
    assert!(!dir.exists());
}
