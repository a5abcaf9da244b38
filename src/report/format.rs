//! Terminal formatting.
//!
//! Everything here returns a `String`; printing is the caller's business.

use crate::align::AlignedBins;
use crate::domain::{ModelSnapshot, Selectivity};
use crate::model::{cutoff_biomass, species_production, total_consumption, total_yield};
use crate::objective::ObjectiveData;
use crate::session::{PipelineReport, SnapshotLog, StageFailure};

/// Atomic bins of one species.
pub fn format_alignment(species: &str, aligned: &AlignedBins) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== alignment: {species} ===\n"));
    out.push_str(&format!(
        "Gear: {} | bins={} | grid points={}..{} | edges={} | total count={}\n\n",
        aligned.gear.as_deref().unwrap_or("-"),
        aligned.bins.len(),
        aligned.grid_range.start,
        aligned.grid_range.end,
        aligned.edges.len(),
        aligned.total_count()
    ));
    if aligned.bins.is_empty() {
        out.push_str("(no observations; count terms disabled)\n");
        return out;
    }

    push_row(
        &mut out,
        format!("{:>5} {:>10} {:>10} {:>14} {:>14} {:>10}", "bin", "l_start", "l_end", "w_start", "w_end", "count"),
    );
    push_row(
        &mut out,
        format!("{:-<5} {:-<10} {:-<10} {:-<14} {:-<14} {:-<10}", "", "", "", "", "", ""),
    );
    for (i, b) in aligned.bins.iter().enumerate() {
        push_row(
            &mut out,
            format!(
                "{i:>5} {:>10.3} {:>10.3} {:>14.6} {:>14.6} {:>10}",
                b.l_start, b.l_end, b.w_start, b.w_end, b.count
            ),
        );
    }
    out
}

pub fn format_objective(data: &ObjectiveData) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== objective: {} ===\n", data.species));
    out.push_str(&format!(
        "Bins: {} (counts {}) | grid points: {} (active {}..{})\n",
        data.bins.len(),
        if data.counts_enabled() { "on" } else { "off" },
        data.w.len(),
        data.active.start,
        data.active.end
    ));
    out.push_str(&format!(
        "Cutoff: w >= {} | biomass = {:.6e}\n",
        data.w_cutoff, data.biomass_cutoff
    ));
    out.push_str(&format!(
        "Yield: observed={} lambda={}\n",
        fmt_target(data.yield_observed),
        data.yield_lambda
    ));
    out.push_str(&format!(
        "Production: observed={} lambda={}\n",
        fmt_target(data.production_observed),
        data.production_lambda
    ));
    out.push_str(&format!(
        "Start gear: {} q={}\n",
        fmt_selectivity(&data.selectivity),
        data.catchability
    ));
    out
}

/// Log position plus one line per species of the current snapshot.
pub fn format_status(log: &SnapshotLog, snapshot: &ModelSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== session: {} ===\n", log.dir().display()));
    out.push_str(&format!(
        "Entries: {} | cursor: {} | grid points: {}\n\n",
        log.len(),
        log.cursor(),
        snapshot.grid.len()
    ));

    push_row(
        &mut out,
        format!(
            "{:<16} {:>14} {:>14} {:>14} {:>14} {:<28} {:>8}",
            "species", "biomass", "yield", "production", "consumption", "gear", "q"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<16} {:-<14} {:-<14} {:-<14} {:-<14} {:-<28} {:-<8}",
            "", "", "", "", "", "", ""
        ),
    );
    for state in &snapshot.species {
        push_row(
            &mut out,
            format!(
                "{:<16} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e} {:<28} {:>8.4}",
                truncate(&state.params.name, 16),
                cutoff_biomass(&state.params, &snapshot.grid, &state.abundance),
                total_yield(state, &snapshot.grid),
                species_production(state, &snapshot.grid),
                total_consumption(state, &snapshot.grid),
                truncate(&fmt_selectivity(&state.gear.selectivity), 28),
                state.gear.catchability
            ),
        );
    }
    out
}

pub fn format_pipeline_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Matched {}: {} of {} stages applied\n",
        report.species,
        report.applied(),
        report.records.len()
    ));
    for r in &report.records {
        let status = if r.applied { "applied" } else { "skipped" };
        let note = if r.note.is_empty() {
            String::new()
        } else {
            format!(" ({})", r.note)
        };
        out.push_str(&format!(
            "- {:<12} {status:<8} biomass={:.6e}{note}\n",
            r.stage.name(),
            r.biomass
        ));
    }
    out
}

pub fn format_failure(failure: &StageFailure) -> String {
    let stage = failure.stage.map_or("-", |s| s.name());
    format!(
        "Match aborted, nothing committed.\n- stage: {stage}\n- kind: {}\n- message: {}\n",
        failure.kind, failure.message
    )
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_target(v: f64) -> String {
    if v > 0.0 {
        format!("{v:.6e}")
    } else {
        "-".to_string()
    }
}

fn fmt_selectivity(s: &Selectivity) -> String {
    match s {
        Selectivity::KnifeEdge { knife_edge_size } => format!("knife_edge(w={knife_edge_size:.3})"),
        Selectivity::SigmoidLength { l50, l25 } => format!("sigmoid(l50={l50:.2}, l25={l25:.2})"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
