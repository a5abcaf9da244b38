//! Observation bin alignment.
//!
//! Turns the raw length bins of one species into:
//!
//! - a gapless set of atomic bins covering the viable length range
//!   (gaps and the two guard ranges carry a zero count)
//! - the minimal grid index range bracketing those bins
//! - interpolation edges from that grid range onto the bins
//!
//! Nothing here is cached: the output is a pure function of the inputs.

use std::ops::Range;

use tracing::debug;

use crate::align::interp::interpolation_edges;
use crate::domain::{AtomicBin, InterpolationEdge, ObservationRow, SpeciesParams, WeightGrid};
use crate::error::{MatchError, Result};
use crate::model::{length_at, weight_at};

/// Relative slack allowed when comparing an observed bin's top weight to `w_max`.
const MAX_WEIGHT_SLACK: f64 = 1e-9;

/// Alignment output for one species.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedBins {
    pub bins: Vec<AtomicBin>,
    /// Index range into the snapshot grid; edges index into this sub-range.
    pub grid_range: Range<usize>,
    pub edges: Vec<InterpolationEdge>,
    pub gear: Option<String>,
}

impl AlignedBins {
    /// `false` when there were no observations; count terms must then be disabled.
    pub fn counts_enabled(&self) -> bool {
        !self.bins.is_empty()
    }

    pub fn counts(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.count).collect()
    }

    pub fn total_count(&self) -> f64 {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// A normalized length bin `[start, end)` in centimetres.
#[derive(Debug, Clone, Copy)]
struct LengthBin {
    start: f64,
    end: f64,
    count: f64,
}

/// Align the observation rows of one species onto its weight grid.
pub fn align_observations(
    params: &SpeciesParams,
    grid: &WeightGrid,
    rows: &[ObservationRow],
) -> Result<AlignedBins> {
    let gear = single_gear(rows)?;

    if rows.is_empty() {
        let grid_range = bracket(&grid.w, params.w_min, params.w_max);
        debug!(species = %params.name, ?grid_range, "no observations, count terms disabled");
        return Ok(AlignedBins {
            bins: Vec::new(),
            grid_range,
            edges: Vec::new(),
            gear,
        });
    }

    let mut observed = normalize_rows(rows)?;
    observed.sort_by(|a, b| a.start.total_cmp(&b.start));
    check_overlaps(&observed)?;
    check_max_weight(params, &observed)?;

    let l_min = length_at(params, params.w_min);
    let l_max = length_at(params, params.w_max);
    let observed = clip_below(params, observed, l_min)?;

    let mut all = observed.clone();
    let first_start = observed[0].start;
    let last_end = observed[observed.len() - 1].end;
    if first_start > l_min {
        all.push(LengthBin {
            start: l_min,
            end: first_start,
            count: 0.0,
        });
    }
    if l_max > last_end {
        all.push(LengthBin {
            start: last_end,
            end: l_max,
            count: 0.0,
        });
    }

    let edges_l = atomic_edges(&all);
    let counts = assign_counts(&edges_l, &all)?;

    // The viable length extremes map back to the exact weight bounds.
    let to_weight = |l: f64| {
        if l == l_min {
            params.w_min
        } else if l == l_max {
            params.w_max
        } else {
            weight_at(params, l)
        }
    };

    let bins: Vec<AtomicBin> = edges_l
        .windows(2)
        .zip(counts)
        .map(|(pair, count)| AtomicBin {
            l_start: pair[0],
            l_end: pair[1],
            w_start: to_weight(pair[0]),
            w_end: to_weight(pair[1]),
            count,
        })
        .collect();

    let w_lo = bins[0].w_start;
    let w_hi = bins[bins.len() - 1].w_end;
    let grid_range = bracket(&grid.w, w_lo, w_hi);
    let edges = interpolation_edges(&bins, &grid.w[grid_range.clone()]);

    debug!(
        species = %params.name,
        observed = observed.len(),
        atomic = bins.len(),
        edges = edges.len(),
        ?grid_range,
        "aligned observation bins"
    );

    Ok(AlignedBins {
        bins,
        grid_range,
        edges,
        gear,
    })
}

fn single_gear(rows: &[ObservationRow]) -> Result<Option<String>> {
    let mut gear: Option<&str> = None;
    for row in rows {
        if let Some(g) = row.gear.as_deref() {
            match gear {
                None => gear = Some(g),
                Some(seen) if seen != g => {
                    return Err(MatchError::validation(format!(
                        "observations mix gears '{seen}' and '{g}'; supply one gear per species"
                    )));
                }
                Some(_) => {}
            }
        }
    }
    Ok(gear.map(str::to_string))
}

fn normalize_rows(rows: &[ObservationRow]) -> Result<Vec<LengthBin>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if !(row.length.is_finite() && row.length >= 0.0) {
                return Err(MatchError::validation(format!(
                    "observation {}: length must be finite and >= 0 (got {})",
                    i + 1,
                    row.length
                )));
            }
            if !(row.width.is_finite() && row.width > 0.0) {
                return Err(MatchError::validation(format!(
                    "observation {}: width must be finite and > 0 (got {})",
                    i + 1,
                    row.width
                )));
            }
            if !(row.count.is_finite() && row.count >= 0.0) {
                return Err(MatchError::validation(format!(
                    "observation {}: count must be finite and >= 0 (got {})",
                    i + 1,
                    row.count
                )));
            }
            // Edges are formed in the input unit and scaled once, so bins that
            // touch in millimetres still touch in centimetres.
            let div = row.unit.divisor();
            Ok(LengthBin {
                start: row.length / div,
                end: (row.length + row.width) / div,
                count: row.count,
            })
        })
        .collect()
}

fn check_overlaps(sorted: &[LengthBin]) -> Result<()> {
    for pair in sorted.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(MatchError::validation(format!(
                "observation bins overlap: [{}, {}) and [{}, {})",
                pair[0].start, pair[0].end, pair[1].start, pair[1].end
            )));
        }
    }
    Ok(())
}

fn check_max_weight(params: &SpeciesParams, sorted: &[LengthBin]) -> Result<()> {
    let top = sorted
        .iter()
        .map(|b| b.end)
        .fold(f64::NEG_INFINITY, f64::max);
    let w_top = weight_at(params, top);
    if w_top > params.w_max * (1.0 + MAX_WEIGHT_SLACK) {
        return Err(MatchError::validation(format!(
            "species '{}': observed length {top} cm implies weight {w_top} g above w_max = {} g",
            params.name, params.w_max
        )));
    }
    Ok(())
}

/// Clip bins at `l_min`. Counts of bins lying wholly below it move onto the
/// bin starting at `l_min`, which is created when no observed bin starts there.
fn clip_below(params: &SpeciesParams, sorted: Vec<LengthBin>, l_min: f64) -> Result<Vec<LengthBin>> {
    let mut spill = 0.0;
    let mut dropped = 0usize;
    let mut kept = Vec::with_capacity(sorted.len());
    for mut bin in sorted {
        if bin.end <= l_min {
            spill += bin.count;
            dropped += 1;
            continue;
        }
        bin.start = bin.start.max(l_min);
        kept.push(bin);
    }

    let Some(first) = kept.first_mut() else {
        return Err(MatchError::validation(format!(
            "species '{}': every observation lies below the viable length {l_min} cm (w_min = {} g)",
            params.name, params.w_min
        )));
    };
    if dropped > 0 {
        debug!(species = %params.name, dropped, spill, "folded bins below w_min into the first bin");
        if first.start == l_min {
            first.count += spill;
        } else {
            let end = first.start;
            kept.insert(
                0,
                LengthBin {
                    start: l_min,
                    end,
                    count: spill,
                },
            );
        }
    }
    Ok(kept)
}

fn atomic_edges(bins: &[LengthBin]) -> Vec<f64> {
    let mut edges: Vec<f64> = bins.iter().flat_map(|b| [b.start, b.end]).collect();
    edges.sort_by(|a, b| a.total_cmp(b));
    edges.dedup();
    edges
}

/// Count per atomic bin; every input bin must coincide with exactly one atomic bin.
fn assign_counts(edges: &[f64], bins: &[LengthBin]) -> Result<Vec<f64>> {
    let mut counts = vec![0.0; edges.len().saturating_sub(1)];
    for bin in bins {
        let idx = edges
            .binary_search_by(|e| e.total_cmp(&bin.start))
            .ok()
            .filter(|&i| i + 1 < edges.len() && edges[i + 1] == bin.end)
            .ok_or_else(|| {
                MatchError::Internal(format!(
                    "bin [{}, {}) does not map onto an atomic bin",
                    bin.start, bin.end
                ))
            })?;
        counts[idx] += bin.count;
    }
    Ok(counts)
}

/// Minimal index range of `w` whose extremes bracket `[lo, hi]`, clamped to the grid.
pub fn bracket(w: &[f64], lo: f64, hi: f64) -> Range<usize> {
    if w.is_empty() {
        return 0..0;
    }
    let start = w.partition_point(|&x| x <= lo).saturating_sub(1);
    let mut end = w.partition_point(|&x| x < hi).min(w.len() - 1);
    if end <= start {
        end = (start + 1).min(w.len() - 1);
    }
    start..end + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LengthUnit;
    use crate::test_support::{cod_snapshot, COD};

    fn row(length: f64, width: f64, count: f64) -> ObservationRow {
        ObservationRow {
            species: None,
            gear: None,
            length,
            width,
            count,
            unit: LengthUnit::Cm,
        }
    }

    /// `w = l` so lengths and weights coincide.
    fn identity_params() -> SpeciesParams {
        let mut params = crate::test_support::cod_params();
        params.a = 1.0;
        params.b = 1.0;
        params.w_min = 0.0;
        params.w_max = 10.0;
        params.w_mat = 5.0;
        params
    }

    fn unit_grid() -> WeightGrid {
        WeightGrid::from_points((0..=10).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn fills_gaps_and_appends_guard_bin() {
        let rows = [row(0.0, 2.0, 5.0), row(4.0, 2.0, 3.0)];
        let aligned = align_observations(&identity_params(), &unit_grid(), &rows).unwrap();

        let got: Vec<(f64, f64, f64)> = aligned
            .bins
            .iter()
            .map(|b| (b.l_start, b.l_end, b.count))
            .collect();
        assert_eq!(
            got,
            vec![(0.0, 2.0, 5.0), (2.0, 4.0, 0.0), (4.0, 6.0, 3.0), (6.0, 10.0, 0.0)]
        );
        assert_eq!(aligned.grid_range, 0..11);
    }

    #[test]
    fn counts_are_conserved_and_bins_tile_viable_range() {
        let snapshot = cod_snapshot();
        let params = &snapshot.species[COD].params;
        let rows = [
            row(12.0, 2.0, 4.0),
            row(20.0, 5.0, 17.0),
            row(25.0, 5.0, 9.0),
            row(40.0, 10.0, 2.0),
        ];
        let aligned = align_observations(params, &snapshot.grid, &rows).unwrap();

        assert_eq!(aligned.total_count(), 32.0);
        assert_eq!(aligned.bins[0].w_start, params.w_min);
        assert_eq!(aligned.bins[aligned.bins.len() - 1].w_end, params.w_max);
        for pair in aligned.bins.windows(2) {
            assert_eq!(pair[0].w_end, pair[1].w_start);
            assert!(pair[0].w_start < pair[0].w_end);
        }
    }

    #[test]
    fn millimetre_rows_are_normalized() {
        let mut a = row(120.0, 10.0, 1.0);
        a.unit = LengthUnit::Mm;
        let mut b = row(130.0, 10.0, 2.0);
        b.unit = LengthUnit::Mm;

        let snapshot = cod_snapshot();
        let aligned =
            align_observations(&snapshot.species[COD].params, &snapshot.grid, &[a, b]).unwrap();
        let observed: Vec<_> = aligned.bins.iter().filter(|b| b.count > 0.0).collect();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0].l_start, 12.0);
        assert_eq!(observed[0].l_end, observed[1].l_start);
        assert_eq!(observed[1].l_end, 14.0);
    }

    #[test]
    fn no_observations_disable_counts() {
        let snapshot = cod_snapshot();
        let aligned = align_observations(&snapshot.species[COD].params, &snapshot.grid, &[]).unwrap();
        assert!(!aligned.counts_enabled());
        assert!(aligned.edges.is_empty());
        assert_eq!(aligned.grid_range, 0..snapshot.grid.len());
    }

    #[test]
    fn overlapping_bins_are_rejected() {
        let rows = [row(0.0, 3.0, 1.0), row(2.0, 2.0, 1.0)];
        let err = align_observations(&identity_params(), &unit_grid(), &rows).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }

    #[test]
    fn mixed_gears_are_rejected() {
        let mut a = row(0.0, 1.0, 1.0);
        a.gear = Some("trawl".into());
        let mut b = row(2.0, 1.0, 1.0);
        b.gear = Some("gillnet".into());
        let err = align_observations(&identity_params(), &unit_grid(), &[a, b]).unwrap_err();
        assert!(err.to_string().contains("mix gears"));
    }

    #[test]
    fn observations_above_max_weight_are_rejected() {
        let rows = [row(8.0, 4.0, 1.0)];
        let err = align_observations(&identity_params(), &unit_grid(), &rows).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }

    #[test]
    fn bin_straddling_w_min_is_clipped() {
        let snapshot = cod_snapshot();
        let params = &snapshot.species[COD].params;
        let aligned = align_observations(params, &snapshot.grid, &[row(0.2, 1.0, 4.0)]).unwrap();

        let first = &aligned.bins[0];
        assert_eq!(first.w_start, params.w_min);
        assert_eq!(first.l_end, 1.2);
        assert_eq!(first.count, 4.0);
        assert_eq!(aligned.bins[aligned.bins.len() - 1].w_end, params.w_max);
    }

    #[test]
    fn bins_below_w_min_fold_into_first_bin() {
        let snapshot = cod_snapshot();
        let params = &snapshot.species[COD].params;
        let rows = [row(0.1, 0.2, 2.0), row(1.0, 1.0, 3.0)];
        let aligned = align_observations(params, &snapshot.grid, &rows).unwrap();

        assert_eq!(aligned.total_count(), 5.0);
        assert_eq!(aligned.bins[0].w_start, params.w_min);
        assert_eq!(aligned.bins[0].l_end, 1.0);
        assert_eq!(aligned.bins[0].count, 2.0);
        assert_eq!(aligned.bins[1].count, 3.0);
        for pair in aligned.bins.windows(2) {
            assert_eq!(pair[0].w_end, pair[1].w_start);
        }
    }

    #[test]
    fn observations_wholly_below_w_min_are_rejected() {
        let snapshot = cod_snapshot();
        let params = &snapshot.species[COD].params;
        let err = align_observations(params, &snapshot.grid, &[row(0.1, 0.2, 2.0)]).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }

    #[test]
    fn bracket_is_minimal_and_clamped() {
        let w = [1.0, 2.0, 4.0, 8.0, 16.0];
        assert_eq!(bracket(&w, 2.5, 7.0), 1..4);
        assert_eq!(bracket(&w, 2.0, 8.0), 1..4);
        assert_eq!(bracket(&w, 0.5, 20.0), 0..5);
    }
}
