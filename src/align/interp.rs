//! Interpolation weights between the weight grid and atomic bins.
//!
//! The model density is only known at grid points. Treating it as piecewise
//! linear between points, the integral over an atomic bin is a sum over the
//! grid segments the bin overlaps:
//!
//! ```text
//! ∫_bin f(w) dw = Σ_j  left_j * f(w_j) + right_j * f(w_{j+1})
//! left_j  = L * (1 - mean)
//! right_j = L * mean
//! ```
//!
//! where `L` is the overlap length and `mean` the average of the overlap's
//! endpoint positions within the segment (0 at `w_j`, 1 at `w_{j+1}`).
//!
//! Bins and grid are both sorted, so a single sweep visits each
//! (bin, segment) pair with positive overlap once.

use nalgebra::DMatrix;

use crate::domain::{AtomicBin, InterpolationEdge};

/// Sparse interpolation edges for `bins` over grid points `w`.
///
/// Segment ids are indices into `w`. Parts of a bin outside `[w[0], w[last]]`
/// contribute nothing.
pub fn interpolation_edges(bins: &[AtomicBin], w: &[f64]) -> Vec<InterpolationEdge> {
    let mut out = Vec::new();
    if w.len() < 2 {
        return out;
    }
    let last_segment = w.len() - 2;

    let mut seg = 0usize;
    for (bin_idx, bin) in bins.iter().enumerate() {
        while seg < last_segment && w[seg + 1] <= bin.w_start {
            seg += 1;
        }

        let mut j = seg;
        while j <= last_segment && w[j] < bin.w_end {
            let lo = bin.w_start.max(w[j]);
            let hi = bin.w_end.min(w[j + 1]);
            let overlap = hi - lo;
            if overlap > 0.0 {
                let width = w[j + 1] - w[j];
                let p1 = (lo - w[j]) / width;
                let p2 = (hi - w[j]) / width;
                let mean = 0.5 * (p1 + p2);
                out.push(InterpolationEdge {
                    bin: bin_idx,
                    segment: j,
                    left: overlap * (1.0 - mean),
                    right: overlap * mean,
                });
            }
            j += 1;
        }
    }
    out
}

/// Apply the edges to a density sampled at the grid points.
pub fn integrate_bins(edges: &[InterpolationEdge], n_bins: usize, density: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; n_bins];
    for e in edges {
        out[e.bin] += e.left * density[e.segment] + e.right * density[e.segment + 1];
    }
    out
}

/// Dense `n_bins × n_points` operator equivalent to [`integrate_bins`].
pub fn interpolation_operator(
    edges: &[InterpolationEdge],
    n_bins: usize,
    n_points: usize,
) -> DMatrix<f64> {
    let mut m = DMatrix::<f64>::zeros(n_bins, n_points);
    for e in edges {
        m[(e.bin, e.segment)] += e.left;
        m[(e.bin, e.segment + 1)] += e.right;
    }
    m
}
