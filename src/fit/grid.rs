//! Candidate grid generation.
//!
//! The bundled optimizer is a deterministic grid search, so every candidate
//! axis is built here:
//!
//! - `lin_space` for l50 and the l25/l50 ratio
//! - `log_space` for catchability and for weight grids
//!
//! Both include their endpoints exactly.

use crate::error::{MatchError, Result};

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(MatchError::validation(format!(
            "invalid log range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(MatchError::validation("grid steps must be >= 2"));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints; exp(ln(x)) is not always x.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn lin_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(MatchError::validation(format!(
            "invalid linear range: min={min}, max={max}"
        )));
    }
    if steps < 2 {
        return Err(MatchError::validation("grid steps must be >= 2"));
    }

    let step = (max - min) / (steps as f64 - 1.0);
    let mut out: Vec<f64> = (0..steps).map(|i| min + step * i as f64).collect();
    out[steps - 1] = max;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[v.len() - 1], 10.0);
        assert!((v[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lin_space_is_increasing() {
        let v = lin_space(-1.0, 1.0, 9).unwrap();
        assert!(v.windows(2).all(|p| p[1] > p[0]));
        assert_eq!(v[8], 1.0);
    }

    #[test]
    fn degenerate_ranges_are_rejected() {
        assert!(log_space(0.0, 1.0, 4).is_err());
        assert!(lin_space(1.0, 1.0, 4).is_err());
        assert!(lin_space(0.0, 1.0, 1).is_err());
    }
}
