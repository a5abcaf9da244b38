//! Exports for inspection outside the tool.
//!
//! - atomic bins and interpolation edges as CSV
//! - optimizer payloads as JSON

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::align::AlignedBins;
use crate::error::{MatchError, Result};
use crate::objective::ObjectiveData;

fn create(path: &Path, what: &str) -> Result<File> {
    File::create(path).map_err(|e| {
        MatchError::validation(format!("failed to create {what} '{}': {e}", path.display()))
    })
}

/// One line per atomic bin: `bin,l_start,l_end,w_start,w_end,count`.
pub fn write_bins_csv(path: &Path, aligned: &AlignedBins) -> Result<()> {
    let mut file = create(path, "bins CSV")?;
    writeln!(file, "bin,l_start,l_end,w_start,w_end,count")?;
    for (i, b) in aligned.bins.iter().enumerate() {
        writeln!(
            file,
            "{i},{:.6},{:.6},{:.10},{:.10},{}",
            b.l_start, b.l_end, b.w_start, b.w_end, b.count
        )?;
    }
    Ok(())
}

/// One line per edge; `segment` is an index into the restricted grid, and
/// `grid_index` the matching index into the full grid.
pub fn write_edges_csv(path: &Path, aligned: &AlignedBins) -> Result<()> {
    let mut file = create(path, "edges CSV")?;
    writeln!(file, "bin,segment,grid_index,left,right")?;
    for e in &aligned.edges {
        writeln!(
            file,
            "{},{},{},{:.12},{:.12}",
            e.bin,
            e.segment,
            aligned.grid_range.start + e.segment,
            e.left,
            e.right
        )?;
    }
    Ok(())
}

pub fn write_objective_json(path: &Path, data: &ObjectiveData) -> Result<()> {
    let file = create(path, "objective JSON")?;
    serde_json::to_writer_pretty(file, data)
        .map_err(|e| MatchError::Internal(format!("failed to write objective JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_observations;
    use crate::test_support::{cod_rows, cod_snapshot, COD};
    use tempfile::TempDir;

    #[test]
    fn bins_csv_has_one_line_per_bin() {
        let snapshot = cod_snapshot();
        let aligned =
            align_observations(&snapshot.species[COD].params, &snapshot.grid, &cod_rows()).unwrap();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bins.csv");
        write_bins_csv(&path, &aligned).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), aligned.bins.len() + 1);
        assert!(text.starts_with("bin,l_start"));
    }
}
