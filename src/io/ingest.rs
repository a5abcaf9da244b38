//! Observation table ingest.
//!
//! Reads catch-at-length CSVs into [`ObservationRow`]s.
//!
//! - **Columns**: `species?`, `gear?`, `length`, `dl` or `width`,
//!   `count` or `number`, `unit?` (`cm` / `mm`, default `cm`)
//! - **Headers** are matched case-insensitively, with a UTF-8 BOM stripped
//! - **Strict rows**: the first unparsable row fails the whole table with its
//!   line number; bin geometry is checked later by the aligner

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::domain::{LengthUnit, ObservationRow};
use crate::error::{MatchError, Result};

/// Parsed observation table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    pub rows: Vec<ObservationRow>,
}

impl ObservationTable {
    /// Rows for `species`, plus rows without a species column.
    pub fn for_species(&self, species: &str) -> Vec<ObservationRow> {
        self.rows
            .iter()
            .filter(|r| r.species.as_deref().is_none_or(|s| s == species))
            .cloned()
            .collect()
    }

    /// Distinct species named in the table.
    pub fn species(&self) -> BTreeSet<String> {
        self.rows.iter().filter_map(|r| r.species.clone()).collect()
    }

    pub fn total_count(&self) -> f64 {
        self.rows.iter().map(|r| r.count).sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    species: Option<usize>,
    gear: Option<usize>,
    length: usize,
    width: usize,
    count: usize,
    unit: Option<usize>,
}

pub fn load_observations(path: &Path) -> Result<ObservationTable> {
    let file = File::open(path).map_err(|e| {
        MatchError::validation(format!("failed to open observations '{}': {e}", path.display()))
    })?;
    let table = read_observations(file)?;
    debug!(path = %path.display(), rows = table.rows.len(), "observations loaded");
    Ok(table)
}

pub fn read_observations<R: Read>(input: R) -> Result<ObservationTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| MatchError::validation(format!("failed to read CSV headers: {e}")))?
        .clone();
    let columns = resolve_columns(&build_header_map(&headers))?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; lines are 1-based.
        let line = idx + 2;
        let record =
            result.map_err(|e| MatchError::validation(format!("line {line}: CSV parse error: {e}")))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let row = parse_row(&record, &columns)
            .map_err(|message| MatchError::validation(format!("line {line}: {message}")))?;
        rows.push(row);
    }
    Ok(ObservationTable { rows })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_columns(header_map: &HashMap<String, usize>) -> Result<Columns> {
    let required = |names: &[&str]| -> Result<usize> {
        names
            .iter()
            .find_map(|n| header_map.get(*n).copied())
            .ok_or_else(|| {
                let wanted: Vec<String> = names.iter().map(|n| format!("`{n}`")).collect();
                MatchError::validation(format!("missing required column: {}", wanted.join(" or ")))
            })
    };
    Ok(Columns {
        species: header_map.get("species").copied(),
        gear: header_map.get("gear").copied(),
        length: required(&["length"])?,
        width: required(&["dl", "width"])?,
        count: required(&["count", "number"])?,
        unit: header_map.get("unit").copied(),
    })
}

fn parse_row(record: &StringRecord, columns: &Columns) -> std::result::Result<ObservationRow, String> {
    let text = |idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let number = |idx: usize, name: &str| -> std::result::Result<f64, String> {
        let raw = record.get(idx).unwrap_or("");
        raw.parse::<f64>()
            .map_err(|_| format!("`{name}` is not a number: '{raw}'"))
    };

    let unit = match text(columns.unit) {
        Some(raw) => LengthUnit::parse(&raw).ok_or_else(|| format!("unknown unit '{raw}'"))?,
        None => LengthUnit::Cm,
    };

    Ok(ObservationRow {
        species: text(columns.species),
        gear: text(columns.gear),
        length: number(columns.length, "length")?,
        width: number(columns.width, "dl")?,
        count: number(columns.count, "count")?,
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_aliases_and_bom() {
        let csv = "\u{feff}Species,Gear,LENGTH,width,Number,Unit\n\
                   cod,trawl,120,10,4,mm\n\
                   cod,trawl,13,1,2,\n";
        let table = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].unit, LengthUnit::Mm);
        assert_eq!(table.rows[1].unit, LengthUnit::Cm);
        assert_eq!(table.rows[0].species.as_deref(), Some("cod"));
        assert_eq!(table.total_count(), 6.0);
    }

    #[test]
    fn missing_count_column_is_reported() {
        let err = read_observations("length,dl\n1,2\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("`count` or `number`"));
    }

    #[test]
    fn bad_number_names_the_line() {
        let csv = "length,dl,count\n10,2,3\n12,two,1\n";
        let err = read_observations(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn species_filter_keeps_unlabelled_rows() {
        let csv = "species,length,dl,count\ncod,10,2,1\nhaddock,10,2,1\n,12,2,1\n";
        let table = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(table.for_species("cod").len(), 2);
        assert_eq!(table.species().len(), 2);
    }
}
