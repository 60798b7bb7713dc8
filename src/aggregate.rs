// src/aggregate.rs - Merge per-image length tables into one combined table

use std::fs;
use std::path::{Path, PathBuf};

use csv::Reader;
use serde::Deserialize;

use crate::errors::{NanotubeError, Result};
use crate::output::{write_length_column, LENGTH_COLUMN};

/// File-name ending of per-image length tables
pub const LENGTHS_SUFFIX: &str = "_lengths.csv";

/// One row of a length table; the index column is ignored
#[derive(Debug, Deserialize)]
struct LengthRow {
    #[serde(rename = "lengths (micron)")]
    microns: f64,
}

/// Outcome of a merge
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub output: PathBuf,
    pub tables: usize,
    pub rows: usize,
}

/// Per-image length tables in `dir`, sorted by name, optionally restricted to
/// names starting with `prefix`
pub fn find_length_tables<P: AsRef<Path>>(dir: P, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(NanotubeError::InvalidPath(dir.to_path_buf()));
    }

    let mut tables = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file()
            && name.ends_with(LENGTHS_SUFFIX)
            && prefix.map_or(true, |p| name.starts_with(p))
        {
            tables.push(path);
        }
    }

    tables.sort();
    Ok(tables)
}

/// Shared name prefix of a table: its stem minus the last two `_` parts
/// (`run3_img01_lengths.csv` -> `run3`)
pub fn derive_prefix(table: &Path) -> String {
    let stem = table.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() <= 2 {
        return String::new();
    }
    parts[..parts.len() - 2].join("_")
}

/// Read the micron column of one length table
pub fn read_length_table<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let mut reader = Reader::from_path(path)?;

    let headers = reader.headers()?;
    if !headers.iter().any(|h| h == LENGTH_COLUMN) {
        return Err(NanotubeError::Config(format!(
            "{} has no '{}' column",
            path.display(),
            LENGTH_COLUMN
        )));
    }

    let mut values = Vec::new();
    for row in reader.deserialize::<LengthRow>() {
        values.push(row?.microns);
    }
    Ok(values)
}

/// Concatenate every length table in `dir` row-wise, re-index from zero and
/// write `<prefix>_allLengths.csv` into `output_dir` (default: `dir`)
pub fn concat_length_tables<P: AsRef<Path>>(
    dir: P,
    prefix: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<AggregateSummary> {
    let dir = dir.as_ref();
    let tables = find_length_tables(dir, prefix)?;
    let Some(first) = tables.first() else {
        return Err(NanotubeError::NoLengthTables(dir.to_path_buf()));
    };

    let name_prefix = match prefix {
        Some(p) => p.trim_end_matches('_').to_string(),
        None => derive_prefix(first),
    };
    let file_name = if name_prefix.is_empty() {
        "allLengths.csv".to_string()
    } else {
        format!("{}_allLengths.csv", name_prefix)
    };
    let output = output_dir.unwrap_or(dir).join(file_name);

    let mut combined = Vec::new();
    for table in &tables {
        let values = read_length_table(table)?;
        log::debug!("{}: {} rows", table.display(), values.len());
        combined.extend(values);
    }

    write_length_column(&output, combined.iter().copied())?;
    log::info!(
        "Merged {} tables ({} rows) into {}",
        tables.len(),
        combined.len(),
        output.display()
    );

    Ok(AggregateSummary {
        output,
        tables: tables.len(),
        rows: combined.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lengths::LengthRecord;
    use crate::output::write_lengths_csv;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("nanotube_aggregate_{}_{}", name, std::process::id()));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(microns: f64) -> LengthRecord {
        LengthRecord { label: 1, pixels: microns * 10.0, microns }
    }

    #[test]
    fn prefix_drops_last_two_parts() {
        assert_eq!(derive_prefix(Path::new("run3_img01_lengths.csv")), "run3");
        assert_eq!(derive_prefix(Path::new("a_b_c_lengths.csv")), "a_b");
        assert_eq!(derive_prefix(Path::new("img_lengths.csv")), "");
    }

    #[test]
    fn merges_tables_and_reindexes() {
        let dir = scratch_dir("merge");
        write_lengths_csv(&[record(1.5), record(2.25)], &dir, "exp_a1").unwrap();
        write_lengths_csv(&[record(4.0)], &dir, "exp_b2").unwrap();
        fs::write(dir.join("notes.csv"), "index,lengths (micron)\n0,99\n").unwrap();

        let summary = concat_length_tables(&dir, None, None).unwrap();
        assert_eq!(summary.tables, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.output, dir.join("exp_allLengths.csv"));

        let merged = read_length_table(&summary.output).unwrap();
        assert_eq!(merged, vec![1.5, 2.25, 4.0]);

        let text = fs::read_to_string(&summary.output).unwrap();
        assert_eq!(text.lines().nth(3), Some("2,4.000000"));

        // The combined table is not picked up again
        let again = concat_length_tables(&dir, None, None).unwrap();
        assert_eq!(again.rows, 3);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn prefix_filter_limits_inputs() {
        let dir = scratch_dir("filter");
        write_lengths_csv(&[record(1.0)], &dir, "alpha_1").unwrap();
        write_lengths_csv(&[record(2.0), record(3.0)], &dir, "beta_1").unwrap();

        let summary = concat_length_tables(&dir, Some("beta"), None).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.output, dir.join("beta_allLengths.csv"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reads_tables_with_unnamed_index_column() {
        let dir = scratch_dir("pandas");
        fs::write(
            dir.join("old_s1_lengths.csv"),
            ",lengths (micron)\n0,0.5\n1,0.75\n",
        )
        .unwrap();
        assert_eq!(read_length_table(dir.join("old_s1_lengths.csv")).unwrap(), vec![0.5, 0.75]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = scratch_dir("empty");
        let err = concat_length_tables(&dir, None, None).unwrap_err();
        assert!(matches!(err, NanotubeError::NoLengthTables(_)));
        fs::remove_dir_all(&dir).ok();
    }
}
