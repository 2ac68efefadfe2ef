// Primitives for reading the weekly CSV exports.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{debug, info};
use snafu::prelude::*;

use nh_surveillance::{
    Counts, RawRecord, ALL_BEDS, BINARY_COLUMNS, GEOLOCATION, OCCUPIED_BEDS, PROVIDER_NUMBER,
    PROVIDER_STATE, QA_CHECK, TOTAL_CONFIRMED, TOTAL_DEATHS, WEEKLY_CONFIRMED, WEEKLY_DEATHS,
    WEEK_ENDING,
};

use crate::dash::*;

/// Reads every file of the directory as a headered CSV export and
/// concatenates the rows, in sorted path order.
///
/// The first file fixes the column schema of the run; a later file with a
/// different header set fails the whole run, with no partial output.
pub fn load_directory(dir: &str) -> DashResult<Vec<RawRecord>> {
    let entries = fs::read_dir(dir).context(ReadingDataDirSnafu { path: dir })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    ensure!(!paths.is_empty(), EmptyDataDirSnafu { path: dir });

    let mut records: Vec<RawRecord> = Vec::new();
    let mut run_schema: Option<(String, BTreeSet<String>)> = None;
    for path in &paths {
        read_file(path, &mut run_schema, &mut records)?;
    }
    info!(
        "load_directory: {} raw records from {} files",
        records.len(),
        paths.len()
    );
    Ok(records)
}

// The resolved positions of the non-survey columns.
struct CoreColumns {
    week_ending: usize,
    provider_number: usize,
    provider_state: usize,
    geolocation: usize,
    passed_qa: usize,
    all_beds: usize,
    occupied_beds: usize,
    weekly_confirmed: usize,
    total_confirmed: usize,
    weekly_deaths: usize,
    total_deaths: usize,
}

impl CoreColumns {
    fn resolve(index: &HashMap<&str, usize>, path: &str) -> DashResult<CoreColumns> {
        Ok(CoreColumns {
            week_ending: column(index, WEEK_ENDING, path)?,
            provider_number: column(index, PROVIDER_NUMBER, path)?,
            provider_state: column(index, PROVIDER_STATE, path)?,
            geolocation: column(index, GEOLOCATION, path)?,
            passed_qa: column(index, QA_CHECK, path)?,
            all_beds: column(index, ALL_BEDS, path)?,
            occupied_beds: column(index, OCCUPIED_BEDS, path)?,
            weekly_confirmed: column(index, WEEKLY_CONFIRMED, path)?,
            total_confirmed: column(index, TOTAL_CONFIRMED, path)?,
            weekly_deaths: column(index, WEEKLY_DEATHS, path)?,
            total_deaths: column(index, TOTAL_DEATHS, path)?,
        })
    }
}

fn read_file(
    path: &Path,
    run_schema: &mut Option<(String, BTreeSet<String>)>,
    out: &mut Vec<RawRecord>,
) -> DashResult<()> {
    let display = path.display().to_string();
    debug!("read_file: {}", display);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: display.clone(),
        })?;
    let headers = reader
        .headers()
        .context(CsvOpenSnafu {
            path: display.clone(),
        })?
        .clone();

    let header_set: BTreeSet<String> = headers.iter().map(|h| h.to_string()).collect();
    match run_schema {
        None => *run_schema = Some((display.clone(), header_set)),
        Some((first_path, schema)) => {
            ensure!(
                *schema == header_set,
                SchemaMismatchSnafu {
                    path: display.clone(),
                    first_path: first_path.clone(),
                }
            );
        }
    }

    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    let core = CoreColumns::resolve(&index, &display)?;
    let binary_idx: Vec<usize> = BINARY_COLUMNS
        .iter()
        .map(|&c| column(&index, c, &display))
        .collect::<DashResult<Vec<usize>>>()?;

    for (idx, line_r) in reader.into_records().enumerate() {
        // The header is line 1.
        let line_no = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {
            path: display.clone(),
        })?;
        out.push(to_raw_record(&line, &core, &binary_idx, &display, line_no)?);
    }
    Ok(())
}

fn column(index: &HashMap<&str, usize>, name: &str, path: &str) -> DashResult<usize> {
    index
        .get(name)
        .copied()
        .context(MissingColumnSnafu { path, column: name })
}

fn cell<'a>(line: &'a StringRecord, idx: usize) -> &'a str {
    line.get(idx).unwrap_or("")
}

// Count cells parse as floats; an empty cell counts as zero, anything
// non-numeric fails the run.
fn count_cell(
    line: &StringRecord,
    idx: usize,
    column: &str,
    path: &str,
    line_no: usize,
) -> DashResult<f64> {
    let raw = cell(line, idx).trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>().ok().context(BadCountSnafu {
        path,
        line: line_no,
        column,
        value: raw,
    })
}

fn to_raw_record(
    line: &StringRecord,
    core: &CoreColumns,
    binary_idx: &[usize],
    path: &str,
    line_no: usize,
) -> DashResult<RawRecord> {
    let geolocation = match cell(line, core.geolocation).trim() {
        "" => None,
        g => Some(g.to_string()),
    };
    let counts = Counts {
        all_beds: count_cell(line, core.all_beds, ALL_BEDS, path, line_no)?,
        occupied_beds: count_cell(line, core.occupied_beds, OCCUPIED_BEDS, path, line_no)?,
        weekly_confirmed: count_cell(line, core.weekly_confirmed, WEEKLY_CONFIRMED, path, line_no)?,
        total_confirmed: count_cell(line, core.total_confirmed, TOTAL_CONFIRMED, path, line_no)?,
        weekly_deaths: count_cell(line, core.weekly_deaths, WEEKLY_DEATHS, path, line_no)?,
        total_deaths: count_cell(line, core.total_deaths, TOTAL_DEATHS, path, line_no)?,
    };
    Ok(RawRecord {
        provider_number: cell(line, core.provider_number).to_string(),
        provider_state: cell(line, core.provider_state).to_string(),
        week_ending: cell(line, core.week_ending).to_string(),
        geolocation,
        passed_qa: cell(line, core.passed_qa).to_string(),
        counts,
        binary: binary_idx
            .iter()
            .map(|i| cell(line, *i).to_string())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_header() -> Vec<String> {
        let mut header: Vec<String> = [
            WEEK_ENDING,
            PROVIDER_NUMBER,
            PROVIDER_STATE,
            GEOLOCATION,
            QA_CHECK,
            ALL_BEDS,
            OCCUPIED_BEDS,
            WEEKLY_CONFIRMED,
            TOTAL_CONFIRMED,
            WEEKLY_DEATHS,
            TOTAL_DEATHS,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        header.extend(BINARY_COLUMNS.iter().map(|c| c.to_string()));
        header
    }

    fn small_row(week: &str, provider: &str, beds: &str) -> Vec<String> {
        let mut row = vec![
            week.to_string(),
            provider.to_string(),
            "CA".to_string(),
            "POINT (-118.2 34.0)".to_string(),
            "Y".to_string(),
            beds.to_string(),
            "10".to_string(),
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
        ];
        row.extend(std::iter::repeat("N".to_string()).take(BINARY_COLUMNS.len()));
        row
    }

    fn write_csv(path: &Path, rows: &[Vec<String>]) {
        let mut writer = csv::Writer::from_path(path).unwrap();
        for row in rows {
            writer.write_record(row).unwrap();
        }
        writer.flush().unwrap();
    }

    #[test]
    fn files_concatenate_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            &dir.path().join("b.csv"),
            &[small_header(), small_row("2020-05-31", "050002", "20")],
        );
        write_csv(
            &dir.path().join("a.csv"),
            &[small_header(), small_row("2020-05-24", "050001", "20")],
        );
        let records = load_directory(&dir.path().display().to_string()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].provider_number, "050001");
        assert_eq!(records[1].provider_number, "050002");
    }

    #[test]
    fn a_diverging_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            &dir.path().join("a.csv"),
            &[small_header(), small_row("2020-05-24", "050001", "20")],
        );
        let mut other_header = small_header();
        other_header.pop();
        other_header.push("An Unrelated Column".to_string());
        let mut other_row = small_row("2020-05-31", "050002", "20");
        other_row.pop();
        other_row.push("x".to_string());
        write_csv(&dir.path().join("b.csv"), &[other_header, other_row]);

        let err = load_directory(&dir.path().display().to_string()).unwrap_err();
        assert!(matches!(err, DashError::SchemaMismatch { .. }));
    }

    #[test]
    fn a_non_numeric_count_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            &dir.path().join("a.csv"),
            &[small_header(), small_row("2020-05-24", "050001", "plenty")],
        );
        let err = load_directory(&dir.path().display().to_string()).unwrap_err();
        match err {
            DashError::BadCount { line, column, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, ALL_BEDS);
                assert_eq!(value, "plenty");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn an_empty_count_reads_as_zero_and_empty_geolocation_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut row = small_row("2020-05-24", "050001", "");
        row[3] = "".to_string();
        write_csv(&dir.path().join("a.csv"), &[small_header(), row]);
        let records = load_directory(&dir.path().display().to_string()).unwrap();
        assert_eq!(records[0].counts.all_beds, 0.0);
        assert_eq!(records[0].geolocation, None);
    }

    #[test]
    fn an_empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_directory(&dir.path().display().to_string()).unwrap_err();
        assert!(matches!(err, DashError::EmptyDataDir { .. }));
    }
}
