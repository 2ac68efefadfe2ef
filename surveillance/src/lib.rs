mod schema;
use log::{debug, info};

use std::collections::BTreeMap;

use chrono::NaiveDate;

pub use crate::schema::*;

pub mod manual;

// The formats accepted for the reporting week. The exports switched between
// ISO dates and US dates over the publication history.
const WEEK_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

/// Parses a reporting week in any of the accepted formats.
pub fn parse_week_ending(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    WEEK_FORMATS
        .iter()
        .find_map(|&fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Stringifies a week so that lexicographic order equals chronological order.
pub fn week_string(week: NaiveDate) -> String {
    week.format("%Y-%m-%d").to_string()
}

/// Share of occupied beds. A facility reporting zero beds maps to 1 by
/// policy (the unbounded ratio carries no information beyond "full").
pub fn percent_beds_occupied(occupied_beds: f64, all_beds: f64) -> f64 {
    if all_beds == 0.0 {
        1.0
    } else {
        occupied_beds / all_beds
    }
}

/// Share of deaths over all resolved cases. Undefined (`None`) when both
/// terms are zero; this is a missing value, never an error.
pub fn percent_covid_deaths(total_deaths: f64, total_confirmed: f64) -> Option<f64> {
    let denominator = total_deaths + total_confirmed;
    if denominator == 0.0 {
        None
    } else {
        Some(total_deaths / denominator)
    }
}

/// Cleans the concatenated raw records.
///
/// Rows failing the quality-assurance check and rows without a geolocation
/// are excluded (counted in a log line, not reported individually). The
/// reporting week is parsed, the Y/N survey answers are coerced to {0, 1}
/// with empty answers kept as missing, and the two derived ratios are
/// attached. Any other value in a binary column fails the run.
///
/// Cleaning is deterministic: the same input always yields the same output.
pub fn clean_records(records: &[RawRecord]) -> Result<Vec<CleanedRow>, CleaningError> {
    let mut rows: Vec<CleanedRow> = Vec::with_capacity(records.len());
    let mut dropped_qa: usize = 0;
    let mut dropped_geolocation: usize = 0;

    for (row_idx, record) in records.iter().enumerate() {
        if record.passed_qa.trim() != "Y" {
            dropped_qa += 1;
            continue;
        }
        let geolocation = match &record.geolocation {
            Some(g) if !g.trim().is_empty() => g.clone(),
            _ => {
                dropped_geolocation += 1;
                continue;
            }
        };
        let week_ending = parse_week_ending(&record.week_ending).ok_or_else(|| {
            CleaningError::UnparseableWeek {
                row: row_idx,
                value: record.week_ending.clone(),
            }
        })?;

        let mut binary: Vec<Option<u8>> = Vec::with_capacity(BINARY_COLUMNS.len());
        for (col_idx, column) in BINARY_COLUMNS.iter().enumerate() {
            let raw = record
                .binary
                .get(col_idx)
                .map(|s| s.trim())
                .unwrap_or("");
            let coerced = match raw {
                "Y" => Some(1),
                "N" => Some(0),
                "" => None,
                other => {
                    return Err(CleaningError::InvalidBinaryValue {
                        column: column.to_string(),
                        row: row_idx,
                        value: other.to_string(),
                    })
                }
            };
            binary.push(coerced);
        }

        rows.push(CleanedRow {
            provider_number: record.provider_number.clone(),
            provider_state: record.provider_state.clone(),
            week_ending,
            geolocation,
            counts: record.counts,
            binary,
            percent_beds_occupied: percent_beds_occupied(
                record.counts.occupied_beds,
                record.counts.all_beds,
            ),
            percent_covid_deaths: percent_covid_deaths(
                record.counts.total_deaths,
                record.counts.total_confirmed,
            ),
        });
    }

    info!(
        "clean_records: kept {} rows, dropped {} failing quality assurance and {} without geolocation",
        rows.len(),
        dropped_qa,
        dropped_geolocation
    );
    Ok(rows)
}

// Running totals for one group of cleaned rows. Missing survey answers do
// not contribute to the binary sums.
struct GroupTotals {
    counts: Counts,
    binary_sums: Vec<u64>,
}

impl GroupTotals {
    fn new() -> GroupTotals {
        GroupTotals {
            counts: Counts::default(),
            binary_sums: vec![0; BINARY_COLUMNS.len()],
        }
    }

    fn absorb(&mut self, row: &CleanedRow) {
        self.counts += row.counts;
        for (sum, value) in self.binary_sums.iter_mut().zip(row.binary.iter()) {
            if let Some(v) = value {
                *sum += u64::from(*v);
            }
        }
    }
}

/// Groups by (state, week), sums every count-like column and recomputes the
/// ratios from the summed counts. The week is stringified for downstream
/// serialization. No ordering beyond the grouping order is imposed.
pub fn by_state(rows: &[CleanedRow]) -> Vec<StateWeekRow> {
    let mut groups: BTreeMap<(String, NaiveDate), GroupTotals> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.provider_state.clone(), row.week_ending))
            .or_insert_with(GroupTotals::new)
            .absorb(row);
    }
    debug!("by_state: {} groups", groups.len());
    groups
        .into_iter()
        .map(|((state, week), totals)| StateWeekRow {
            state,
            week_ending: week_string(week),
            percent_beds_occupied: percent_beds_occupied(
                totals.counts.occupied_beds,
                totals.counts.all_beds,
            ),
            percent_covid_deaths: percent_covid_deaths(
                totals.counts.total_deaths,
                totals.counts.total_confirmed,
            ),
            counts: totals.counts,
            binary_sums: totals.binary_sums,
        })
        .collect()
}

/// Groups by (geolocation, week, facility id) and sorts ascending by week.
/// The sort is load-bearing: the bubble-map animation consumes the rows in
/// frame order.
pub fn by_facility(rows: &[CleanedRow]) -> Vec<FacilityWeekRow> {
    let mut groups: BTreeMap<(String, NaiveDate, String), GroupTotals> = BTreeMap::new();
    for row in rows {
        groups
            .entry((
                row.geolocation.clone(),
                row.week_ending,
                row.provider_number.clone(),
            ))
            .or_insert_with(GroupTotals::new)
            .absorb(row);
    }
    debug!("by_facility: {} groups", groups.len());
    let mut out: Vec<FacilityWeekRow> = groups
        .into_iter()
        .map(|((geolocation, week, provider_number), totals)| FacilityWeekRow {
            geolocation,
            week_ending: week_string(week),
            provider_number,
            percent_beds_occupied: percent_beds_occupied(
                totals.counts.occupied_beds,
                totals.counts.all_beds,
            ),
            percent_covid_deaths: percent_covid_deaths(
                totals.counts.total_deaths,
                totals.counts.total_confirmed,
            ),
            counts: totals.counts,
            binary_sums: totals.binary_sums,
        })
        .collect();
    out.sort_by(|a, b| a.week_ending.cmp(&b.week_ending));
    out
}

/// Groups by week only. The week is the index of this view, so the rows
/// emerge in week order.
pub fn national_timeseries(rows: &[CleanedRow]) -> Vec<WeekRow> {
    let mut groups: BTreeMap<NaiveDate, GroupTotals> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.week_ending)
            .or_insert_with(GroupTotals::new)
            .absorb(row);
    }
    debug!("national_timeseries: {} weeks", groups.len());
    groups
        .into_iter()
        .map(|(week, totals)| WeekRow {
            week_ending: week,
            percent_beds_occupied: percent_beds_occupied(
                totals.counts.occupied_beds,
                totals.counts.all_beds,
            ),
            percent_covid_deaths: percent_covid_deaths(
                totals.counts.total_deaths,
                totals.counts.total_confirmed,
            ),
            counts: totals.counts,
            binary_sums: totals.binary_sums,
        })
        .collect()
}

/// Groups by (state, week); unlike [`by_state`] the week stays a date
/// column, which the per-state line charts plot against.
pub fn state_timeseries(rows: &[CleanedRow]) -> Vec<StateSeriesRow> {
    let mut groups: BTreeMap<(String, NaiveDate), GroupTotals> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.provider_state.clone(), row.week_ending))
            .or_insert_with(GroupTotals::new)
            .absorb(row);
    }
    debug!("state_timeseries: {} groups", groups.len());
    groups
        .into_iter()
        .map(|((state, week), totals)| StateSeriesRow {
            state,
            week_ending: week,
            percent_beds_occupied: percent_beds_occupied(
                totals.counts.occupied_beds,
                totals.counts.all_beds,
            ),
            percent_covid_deaths: percent_covid_deaths(
                totals.counts.total_deaths,
                totals.counts.total_confirmed,
            ),
            counts: totals.counts,
            binary_sums: totals.binary_sums,
        })
        .collect()
}

/// Per (state, week) mean of one named binary column: sum of the answers
/// divided by the number of non-missing answers in the group.
///
/// This is a mean of per-row values, not the ratio-of-sums pattern used for
/// the derived count ratios. The two must not be conflated.
pub fn binary_rate_by_state(
    rows: &[CleanedRow],
    column: &str,
) -> Result<Vec<BinaryRateRow>, CleaningError> {
    let col_idx = binary_column_index(column).ok_or(CleaningError::UnknownColumn {
        column: column.to_string(),
    })?;
    let mut groups: BTreeMap<(String, NaiveDate), (u64, u64)> = BTreeMap::new();
    for row in rows {
        let entry = groups
            .entry((row.provider_state.clone(), row.week_ending))
            .or_insert((0, 0));
        if let Some(v) = row.binary[col_idx] {
            entry.0 += u64::from(v);
            entry.1 += 1;
        }
    }
    Ok(groups
        .into_iter()
        .map(|((state, week), (sum, count))| BinaryRateRow {
            state,
            week_ending: week_string(week),
            rate: if count == 0 {
                None
            } else {
                Some(sum as f64 / count as f64)
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        provider: &str,
        state: &str,
        week: &str,
        geolocation: Option<&str>,
        qa: &str,
        counts: Counts,
    ) -> RawRecord {
        RawRecord {
            provider_number: provider.to_string(),
            provider_state: state.to_string(),
            week_ending: week.to_string(),
            geolocation: geolocation.map(|g| g.to_string()),
            passed_qa: qa.to_string(),
            counts,
            binary: vec!["N".to_string(); BINARY_COLUMNS.len()],
        }
    }

    fn counts(
        all_beds: f64,
        occupied_beds: f64,
        weekly_confirmed: f64,
        weekly_deaths: f64,
        total_confirmed: f64,
        total_deaths: f64,
    ) -> Counts {
        Counts {
            all_beds,
            occupied_beds,
            weekly_confirmed,
            total_confirmed,
            weekly_deaths,
            total_deaths,
        }
    }

    #[test]
    fn occupancy_ratio_is_clamped_on_zero_beds() {
        assert_eq!(percent_beds_occupied(40.0, 100.0), 0.4);
        assert_eq!(percent_beds_occupied(12.0, 0.0), 1.0);
        assert_eq!(percent_beds_occupied(0.0, 0.0), 1.0);
    }

    #[test]
    fn death_ratio_is_missing_on_zero_denominator() {
        assert_eq!(percent_covid_deaths(5.0, 15.0), Some(0.25));
        assert_eq!(percent_covid_deaths(0.0, 0.0), None);
        assert_eq!(percent_covid_deaths(0.0, 10.0), Some(0.0));
    }

    #[test]
    fn week_parsing_accepts_the_published_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 5, 24).unwrap();
        assert_eq!(parse_week_ending("2020-05-24"), Some(expected));
        assert_eq!(parse_week_ending("05/24/2020"), Some(expected));
        assert_eq!(parse_week_ending("05/24/20"), Some(expected));
        assert_eq!(parse_week_ending("May 24"), None);
        assert_eq!(week_string(expected), "2020-05-24");
    }

    #[test]
    fn cleaning_drops_qa_failures_and_missing_geolocation() {
        let rows = vec![
            record("015009", "AL", "2020-05-24", Some("POINT (-86.7 33.5)"), "Y", counts(100.0, 60.0, 2.0, 0.0, 10.0, 1.0)),
            record("015010", "AL", "2020-05-24", Some("POINT (-86.8 33.4)"), "N", counts(50.0, 30.0, 1.0, 0.0, 5.0, 0.0)),
            record("015011", "AL", "2020-05-24", None, "Y", counts(80.0, 70.0, 0.0, 0.0, 2.0, 0.0)),
            record("015012", "AL", "2020-05-24", Some("  "), "Y", counts(80.0, 70.0, 0.0, 0.0, 2.0, 0.0)),
        ];
        let cleaned = clean_records(&rows).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].provider_number, "015009");
        assert!(!cleaned[0].geolocation.is_empty());
    }

    #[test]
    fn cleaning_is_idempotent() {
        let rows = vec![
            record("015009", "AL", "2020-05-24", Some("POINT (-86.7 33.5)"), "Y", counts(100.0, 60.0, 2.0, 0.0, 10.0, 1.0)),
            record("025100", "AK", "05/31/2020", Some("POINT (-149.9 61.2)"), "Y", counts(40.0, 40.0, 0.0, 0.0, 0.0, 0.0)),
        ];
        let first = clean_records(&rows).unwrap();
        let second = clean_records(&rows).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn binary_answers_are_coerced_and_missing_is_kept() {
        let mut row = record("015009", "AL", "2020-05-24", Some("POINT (-86.7 33.5)"), "Y", counts(100.0, 60.0, 0.0, 0.0, 0.0, 0.0));
        row.binary[0] = "Y".to_string();
        row.binary[1] = "".to_string();
        let cleaned = clean_records(&[row]).unwrap();
        assert_eq!(cleaned[0].binary[0], Some(1));
        assert_eq!(cleaned[0].binary[1], None);
        assert!(cleaned[0].binary[2..].iter().all(|v| *v == Some(0)));
    }

    #[test]
    fn unexpected_binary_value_fails_with_the_offending_column() {
        let mut row = record("015009", "AL", "2020-05-24", Some("POINT (-86.7 33.5)"), "Y", counts(100.0, 60.0, 0.0, 0.0, 0.0, 0.0));
        row.binary[3] = "MAYBE".to_string();
        let err = clean_records(&[row]).unwrap_err();
        assert_eq!(
            err,
            CleaningError::InvalidBinaryValue {
                column: BINARY_COLUMNS[3].to_string(),
                row: 0,
                value: "MAYBE".to_string(),
            }
        );
    }

    #[test]
    fn unparseable_week_fails_the_run() {
        let row = record("015009", "AL", "someday", Some("POINT (-86.7 33.5)"), "Y", counts(100.0, 60.0, 0.0, 0.0, 0.0, 0.0));
        let err = clean_records(&[row]).unwrap_err();
        assert!(matches!(err, CleaningError::UnparseableWeek { row: 0, .. }));
    }

    fn sample_cleaned() -> Vec<CleanedRow> {
        let rows = vec![
            record("050001", "CA", "2020-05-24", Some("POINT (-118.2 34.0)"), "Y", counts(100.0, 60.0, 6.0, 2.0, 20.0, 4.0)),
            record("050002", "CA", "2020-05-24", Some("POINT (-121.4 38.5)"), "Y", counts(200.0, 120.0, 4.0, 1.0, 10.0, 2.0)),
            record("335001", "NY", "2020-05-24", Some("POINT (-73.9 40.7)"), "Y", counts(300.0, 240.0, 10.0, 3.0, 40.0, 10.0)),
            record("050001", "CA", "2020-05-31", Some("POINT (-118.2 34.0)"), "Y", counts(100.0, 55.0, 3.0, 1.0, 23.0, 5.0)),
            record("335001", "NY", "2020-05-31", Some("POINT (-73.9 40.7)"), "Y", counts(300.0, 250.0, 8.0, 2.0, 48.0, 12.0)),
        ];
        clean_records(&rows).unwrap()
    }

    #[test]
    fn state_sums_conserve_the_national_totals() {
        let cleaned = sample_cleaned();
        let states = by_state(&cleaned);
        let national = national_timeseries(&cleaned);
        for week_row in &national {
            let week = week_string(week_row.week_ending);
            let state_total: Counts = states
                .iter()
                .filter(|r| r.week_ending == week)
                .map(|r| r.counts)
                .sum();
            assert_eq!(state_total, week_row.counts);
        }
    }

    #[test]
    fn aggregated_ratios_come_from_summed_counts() {
        let cleaned = sample_cleaned();
        let states = by_state(&cleaned);
        let ca = states
            .iter()
            .find(|r| r.state == "CA" && r.week_ending == "2020-05-24")
            .unwrap();
        // 180 occupied over 300 beds, not the mean of 0.6 and 0.6.
        assert!((ca.percent_beds_occupied - 180.0 / 300.0).abs() < 1e-9);
        // 6 deaths over 36 resolved cases.
        assert!((ca.percent_covid_deaths.unwrap() - 6.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn aggregated_occupancy_follows_the_zero_bed_policy() {
        let rows = vec![
            record("050001", "CA", "2020-05-24", Some("POINT (-118.2 34.0)"), "Y", counts(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)),
            record("050002", "CA", "2020-05-24", Some("POINT (-121.4 38.5)"), "Y", counts(0.0, 12.0, 0.0, 0.0, 0.0, 0.0)),
        ];
        let cleaned = clean_records(&rows).unwrap();
        let states = by_state(&cleaned);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].percent_beds_occupied, 1.0);
        assert_eq!(states[0].percent_covid_deaths, None);
    }

    #[test]
    fn facility_view_is_sorted_by_week() {
        let cleaned = sample_cleaned();
        let facilities = by_facility(&cleaned);
        assert!(facilities
            .windows(2)
            .all(|w| w[0].week_ending <= w[1].week_ending));
        // Two weeks for the repeated facility, one for each of the others.
        assert_eq!(facilities.len(), 5);
    }

    #[test]
    fn national_timeseries_is_indexed_by_week() {
        let cleaned = sample_cleaned();
        let national = national_timeseries(&cleaned);
        assert_eq!(national.len(), 2);
        assert!(national[0].week_ending < national[1].week_ending);
        assert_eq!(national[0].counts.weekly_confirmed, 20.0);
        assert_eq!(national[1].counts.weekly_confirmed, 11.0);
    }

    #[test]
    fn binary_rate_is_a_mean_over_answered_rows() {
        let mut rows = vec![
            record("050001", "CA", "2020-05-24", Some("POINT (-118.2 34.0)"), "Y", counts(100.0, 60.0, 0.0, 0.0, 0.0, 0.0)),
            record("050002", "CA", "2020-05-24", Some("POINT (-121.4 38.5)"), "Y", counts(200.0, 120.0, 0.0, 0.0, 0.0, 0.0)),
            record("050003", "CA", "2020-05-24", Some("POINT (-122.4 37.8)"), "Y", counts(50.0, 20.0, 0.0, 0.0, 0.0, 0.0)),
        ];
        let shortage = binary_column_index("Shortage of Nursing Staff").unwrap();
        rows[0].binary[shortage] = "Y".to_string();
        rows[1].binary[shortage] = "N".to_string();
        rows[2].binary[shortage] = "".to_string();
        let cleaned = clean_records(&rows).unwrap();
        let rates = binary_rate_by_state(&cleaned, "Shortage of Nursing Staff").unwrap();
        assert_eq!(rates.len(), 1);
        // One yes out of two answers; the missing answer does not count.
        assert_eq!(rates[0].rate, Some(0.5));
    }

    #[test]
    fn binary_rate_rejects_unknown_columns() {
        let cleaned = sample_cleaned();
        let err = binary_rate_by_state(&cleaned, "Shortage of Espresso").unwrap_err();
        assert_eq!(
            err,
            CleaningError::UnknownColumn {
                column: "Shortage of Espresso".to_string()
            }
        );
    }

    #[test]
    fn binary_rate_with_no_answers_is_missing() {
        let mut rows = vec![record(
            "050001",
            "CA",
            "2020-05-24",
            Some("POINT (-118.2 34.0)"),
            "Y",
            counts(100.0, 60.0, 0.0, 0.0, 0.0, 0.0),
        )];
        for v in rows[0].binary.iter_mut() {
            *v = "".to_string();
        }
        let cleaned = clean_records(&rows).unwrap();
        let rates = binary_rate_by_state(&cleaned, "Shortage of Aides").unwrap();
        assert_eq!(rates[0].rate, None);
    }
}
