// The chart catalog: a fixed set of named charts, each produced from
// exactly one (view, template) pair. The artifact names are the contract
// surface the dashboard navigates by.

use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use snafu::prelude::*;

use nh_surveillance::{
    by_facility, by_state, binary_rate_by_state, national_timeseries, state_timeseries,
    week_string, CleanedRow, Counts, FacilityWeekRow, StateSeriesRow, StateWeekRow, WeekRow,
};

use crate::dash::figures::{self, BubblePoint, Figure, LineSeries};
use crate::dash::store::{self, ManifestEntry};
use crate::dash::*;

pub const CHART_NAMES: [&str; 15] = [
    "histogram_1",
    "histogram_2",
    "choropleth_1",
    "choropleth_2",
    "choropleth_3",
    "choropleth_4",
    "bubblemap_1",
    "bubblemap_2",
    "line_graph_1",
    "line_graph_2",
    "line_graph_3",
    "line_graph_state_1",
    "line_graph_state_2",
    "line_graph_state_3",
    "line_graph_state_4",
];

// The bubble maps only show facilities above these counts, to bound the
// point count per frame. This is a rendering bound, not a data filter; both
// boundaries are inclusive.
pub const MIN_BUBBLE_CASES: f64 = 5.0;
pub const MIN_BUBBLE_DEATHS: f64 = 3.0;

const PCT_DEATHS_TITLE: &str = "Percent of COVID Deaths over Total COVID Cases";
const PCT_BEDS_TITLE: &str = "Percent Beds Occupied";
const WEEKLY_CONFIRMED_TITLE: &str = "Residents Weekly Confirmed COVID-19";
const WEEKLY_DEATHS_TITLE: &str = "Residents Weekly COVID-19 Deaths";

/// The aggregated views, computed once per run and read by every chart.
pub struct Views<'a> {
    pub cleaned: &'a [CleanedRow],
    pub by_state: Vec<StateWeekRow>,
    pub by_facility: Vec<FacilityWeekRow>,
    pub national: Vec<WeekRow>,
    pub state_series: Vec<StateSeriesRow>,
}

impl<'a> Views<'a> {
    pub fn build(cleaned: &'a [CleanedRow]) -> Views<'a> {
        info!("building the aggregated views over {} cleaned rows", cleaned.len());
        Views {
            cleaned,
            by_state: by_state(cleaned),
            by_facility: by_facility(cleaned),
            national: national_timeseries(cleaned),
            state_series: state_timeseries(cleaned),
        }
    }
}

/// A named, self-contained renderable chart. Created once per run, written
/// to the store keyed by name, never mutated.
#[derive(Debug, Clone)]
pub struct ChartArtifact {
    pub name: String,
    pub title: String,
    pub html: String,
}

/// What a run produced: the manifest entries of the written artifacts, and
/// the (name, error) pairs of the charts that failed.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub written: Vec<ManifestEntry>,
    pub failures: Vec<(String, String)>,
}

/// Generates and writes the whole catalog. Each chart runs in its own
/// failure boundary: a chart that cannot be prepared or written is logged
/// and recorded, and its siblings still generate.
pub fn generate_all(views: &Views, out_dir: &Path) -> GenerationSummary {
    let mut written: Vec<ManifestEntry> = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    for name in CHART_NAMES {
        let result = build_chart(name, views)
            .and_then(|artifact| store::write_artifact(out_dir, &artifact).map(|_| artifact));
        match result {
            Ok(artifact) => {
                info!("wrote chart {}", artifact.name);
                written.push(ManifestEntry {
                    file: format!("{}.html", artifact.name),
                    name: artifact.name,
                    title: artifact.title,
                });
            }
            Err(e) => {
                warn!("chart {} failed: {}", name, e);
                failures.push((name.to_string(), e.to_string()));
            }
        }
    }
    GenerationSummary { written, failures }
}

/// Builds one chart of the catalog by name.
pub fn build_chart(name: &str, views: &Views) -> DashResult<ChartArtifact> {
    let (title, figure) = match name {
        "histogram_1" => (
            format!("Distribution of {}", PCT_DEATHS_TITLE),
            death_ratio_histogram(views.cleaned),
        ),
        "histogram_2" => (
            format!("Distribution of {}", PCT_BEDS_TITLE),
            occupancy_histogram(views.cleaned),
        ),
        "choropleth_1" => (
            WEEKLY_CONFIRMED_TITLE.to_string(),
            count_choropleth(&views.by_state, |c| c.weekly_confirmed, WEEKLY_CONFIRMED_TITLE),
        ),
        "choropleth_2" => (
            WEEKLY_DEATHS_TITLE.to_string(),
            count_choropleth(&views.by_state, |c| c.weekly_deaths, WEEKLY_DEATHS_TITLE),
        ),
        "choropleth_3" => (
            "Shortage of Nursing Staff".to_string(),
            shortage_choropleth(views.cleaned, "Shortage of Nursing Staff")?,
        ),
        "choropleth_4" => (
            "Shortage of Aides".to_string(),
            shortage_choropleth(views.cleaned, "Shortage of Aides")?,
        ),
        "bubblemap_1" => (
            WEEKLY_CONFIRMED_TITLE.to_string(),
            figures::bubble_map(
                &bubble_weeks(&views.by_facility, |c| c.weekly_confirmed, MIN_BUBBLE_CASES),
                WEEKLY_CONFIRMED_TITLE,
            ),
        ),
        "bubblemap_2" => (
            WEEKLY_DEATHS_TITLE.to_string(),
            figures::bubble_map(
                &bubble_weeks(&views.by_facility, |c| c.weekly_deaths, MIN_BUBBLE_DEATHS),
                WEEKLY_DEATHS_TITLE,
            ),
        ),
        "line_graph_1" => (
            "Weekly COVID-19 Cases and Deaths".to_string(),
            national_cases_and_deaths(&views.national),
        ),
        "line_graph_2" => (
            PCT_BEDS_TITLE.to_string(),
            national_single_line(
                &views.national,
                |r| Some(r.percent_beds_occupied),
                PCT_BEDS_TITLE,
            ),
        ),
        "line_graph_3" => (
            PCT_DEATHS_TITLE.to_string(),
            national_single_line(&views.national, |r| r.percent_covid_deaths, PCT_DEATHS_TITLE),
        ),
        "line_graph_state_1" => (
            WEEKLY_DEATHS_TITLE.to_string(),
            state_lines(&views.state_series, |r| Some(r.counts.weekly_deaths), WEEKLY_DEATHS_TITLE),
        ),
        "line_graph_state_2" => (
            WEEKLY_CONFIRMED_TITLE.to_string(),
            state_lines(
                &views.state_series,
                |r| Some(r.counts.weekly_confirmed),
                WEEKLY_CONFIRMED_TITLE,
            ),
        ),
        "line_graph_state_3" => (
            PCT_BEDS_TITLE.to_string(),
            state_lines(&views.state_series, |r| Some(r.percent_beds_occupied), PCT_BEDS_TITLE),
        ),
        "line_graph_state_4" => (
            PCT_DEATHS_TITLE.to_string(),
            state_lines(&views.state_series, |r| r.percent_covid_deaths, PCT_DEATHS_TITLE),
        ),
        x => whatever!("No chart is registered under the name {:?}", x),
    };
    Ok(ChartArtifact {
        name: name.to_string(),
        title,
        html: figure.to_html()?,
    })
}

fn death_ratio_histogram(cleaned: &[CleanedRow]) -> Figure {
    let values: Vec<f64> = cleaned
        .iter()
        .filter_map(|r| r.percent_covid_deaths)
        .collect();
    figures::histogram(
        &values,
        &format!("Distribution of {}", PCT_DEATHS_TITLE),
        60000.0,
    )
}

fn occupancy_histogram(cleaned: &[CleanedRow]) -> Figure {
    // Occupancy above 1 comes from facilities reporting more occupied beds
    // than beds; those rows stay in the table but not in this sample.
    let values: Vec<f64> = cleaned
        .iter()
        .map(|r| r.percent_beds_occupied)
        .filter(|v| *v <= 1.0)
        .collect();
    figures::histogram(
        &values,
        &format!("Distribution of {}", PCT_BEDS_TITLE),
        70000.0,
    )
}

fn count_choropleth(
    rows: &[StateWeekRow],
    select: fn(&Counts) -> f64,
    title: &str,
) -> Figure {
    let mut weeks: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for row in rows {
        weeks
            .entry(row.week_ending.clone())
            .or_default()
            .push((row.state.clone(), select(&row.counts)));
    }
    let frames: Vec<(String, Vec<(String, f64)>)> = weeks.into_iter().collect();
    figures::choropleth(&frames, title, 500.0)
}

fn shortage_choropleth(cleaned: &[CleanedRow], column: &str) -> DashResult<Figure> {
    let rates = binary_rate_by_state(cleaned, column).context(CleaningSnafu {})?;
    let mut weeks: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for row in rates {
        // A state with no answer at all for the week is omitted from the frame.
        if let Some(rate) = row.rate {
            weeks
                .entry(row.week_ending)
                .or_default()
                .push((row.state, rate));
        }
    }
    let frames: Vec<(String, Vec<(String, f64)>)> = weeks.into_iter().collect();
    Ok(figures::choropleth(&frames, column, 0.5))
}

static COORDINATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?[0-9]+\.[0-9]+").expect("valid coordinate pattern"));

/// Extracts the coordinate pair of a geolocation string: the first decimal
/// number is the latitude, the second the longitude.
pub fn parse_geolocation(value: &str) -> DashResult<(f64, f64)> {
    let mut numbers = COORDINATE_RE
        .find_iter(value)
        .filter_map(|m| m.as_str().parse::<f64>().ok());
    match (numbers.next(), numbers.next()) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => GeoParseSnafu { value }.fail(),
    }
}

/// Prepares the animation frames of a bubble map: facilities at or above
/// the threshold, grouped by week. A row whose geolocation does not parse
/// is logged and excluded; it never aborts the chart.
pub fn bubble_weeks(
    rows: &[FacilityWeekRow],
    select: fn(&Counts) -> f64,
    minimum: f64,
) -> Vec<(String, Vec<BubblePoint>)> {
    let mut weeks: BTreeMap<String, Vec<BubblePoint>> = BTreeMap::new();
    for row in rows.iter().filter(|r| select(&r.counts) >= minimum) {
        match parse_geolocation(&row.geolocation) {
            Ok((lat, lon)) => {
                weeks.entry(row.week_ending.clone()).or_default().push(BubblePoint {
                    lat,
                    lon,
                    label: row.provider_number.clone(),
                    size: select(&row.counts),
                });
            }
            Err(e) => {
                warn!(
                    "excluding facility {} from the bubble view: {}",
                    row.provider_number, e
                );
            }
        }
    }
    weeks.into_iter().collect()
}

fn national_cases_and_deaths(national: &[WeekRow]) -> Figure {
    let x: Vec<String> = national.iter().map(|r| week_string(r.week_ending)).collect();
    let series = [
        LineSeries {
            name: WEEKLY_CONFIRMED_TITLE.to_string(),
            x: x.clone(),
            y: national.iter().map(|r| Some(r.counts.weekly_confirmed)).collect(),
        },
        LineSeries {
            name: WEEKLY_DEATHS_TITLE.to_string(),
            x,
            y: national.iter().map(|r| Some(r.counts.weekly_deaths)).collect(),
        },
    ];
    figures::line_chart(&series, "Weekly COVID-19 Cases and Deaths", true)
}

fn national_single_line(
    national: &[WeekRow],
    select: fn(&WeekRow) -> Option<f64>,
    title: &str,
) -> Figure {
    let series = LineSeries {
        name: title.to_string(),
        x: national.iter().map(|r| week_string(r.week_ending)).collect(),
        y: national.iter().map(select).collect(),
    };
    figures::line_chart(&[series], title, false)
}

fn state_lines(
    rows: &[StateSeriesRow],
    select: fn(&StateSeriesRow) -> Option<f64>,
    title: &str,
) -> Figure {
    let mut by_state_series: BTreeMap<&str, LineSeries> = BTreeMap::new();
    for row in rows {
        let series = by_state_series
            .entry(row.state.as_str())
            .or_insert_with(|| LineSeries {
                name: row.state.clone(),
                x: Vec::new(),
                y: Vec::new(),
            });
        series.x.push(week_string(row.week_ending));
        series.y.push(select(row));
    }
    let series: Vec<LineSeries> = by_state_series.into_values().collect();
    figures::line_chart(&series, title, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nh_surveillance::{clean_records, Counts, RawRecord, BINARY_COLUMNS};

    fn raw(provider: &str, state: &str, week: &str, geolocation: &str, counts: Counts) -> RawRecord {
        RawRecord {
            provider_number: provider.to_string(),
            provider_state: state.to_string(),
            week_ending: week.to_string(),
            geolocation: Some(geolocation.to_string()),
            passed_qa: "Y".to_string(),
            counts,
            binary: vec!["N".to_string(); BINARY_COLUMNS.len()],
        }
    }

    fn weekly_cases(cases: f64) -> Counts {
        Counts {
            all_beds: 100.0,
            occupied_beds: 50.0,
            weekly_confirmed: cases,
            total_confirmed: cases,
            weekly_deaths: 0.0,
            total_deaths: 0.0,
        }
    }

    #[test]
    fn geolocation_extraction_reads_latitude_then_longitude() {
        let (lat, lon) = parse_geolocation("POINT (34.05 -118.24)").unwrap();
        assert_eq!(lat, 34.05);
        assert_eq!(lon, -118.24);
        assert!(parse_geolocation("POINT (34.05)").is_err());
        assert!(parse_geolocation("not a point").is_err());
    }

    #[test]
    fn the_case_threshold_boundary_is_inclusive() {
        let rows = vec![
            raw("000004", "CA", "2020-05-24", "POINT (34.0 -118.2)", weekly_cases(4.0)),
            raw("000005", "CA", "2020-05-24", "POINT (36.0 -119.0)", weekly_cases(5.0)),
        ];
        let cleaned = clean_records(&rows).unwrap();
        let facilities = by_facility(&cleaned);
        let weeks = bubble_weeks(&facilities, |c| c.weekly_confirmed, MIN_BUBBLE_CASES);
        assert_eq!(weeks.len(), 1);
        let points = &weeks[0].1;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].label, "000005");
        assert_eq!(points[0].size, 5.0);
    }

    #[test]
    fn a_malformed_geolocation_is_excluded_not_fatal() {
        let rows = vec![
            raw("000005", "CA", "2020-05-24", "POINT (34.0 -118.2)", weekly_cases(9.0)),
            raw("000006", "CA", "2020-05-24", "somewhere", weekly_cases(9.0)),
        ];
        let cleaned = clean_records(&rows).unwrap();
        let facilities = by_facility(&cleaned);
        let weeks = bubble_weeks(&facilities, |c| c.weekly_confirmed, MIN_BUBBLE_CASES);
        assert_eq!(weeks[0].1.len(), 1);
        assert_eq!(weeks[0].1[0].label, "000005");
    }

    #[test]
    fn an_unknown_chart_name_is_rejected() {
        let cleaned: Vec<CleanedRow> = Vec::new();
        let views = Views::build(&cleaned);
        assert!(build_chart("pie_chart_1", &views).is_err());
    }

    #[test]
    fn the_whole_catalog_generates_even_from_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let cleaned: Vec<CleanedRow> = Vec::new();
        let views = Views::build(&cleaned);
        let summary = generate_all(&views, dir.path());
        assert!(summary.failures.is_empty());
        assert_eq!(summary.written.len(), CHART_NAMES.len());
    }

    #[test]
    fn a_failing_chart_is_recorded_and_does_not_abort_the_run() {
        // Writing under a path that is a file fails every chart; the loop
        // still visits the whole catalog and records each failure by name.
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("not_a_directory");
        std::fs::write(&blocked, "occupied").unwrap();
        let cleaned: Vec<CleanedRow> = Vec::new();
        let views = Views::build(&cleaned);
        let summary = generate_all(&views, &blocked);
        assert!(summary.written.is_empty());
        assert_eq!(summary.failures.len(), CHART_NAMES.len());
        assert_eq!(summary.failures[0].0, CHART_NAMES[0]);
    }

    #[test]
    fn state_lines_split_one_column_into_one_line_per_state() {
        let week = NaiveDate::from_ymd_opt(2020, 5, 24).unwrap();
        let row = |state: &str| StateSeriesRow {
            state: state.to_string(),
            week_ending: week,
            counts: weekly_cases(3.0),
            binary_sums: vec![0; BINARY_COLUMNS.len()],
            percent_beds_occupied: 0.5,
            percent_covid_deaths: None,
        };
        let figure = state_lines(
            &[row("CA"), row("NY")],
            |r| Some(r.counts.weekly_confirmed),
            WEEKLY_CONFIRMED_TITLE,
        );
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[0]["name"], "CA");
        assert_eq!(figure.data[1]["name"], "NY");
    }
}
