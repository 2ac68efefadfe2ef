// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use chrono::NaiveDate;
use std::ops::{Add, AddAssign};

/// Reporting week of the survey, the primary time axis.
pub const WEEK_ENDING: &str = "Week Ending";
/// The CMS identifier of the facility.
pub const PROVIDER_NUMBER: &str = "Federal Provider Number";
pub const PROVIDER_STATE: &str = "Provider State";
/// A text field encoding the facility coordinate pair.
pub const GEOLOCATION: &str = "Geolocation";
pub const QA_CHECK: &str = "Passed Quality Assurance Check";
pub const ALL_BEDS: &str = "Number of All Beds";
pub const OCCUPIED_BEDS: &str = "Total Number of Occupied Beds";
pub const WEEKLY_CONFIRMED: &str = "Residents Weekly Confirmed COVID-19";
pub const TOTAL_CONFIRMED: &str = "Residents Total Confirmed COVID-19";
pub const WEEKLY_DEATHS: &str = "Residents Weekly COVID-19 Deaths";
pub const TOTAL_DEATHS: &str = "Residents Total COVID-19 Deaths";

/// The survey columns coded as Y/N in the raw exports.
///
/// The spellings (including doubled and trailing spaces) are the column
/// headers as published in the dataset and must not be normalized.
pub const BINARY_COLUMNS: [&str; 56] = [
    "Resident Access to Testing in Facility",
    "Laboratory Type Is State Health Dept",
    "Laboratory Type Is Private Lab",
    "Laboratory Type Is Other",
    "Able to Test or Obtain Resources to Test All Current Residents Within Next 7 Days",
    "Reason for Not Testing Residents - Lack of PPE for Personnel ",
    "Reason for Not Testing Residents - Lack of Supplies",
    "Reason for Not Testing Residents  - Lack of Access to Laboratory",
    "Reason for Not Testing Residents - Lack of Access to Trained Personnel ",
    "Reason for Not Testing Residents  - Uncertainty About Reimbursement",
    "Reason for Not Testing Residents  - Other",
    "During Past Two Weeks Average Time to Receive Resident Test Results",
    "Has Facility Performed Resident Tests Since Last Report",
    "Tested Residents with New Signs or Symptoms",
    "Tested Asymptomatic Residents in a Unit or Section After a New Case",
    "Tested Asymptomatic Residents Facility-Wide After a New Case",
    "Tested Asymptomatic Residents Without Known Exposure as Surveillance",
    "Tested Another Subgroup of Residents",
    "Able to Test or Obtain Resources to Test All Staff and/or Personnel Within Next 7 Days",
    "Reason for Not Testing Staff and/or Personnel - Lack of PPE for Personnel ",
    "Reason for Not Testing Staff and/or Personnel - Lack of Supplies",
    "Reason for Not Testing Staff and/or Personnel - Lack of Access to Laboratory",
    "Reason for Not Testing Staff and/or Personnel  - Lack of Access to Trained Personnel ",
    "Reason for Not Testing Staff and/or Personnel - Uncertainty About Reimbursement",
    "Reason for Not Testing Staff and/or Personnel - Other",
    "During Past Two Weeks Average Time to Receive Staff and/or Personnel Test Results",
    "Has Facility Performed Staff and/or Personnel Tests Since Last Report",
    "Tested Staff and/or Personnel with New Signs or Symptoms",
    "Tested Asymptomatic Staff and/or Personnel in a Unit or Section After a New Case",
    "Tested Asymptomatic Staff and/or Personnel Facility-Wide After a New Case",
    "Tested Asymptomatic Staff and/or Personnel Without Known Exposure as Surveillance",
    "Tested Another Subgroup of Staff and/or Personnel",
    "In-House Point-of-Care Test Machine",
    "Shortage of Clinical Staff",
    "Shortage of Aides",
    "Shortage of Other Staff",
    "Any Current Supply of N95 Masks",
    "One-Week Supply of N95 Masks",
    "Any Current Supply of Surgical Masks",
    "One-Week Supply of Surgical Masks",
    "Any Current Supply of Eye Protection",
    "One-Week Supply of Eye Protection",
    "Any Current Supply of Gowns",
    "One-Week Supply of Gowns",
    "Any Current Supply of Gloves",
    "One-Week Supply of Gloves",
    "Any Current Supply of Hand Sanitizer",
    "One-Week Supply of Hand Sanitizer",
    "Ventilator Dependent Unit",
    "Any Current Supply of Ventilator Supplies",
    "One-Week Supply of Ventilator Supplies",
    "Three or More Confirmed COVID-19 Cases This Week",
    "Initial Confirmed COVID-19 Case This Week",
    "Has Facility Performed Tests Since Last Report",
    "Enough Supplies to Test All Staff and/or Personnel Using Point-of-Care Test Machine",
    "Shortage of Nursing Staff",
];

/// The position of a binary survey column, or `None` for a name that is not
/// part of the schema.
pub fn binary_column_index(column: &str) -> Option<usize> {
    BINARY_COLUMNS.iter().position(|c| *c == column)
}

/// One row of the raw exports, as parsed by the readers.
///
/// This is before the quality-assurance filter, the date parsing and the Y/N
/// coercion. The `binary` values are aligned with [`BINARY_COLUMNS`]; an
/// empty string stands for a missing answer.
#[derive(PartialEq, Debug, Clone)]
pub struct RawRecord {
    pub provider_number: String,
    pub provider_state: String,
    pub week_ending: String,
    pub geolocation: Option<String>,
    pub passed_qa: String,
    pub counts: Counts,
    pub binary: Vec<String>,
}

/// The count-like fields of a record, summable across any grouping.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct Counts {
    pub all_beds: f64,
    pub occupied_beds: f64,
    pub weekly_confirmed: f64,
    pub total_confirmed: f64,
    pub weekly_deaths: f64,
    pub total_deaths: f64,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        self.all_beds += rhs.all_beds;
        self.occupied_beds += rhs.occupied_beds;
        self.weekly_confirmed += rhs.weekly_confirmed;
        self.total_confirmed += rhs.total_confirmed;
        self.weekly_deaths += rhs.weekly_deaths;
        self.total_deaths += rhs.total_deaths;
    }
}

impl Add for Counts {
    type Output = Counts;
    fn add(mut self, rhs: Counts) -> Counts {
        self += rhs;
        self
    }
}

impl std::iter::Sum for Counts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Counts::default(), |acc, c| acc + c)
    }
}

/// A record that passed the quality-assurance check and carries a
/// geolocation, with the week parsed, the survey answers coerced to {0, 1}
/// (`None` for a missing answer) and the two derived ratios attached.
#[derive(PartialEq, Debug, Clone)]
pub struct CleanedRow {
    pub provider_number: String,
    pub provider_state: String,
    pub week_ending: NaiveDate,
    pub geolocation: String,
    pub counts: Counts,
    pub binary: Vec<Option<u8>>,
    pub percent_beds_occupied: f64,
    pub percent_covid_deaths: Option<f64>,
}

// ******** Aggregated views *********

/// One row of the national time series, indexed by week.
#[derive(PartialEq, Debug, Clone)]
pub struct WeekRow {
    pub week_ending: NaiveDate,
    pub counts: Counts,
    pub binary_sums: Vec<u64>,
    pub percent_beds_occupied: f64,
    pub percent_covid_deaths: Option<f64>,
}

/// One row of the by-state view. The week is already stringified for
/// downstream serialization.
#[derive(PartialEq, Debug, Clone)]
pub struct StateWeekRow {
    pub state: String,
    pub week_ending: String,
    pub counts: Counts,
    pub binary_sums: Vec<u64>,
    pub percent_beds_occupied: f64,
    pub percent_covid_deaths: Option<f64>,
}

/// One row of the by-facility view, stringified week, sorted ascending by
/// week by [`by_facility`](crate::by_facility).
#[derive(PartialEq, Debug, Clone)]
pub struct FacilityWeekRow {
    pub geolocation: String,
    pub week_ending: String,
    pub provider_number: String,
    pub counts: Counts,
    pub binary_sums: Vec<u64>,
    pub percent_beds_occupied: f64,
    pub percent_covid_deaths: Option<f64>,
}

/// One row of the state time series; the week stays a date column.
#[derive(PartialEq, Debug, Clone)]
pub struct StateSeriesRow {
    pub state: String,
    pub week_ending: NaiveDate,
    pub counts: Counts,
    pub binary_sums: Vec<u64>,
    pub percent_beds_occupied: f64,
    pub percent_covid_deaths: Option<f64>,
}

/// Per (state, week) mean of one binary survey column: answers summed over
/// the group divided by the number of non-missing answers. `None` when the
/// group holds no answer at all.
#[derive(PartialEq, Debug, Clone)]
pub struct BinaryRateRow {
    pub state: String,
    pub week_ending: String,
    pub rate: Option<f64>,
}

/// Errors that prevent the cleaning or aggregation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CleaningError {
    /// A binary-coded column held something other than Y, N or an empty
    /// (missing) answer.
    InvalidBinaryValue {
        column: String,
        row: usize,
        value: String,
    },
    /// The reporting week could not be parsed as a date.
    UnparseableWeek { row: usize, value: String },
    /// A column name that is not part of the binary survey schema.
    UnknownColumn { column: String },
}

impl Error for CleaningError {}

impl Display for CleaningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningError::InvalidBinaryValue { column, row, value } => write!(
                f,
                "row {} holds the value {:?} in the binary column {:?}",
                row, value, column
            ),
            CleaningError::UnparseableWeek { row, value } => {
                write!(f, "row {} holds an unparseable reporting week {:?}", row, value)
            }
            CleaningError::UnknownColumn { column } => {
                write!(f, "{:?} is not a binary survey column", column)
            }
        }
    }
}
