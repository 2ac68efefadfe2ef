/*!

This is the long-form manual for `nh_surveillance`.

## Input format

The dataset is published as one CSV export per reporting period. Every export
shares one column schema: the facility identity columns (`Federal Provider
Number`, `Provider State`, `Geolocation`), the reporting week (`Week Ending`),
the quality-assurance flag (`Passed Quality Assurance Check`), six count
columns (beds, occupied beds, weekly and cumulative resident cases and
deaths) and the Y/N survey columns listed in
[`BINARY_COLUMNS`](crate::BINARY_COLUMNS) (supply adequacy, testing
capability, staffing shortages).

Readers hand the rows to this crate as [`RawRecord`](crate::RawRecord)
values; the crate never touches the filesystem.

## Cleaning

[`clean_records`](crate::clean_records) applies, in order:

1. the quality-assurance filter — only rows flagged `Y` are retained;
2. the geolocation filter — rows without a coordinate string are dropped;
3. week parsing (`2020-05-24`, `05/24/2020` and `05/24/20` styles);
4. Y/N coercion to {0, 1}, empty answers kept as missing, anything else a
   validation failure;
5. the two derived ratios: share of occupied beds (zero reported beds maps
   to 1 by policy) and share of deaths over resolved cases (0/0 stays
   missing).

## Derived views

Each view is a pure function of the cleaned table at one grouping key, and
each recomputes the ratio columns from the group sums. Averaging per-row
ratios would weight small facilities as heavily as large ones; dividing the
summed numerator by the summed denominator keeps the views consistent with
each other.

* [`national_timeseries`](crate::national_timeseries) — grouped by week,
  indexed by week.
* [`by_state`](crate::by_state) — grouped by (state, week), week
  stringified.
* [`state_timeseries`](crate::state_timeseries) — grouped by (state, week),
  week kept as a date column.
* [`by_facility`](crate::by_facility) — grouped by (geolocation, week,
  facility), sorted ascending by week for animation frame order.

The one exception to ratio-of-sums is
[`binary_rate_by_state`](crate::binary_rate_by_state): a survey answer is a
per-facility fact, so the staffing-shortage rate of a state is the mean of
the answered rows, `sum / count` over the group.

*/
