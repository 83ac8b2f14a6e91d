//! Series assembly: drive the fetch/cache cycle across a date range, then
//! consolidate the cached days into one multi-index series.
//!
//! A refresh pass first drops the provisional window (the most recent
//! cached days, which the publisher may still be revising), then fetches,
//! normalizes and caches every missing day in chronological order. Days
//! with no published report are cached as empty tables so reruns do not
//! re-attempt them. Consolidation concatenates every cached day in the
//! range, deduplicates same-key rows by summation, and derives the Active
//! and day-over-day delta columns.

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::cache::{CacheMeta, DailyCache};
use crate::normalize;
use crate::provider::{DailyProvider, DataError, DayFetch};
use crate::schema::{
    self, ADMIN2, CASE_FATALITY_RATIO, CONFIRMED, COUNTRY_REGION, COUNT_COLUMNS, DEATHS,
    INCIDENT_RATE, KEY_COLUMNS, LAST_UPDATE, PROVINCE_STATE, RATE_COLUMNS, RECOVERED,
    REGION_COLUMNS,
};

/// Derived: Confirmed minus Deaths minus Recovered, floored at zero.
pub const ACTIVE: &str = "Active";
/// Derived: day-over-day change of Confirmed within one reporting unit.
pub const DELTA_CONFIRMED: &str = "ΔConfirmed";
/// Derived: day-over-day change of Deaths within one reporting unit.
pub const DELTA_DEATHS: &str = "ΔDeaths";

/// Presentation order of the consolidated series. The contract is by
/// column name; this ordering (deltas next to the counts they derive from,
/// Active last) is a display convention applied in the final projection.
pub const SERIES_COLUMNS: [&str; 12] = [
    LAST_UPDATE,
    COUNTRY_REGION,
    PROVINCE_STATE,
    ADMIN2,
    CONFIRMED,
    DELTA_CONFIRMED,
    DEATHS,
    DELTA_DEATHS,
    RECOVERED,
    INCIDENT_RATE,
    CASE_FATALITY_RATIO,
    ACTIVE,
];

/// First day the upstream dataset was published.
pub fn series_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 22).expect("valid date")
}

/// Yesterday: the latest day that can plausibly have a published report.
pub fn default_end_day() -> NaiveDate {
    chrono::Local::now().date_naive() - chrono::Duration::days(1)
}

/// Tunable parameters of an assembly run. The only knobs the pipeline has.
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Inclusive range start. Defaults to the dataset epoch, 2020-01-22.
    pub start: Option<NaiveDate>,
    /// Inclusive range end. Defaults to yesterday.
    pub end: Option<NaiveDate>,
    /// Provisional window: this many of the chronologically-last cache
    /// entries are dropped and refetched on every run.
    pub purge_days: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            purge_days: 5,
        }
    }
}

/// What happened to one day during a refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOutcome {
    Fetched,
    Absent,
    AlreadyCached,
}

/// Per-day progress callbacks for long refresh loops.
pub trait RefreshProgress {
    /// Called after each day in the range has been handled.
    fn on_day(&self, day: NaiveDate, index: usize, total: usize, outcome: DayOutcome);

    /// Called when the whole range has been handled.
    fn on_batch_complete(&self, summary: &RefreshSummary);
}

/// Progress reporter that prints to stdout. Quiet about already-cached
/// days, which dominate every run after the first.
pub struct StdoutProgress;

impl RefreshProgress for StdoutProgress {
    fn on_day(&self, day: NaiveDate, index: usize, total: usize, outcome: DayOutcome) {
        match outcome {
            DayOutcome::Fetched => println!("[{}/{}] {day} fetched", index + 1, total),
            DayOutcome::Absent => println!("[{}/{}] {day} not published", index + 1, total),
            DayOutcome::AlreadyCached => {}
        }
    }

    fn on_batch_complete(&self, summary: &RefreshSummary) {
        println!(
            "Refresh complete: {} fetched, {} absent, {} already cached",
            summary.fetched, summary.absent, summary.already_cached
        );
    }
}

/// No-op progress reporter for library callers and tests.
pub struct SilentProgress;

impl RefreshProgress for SilentProgress {
    fn on_day(&self, _day: NaiveDate, _index: usize, _total: usize, _outcome: DayOutcome) {}
    fn on_batch_complete(&self, _summary: &RefreshSummary) {}
}

/// Summary of one refresh pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub fetched: usize,
    pub absent: usize,
    pub already_cached: usize,
}

impl RefreshSummary {
    pub fn total(&self) -> usize {
        self.fetched + self.absent + self.already_cached
    }
}

/// Every day of the inclusive range, in chronological order.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Bring the cache up to date for the inclusive range.
///
/// Purges the provisional window, then fetches, normalizes and caches every
/// day not already present. A transport failure aborts the pass; the days
/// completed before it stay cached, so a rerun resumes where it stopped.
pub fn refresh_cache(
    provider: &dyn DailyProvider,
    cache: &DailyCache,
    start: NaiveDate,
    end: NaiveDate,
    purge_days: usize,
    progress: &dyn RefreshProgress,
) -> Result<RefreshSummary, DataError> {
    cache.purge_recent(purge_days)?;

    let days = days_in_range(start, end);
    let total = days.len();
    let mut summary = RefreshSummary::default();

    for (index, day) in days.iter().copied().enumerate() {
        if cache.exists(day) {
            summary.already_cached += 1;
            progress.on_day(day, index, total, DayOutcome::AlreadyCached);
            continue;
        }

        let outcome = match provider.fetch_day(day)? {
            DayFetch::Published(raw) => {
                let table = normalize::normalize_day(raw, day)?;
                cache.write(day, &table)?;
                summary.fetched += 1;
                DayOutcome::Fetched
            }
            DayFetch::Absent => {
                // Cache the absence too, so reruns do not re-attempt a
                // known-absent day.
                cache.write(day, &schema::empty_canonical())?;
                summary.absent += 1;
                DayOutcome::Absent
            }
        };
        debug!(%day, ?outcome, "day refreshed");
        progress.on_day(day, index, total, outcome);
    }

    let cached = cache.cached_days()?;
    cache.write_meta(&CacheMeta {
        source: provider.name().to_string(),
        first_day: cached.first().copied(),
        last_day: cached.last().copied(),
        day_count: cached.len(),
        refreshed_at: chrono::Local::now().naive_local(),
    })?;

    progress.on_batch_complete(&summary);
    Ok(summary)
}

/// Produce the consolidated series for the range: refresh the cache, read
/// every day back (tolerating unreadable entries), and consolidate.
pub fn assemble_series(
    provider: &dyn DailyProvider,
    cache: &DailyCache,
    options: &AssembleOptions,
    progress: &dyn RefreshProgress,
) -> Result<DataFrame, DataError> {
    let start = options.start.unwrap_or_else(series_epoch);
    let end = options.end.unwrap_or_else(default_end_day);

    refresh_cache(provider, cache, start, end, options.purge_days, progress)?;

    let frames: Vec<DataFrame> = days_in_range(start, end)
        .into_iter()
        .map(|day| cache.read_or_empty(day))
        .collect();

    consolidate(frames)
}

/// Concatenate per-day canonical tables, deduplicate same-key rows by
/// summation, and derive Active and the day-over-day deltas.
pub fn consolidate(frames: Vec<DataFrame>) -> Result<DataFrame, DataError> {
    let mut inputs: Vec<LazyFrame> = frames.into_iter().map(|frame| frame.lazy()).collect();
    if inputs.is_empty() {
        inputs.push(schema::empty_canonical().lazy());
    }

    let sums: Vec<Expr> = COUNT_COLUMNS
        .iter()
        .chain(RATE_COLUMNS.iter())
        .map(|name| col(*name).sum())
        .collect();

    let active = col(CONFIRMED) - col(DEATHS) - col(RECOVERED);

    let df = concat(inputs, UnionArgs::default())?
        // Any gap that survived normalization is still a zero, and the two
        // rate columns are explicitly floating point.
        .with_columns([
            col(CONFIRMED).fill_null(lit(0)),
            col(DEATHS).fill_null(lit(0)),
            col(RECOVERED).fill_null(lit(0)),
            col(INCIDENT_RATE).cast(DataType::Float64).fill_null(lit(0.0)),
            col(CASE_FATALITY_RATIO).cast(DataType::Float64).fill_null(lit(0.0)),
        ])
        // The publisher occasionally emits more than one row for the same
        // key on the same day; summation is the reconciliation policy.
        .group_by_stable(KEY_COLUMNS.map(col))
        .agg(sums)
        .sort(
            KEY_COLUMNS,
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .with_columns([
            when(active.clone().lt(lit(0)))
                .then(lit(0))
                .otherwise(active)
                .alias(ACTIVE),
            day_over_day(CONFIRMED).alias(DELTA_CONFIRMED),
            day_over_day(DEATHS).alias(DELTA_DEATHS),
        ])
        .select(SERIES_COLUMNS.map(col))
        .collect()?;

    Ok(df)
}

/// First difference along the date axis within one reporting unit. The
/// first observed day has no predecessor and reports 0.
fn day_over_day(column: &str) -> Expr {
    (col(column) - col(column).shift(lit(1)).over(REGION_COLUMNS.map(col))).fill_null(lit(0))
}
