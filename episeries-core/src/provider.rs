//! Daily-report provider trait and structured error types.
//!
//! `DailyProvider` abstracts over "a row-oriented resource addressable by
//! date" so the assembler can run against the real GitHub mirror or an
//! in-memory fake in tests. Absence of a day is a normal outcome, not an
//! error: most dates at or after today have never been published.

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

/// Structured error types for pipeline operations.
///
/// Expected absence is not represented here; it is [`DayFetch::Absent`].
/// Failures that have a sensible empty-value fallback (a corrupt cache
/// entry) are degraded where they occur and never surface as errors.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("upstream returned HTTP {status} for {day}")]
    UpstreamStatus { day: NaiveDate, status: u16 },

    #[error("malformed daily report for {day}: {reason}")]
    MalformedReport { day: NaiveDate, reason: String },

    #[error("no cached table for {day}; run an update first")]
    NoCachedDay { day: NaiveDate },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

/// Outcome of fetching one day from the remote source.
#[derive(Debug, Clone)]
pub enum DayFetch {
    /// The day was published: its raw, not-yet-normalized table.
    Published(DataFrame),
    /// No report exists for this day.
    Absent,
}

/// Trait for daily-report sources.
///
/// Implementations handle the specifics of one source. The cache layer sits
/// above this trait; providers don't know about the cache.
pub trait DailyProvider {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Retrieve the raw published table for one day.
    ///
    /// Not-found maps to `Ok(DayFetch::Absent)`; only genuine transport
    /// failures are errors. There is no retry logic: the operator reruns
    /// and the cache skips already-completed days.
    fn fetch_day(&self, day: NaiveDate) -> Result<DayFetch, DataError>;
}
