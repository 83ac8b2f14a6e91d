//! Episeries Core — daily case-report ingestion and consolidation.
//!
//! This crate contains the whole pipeline:
//! - Canonical daily-table schema (composite key, count and rate columns)
//! - Day fetcher for the CSSE daily-report mirror (absent days are normal)
//! - Schema normalizer collapsing historical header variants
//! - Parquet day cache with a provisional-window purge policy
//! - Series assembler producing the consolidated multi-index series

pub mod assemble;
pub mod cache;
pub mod csse;
pub mod normalize;
pub mod provider;
pub mod schema;

pub use assemble::{
    assemble_series, consolidate, refresh_cache, AssembleOptions, DayOutcome, RefreshProgress,
    RefreshSummary, SilentProgress, StdoutProgress,
};
pub use cache::{CacheMeta, DailyCache};
pub use csse::CsseDailyReports;
pub use normalize::normalize_day;
pub use provider::{DailyProvider, DataError, DayFetch};
