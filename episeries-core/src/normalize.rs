//! Schema normalization: one day's raw table into the canonical contract.
//!
//! The upstream publisher changed its column naming several times over the
//! life of the dataset (separator style, a renamed fatality-ratio column,
//! latitude/longitude spellings) and added columns midway (`Admin2`, the
//! rate columns). This module collapses all historical variants into the
//! canonical set, synthesizes whatever is missing, and stamps the requested
//! day over the unreliable per-row update timestamps. Malformed input is
//! coerced, never rejected.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::provider::DataError;
use crate::schema::{
    day_to_ordinal, ADMIN2, CASE_FATALITY_RATIO, CONFIRMED, COUNTRY_REGION, COUNT_COLUMNS,
    DEATHS, INCIDENT_RATE, KEY_COLUMNS, LAST_UPDATE, PROVINCE_STATE, RATE_COLUMNS, RECOVERED,
};

/// Collapse one historical column-name variant into its canonical form.
///
/// The substitutions are applied in a fixed order but are non-conflicting
/// and idempotent: an already-canonical name passes through unchanged.
pub fn canonical_column_name(name: &str) -> String {
    name.replace('/', "_")
        .replace(' ', "_")
        .replace("Case-Fatality_Ratio", CASE_FATALITY_RATIO)
        .replace("Latitude", "Lat")
        .replace("Longitude", "Long_")
        .replace("Incidence_Rate", INCIDENT_RATE)
}

/// Normalize one day's raw table into a canonical daily table.
///
/// Output is keyed by (Last_Update, Country_Region, Province_State, Admin2)
/// with no nulls anywhere, sorted by that key, and carries exactly the
/// canonical column set. Geo-coordinates and other non-essential columns
/// are dropped by the final projection; their absence is not an error.
pub fn normalize_day(raw: DataFrame, day: NaiveDate) -> Result<DataFrame, DataError> {
    let mut df = raw;

    // Collapse historical header variants.
    let renames: Vec<(String, String)> = df
        .get_column_names()
        .iter()
        .filter_map(|name| {
            let canonical = canonical_column_name(name.as_str());
            (canonical != name.as_str()).then(|| (name.to_string(), canonical))
        })
        .collect();
    for (old, new) in renames {
        df.rename(&old, new.into())?;
    }
    // `DataFrame::rename` populates the cached schema (it checks for a name
    // collision) and renames the columns in place, but does not invalidate
    // that cache afterward. Drop it so the `.lazy()` view below sees the
    // canonical names rather than the stale pre-rename ones. (When columns
    // are synthesized below, `with_column` clears the cache as a side
    // effect, which is why only the all-columns-present path needs this.)
    df.clear_schema();

    // Older publications lack part of the canonical set entirely: Admin2
    // appeared 2020-03-22, the rate columns later still. Synthesize the
    // missing columns so every canonical table carries the full set.
    let height = df.height();
    for name in [COUNTRY_REGION, PROVINCE_STATE, ADMIN2] {
        if df.column(name).is_err() {
            df.with_column(Series::full_null(name.into(), height, &DataType::String))?;
        }
    }
    for name in COUNT_COLUMNS {
        if df.column(name).is_err() {
            df.with_column(Series::full_null(name.into(), height, &DataType::Int64))?;
        }
    }
    for name in RATE_COLUMNS {
        if df.column(name).is_err() {
            df.with_column(Series::full_null(name.into(), height, &DataType::Float64))?;
        }
    }

    eprintln!("DEBUG cols after synth: {:?}", df.get_column_names());
    // Stamp the requested day, coerce the value columns (casts are
    // non-strict: unparseable cells become nulls and are filled), fill the
    // key sentinels, and project down to the canonical set.
    let day_ordinal = day_to_ordinal(day);
    for name in df.get_column_names() {
        eprintln!("DEBUG name bytes {:?} = {:?}", name.as_str(), name.as_bytes());
    }
    let lf_schema = df.clone().lazy().collect_schema();
    eprintln!("DEBUG lazy schema: {:?}", lf_schema.map(|s| s.iter_names().map(|n| n.to_string()).collect::<Vec<_>>()));
    let df = df
        .lazy()
        .with_columns([
            lit(day_ordinal).cast(DataType::Date).alias(LAST_UPDATE),
            col(COUNTRY_REGION).cast(DataType::String).fill_null(lit("")),
            col(PROVINCE_STATE).cast(DataType::String).fill_null(lit("")),
            col(ADMIN2).cast(DataType::String).fill_null(lit("")),
            count_column(CONFIRMED),
            count_column(DEATHS),
            count_column(RECOVERED),
            rate_column(INCIDENT_RATE),
            rate_column(CASE_FATALITY_RATIO),
        ])
        .select([
            col(LAST_UPDATE),
            col(COUNTRY_REGION),
            col(PROVINCE_STATE),
            col(ADMIN2),
            col(CONFIRMED),
            col(DEATHS),
            col(RECOVERED),
            col(INCIDENT_RATE),
            col(CASE_FATALITY_RATIO),
        ])
        .sort(KEY_COLUMNS, SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;

    Ok(df)
}

/// Cumulative counts are integers; the float detour keeps values that were
/// published with a decimal point.
fn count_column(name: &str) -> Expr {
    col(name)
        .cast(DataType::Float64)
        .fill_null(lit(0.0))
        .cast(DataType::Int64)
}

fn rate_column(name: &str) -> Expr {
    col(name).cast(DataType::Float64).fill_null(lit(0.0))
}
