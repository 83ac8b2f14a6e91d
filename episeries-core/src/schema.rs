//! Canonical daily-table schema.
//!
//! Every cached day and the consolidated series share this contract: a
//! four-column composite key that never contains nulls, three integer count
//! columns, and two floating-point rate columns. The normalizer produces it,
//! the cache persists it, the assembler consumes it.

use chrono::NaiveDate;
use polars::prelude::*;

/// Date component of the composite key. Always the report day, never the
/// unreliable per-row timestamp published upstream.
pub const LAST_UPDATE: &str = "Last_Update";
pub const COUNTRY_REGION: &str = "Country_Region";
pub const PROVINCE_STATE: &str = "Province_State";
pub const ADMIN2: &str = "Admin2";

pub const CONFIRMED: &str = "Confirmed";
pub const DEATHS: &str = "Deaths";
pub const RECOVERED: &str = "Recovered";
pub const INCIDENT_RATE: &str = "Incident_Rate";
pub const CASE_FATALITY_RATIO: &str = "Case_Fatality_Ratio";

/// Composite key identifying one reporting unit on one day.
pub const KEY_COLUMNS: [&str; 4] = [LAST_UPDATE, COUNTRY_REGION, PROVINCE_STATE, ADMIN2];

/// The key minus the date axis; the grouping used for day-over-day deltas.
pub const REGION_COLUMNS: [&str; 3] = [COUNTRY_REGION, PROVINCE_STATE, ADMIN2];

/// Cumulative case counts. A missing value means 0.
pub const COUNT_COLUMNS: [&str; 3] = [CONFIRMED, DEATHS, RECOVERED];

/// Per-100k and ratio columns, kept as floating point. A missing value
/// means 0.0.
pub const RATE_COLUMNS: [&str; 2] = [INCIDENT_RATE, CASE_FATALITY_RATIO];

/// Date format of the path component shared by the remote source and the
/// local cache: `01-22-2020.csv` upstream, `01-22-2020.parquet` on disk.
pub const DAY_STEM_FORMAT: &str = "%m-%d-%Y";

/// The canonical column set with its dtypes, in column order.
pub fn canonical_schema() -> Schema {
    Schema::from_iter(vec![
        Field::new(LAST_UPDATE.into(), DataType::Date),
        Field::new(COUNTRY_REGION.into(), DataType::String),
        Field::new(PROVINCE_STATE.into(), DataType::String),
        Field::new(ADMIN2.into(), DataType::String),
        Field::new(CONFIRMED.into(), DataType::Int64),
        Field::new(DEATHS.into(), DataType::Int64),
        Field::new(RECOVERED.into(), DataType::Int64),
        Field::new(INCIDENT_RATE.into(), DataType::Float64),
        Field::new(CASE_FATALITY_RATIO.into(), DataType::Float64),
    ])
}

/// A zero-row table with the canonical schema: the contribution of a day
/// with no published report.
pub fn empty_canonical() -> DataFrame {
    let columns: Vec<Column> = canonical_schema()
        .iter_fields()
        .map(|field| Series::new_empty(field.name().clone(), field.dtype()).into_column())
        .collect();
    DataFrame::new(columns).expect("canonical schema has unique column names")
}

/// Days since the Unix epoch: polars' physical representation of `Date`.
pub fn day_to_ordinal(day: NaiveDate) -> i32 {
    let unix_epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date");
    (day - unix_epoch).num_days() as i32
}

/// Validate that a frame carries the canonical columns with the canonical
/// dtypes.
pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
    let expected = canonical_schema();
    let actual = df.schema();

    for field in expected.iter_fields() {
        let actual_dtype = actual
            .get(field.name())
            .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
        if actual_dtype != field.dtype() {
            return Err(SchemaError::TypeMismatch {
                column: field.name().to_string(),
                expected: field.dtype().clone(),
                actual: actual_dtype.clone(),
            });
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
