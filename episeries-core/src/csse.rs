//! JHU CSSE daily-report provider.
//!
//! Fetches one CSV per day from the CSSEGISandData GitHub raw mirror. An
//! HTTP 404 means the day was never published (true for every future date)
//! and maps to [`DayFetch::Absent`]. Parsing treats the spreadsheet
//! artifacts `#VALUE!` and `#DIV/0!` that upstream occasionally leaks as
//! missing values.

use std::io::Cursor;
use std::time::Duration;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::provider::{DailyProvider, DataError, DayFetch};
use crate::schema::DAY_STEM_FORMAT;

/// Raw-file base of the upstream repository.
pub const DAILY_REPORTS_BASE_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_daily_reports";

/// Cell values leaked from spreadsheet formulas, parsed as nulls.
const NULL_MARKERS: [&str; 2] = ["#VALUE!", "#DIV/0!"];

/// Blocking HTTP provider for the CSSE daily reports.
pub struct CsseDailyReports {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CsseDailyReports {
    pub fn new() -> Self {
        Self::with_base_url(DAILY_REPORTS_BASE_URL)
    }

    /// Point the provider at a different mirror, or at a local file server
    /// in tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("episeries/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn report_url(&self, day: NaiveDate) -> String {
        format!("{}/{}.csv", self.base_url, day.format(DAY_STEM_FORMAT))
    }
}

impl Default for CsseDailyReports {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyProvider for CsseDailyReports {
    fn name(&self) -> &str {
        "csse_daily_reports"
    }

    fn fetch_day(&self, day: NaiveDate) -> Result<DayFetch, DataError> {
        let url = self.report_url(day);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(DayFetch::Absent);
        }
        if !status.is_success() {
            return Err(DataError::UpstreamStatus {
                day,
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?
            .to_vec();
        parse_daily_csv(body, day).map(DayFetch::Published)
    }
}

/// Parse one day's CSV body into a raw (unnormalized) table.
pub fn parse_daily_csv(body: Vec<u8>, day: NaiveDate) -> Result<DataFrame, DataError> {
    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_null_values(Some(NullValues::AllColumns(
                NULL_MARKERS.iter().map(|m| PlSmallStr::from(*m)).collect(),
            )))
        });

    options
        .into_reader_with_file_handle(Cursor::new(body))
        .finish()
        .map_err(|e| DataError::MalformedReport {
            day,
            reason: e.to_string(),
        })
}
