//! Property tests for normalization and the derived columns.
//!
//! Uses proptest to verify:
//! 1. The column-rename map is idempotent: one application reaches a fixed
//!    point for any header in the upstream alphabet
//! 2. Deltas reconstruct the series: the first difference telescopes back
//!    to last-minus-first, with a leading zero
//! 3. Active never goes negative and matches the clamped ledger balance

use chrono::NaiveDate;
use polars::prelude::*;
use proptest::prelude::*;

use episeries_core::assemble::{consolidate, ACTIVE, DELTA_CONFIRMED};
use episeries_core::normalize::{canonical_column_name, normalize_day};
use episeries_core::schema::CONFIRMED;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 22).unwrap()
}

fn single_key_day(d: NaiveDate, confirmed: i64, deaths: i64, recovered: i64) -> DataFrame {
    let raw = df!(
        "Province_State" => ["Hubei"],
        "Country_Region" => ["China"],
        "Confirmed" => [confirmed],
        "Deaths" => [deaths],
        "Recovered" => [recovered],
    )
    .unwrap();
    normalize_day(raw, d).unwrap()
}

/// Headers drawn from the characters upstream has actually used.
fn arb_header() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z_/ -]{0,24}").unwrap()
}

fn arb_counts() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(0..1_000_000i64, 1..12)
}

proptest! {
    /// Applying the rename map twice yields the same name as applying it
    /// once, for any plausible header string.
    #[test]
    fn rename_map_reaches_a_fixed_point(header in arb_header()) {
        let once = canonical_column_name(&header);
        let twice = canonical_column_name(&once);
        prop_assert_eq!(once, twice);
    }

    /// Day-over-day deltas start at zero and telescope: their sum equals
    /// the difference between the last and first observations.
    #[test]
    fn deltas_telescope(confirmed in arb_counts()) {
        let frames: Vec<DataFrame> = confirmed
            .iter()
            .enumerate()
            .map(|(i, c)| single_key_day(epoch() + chrono::Duration::days(i as i64), *c, 0, 0))
            .collect();

        let out = consolidate(frames).unwrap();
        let delta = out.column(DELTA_CONFIRMED).unwrap().i64().unwrap();

        prop_assert_eq!(delta.get(0), Some(0));
        let total: i64 = (0..out.height()).map(|i| delta.get(i).unwrap()).sum();
        prop_assert_eq!(total, confirmed.last().unwrap() - confirmed.first().unwrap());

        for i in 1..out.height() {
            prop_assert_eq!(delta.get(i), Some(confirmed[i] - confirmed[i - 1]));
        }
    }

    /// Active equals the ledger balance clamped at zero, never negative.
    #[test]
    fn active_is_clamped_ledger_balance(
        confirmed in 0..100_000i64,
        deaths in 0..100_000i64,
        recovered in 0..100_000i64,
    ) {
        let out = consolidate(vec![single_key_day(epoch(), confirmed, deaths, recovered)]).unwrap();
        let active = out.column(ACTIVE).unwrap().i64().unwrap().get(0).unwrap();

        prop_assert!(active >= 0);
        prop_assert_eq!(active, (confirmed - deaths - recovered).max(0));

        let total = out.column(CONFIRMED).unwrap().i64().unwrap().get(0).unwrap();
        prop_assert_eq!(total, confirmed);
    }
}
