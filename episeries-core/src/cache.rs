//! Parquet day cache.
//!
//! Layout: `{root}/{MM-DD-YYYY}.parquet`, one file per report day, plus an
//! advisory `meta.json` sidecar describing the cache as a whole.
//!
//! Features:
//! - Root directory created on first write
//! - Atomic writes (write to .tmp, rename into place)
//! - Tolerant reads: a day that cannot be opened or decoded contributes an
//!   empty table instead of aborting a whole range
//! - Provisional-window purge: drop the n chronologically-last entries so
//!   days the publisher may still be revising get refetched

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::DataError;
use crate::schema::{self, DAY_STEM_FORMAT};

/// Advisory sidecar, refreshed after each update pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub source: String,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub day_count: usize,
    pub refreshed_at: chrono::NaiveDateTime,
}

/// The day cache.
pub struct DailyCache {
    root: PathBuf,
}

impl DailyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one day's entry: `{root}/{MM-DD-YYYY}.parquet`.
    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{}.parquet", day.format(DAY_STEM_FORMAT)))
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn exists(&self, day: NaiveDate) -> bool {
        self.day_path(day).is_file()
    }

    /// Write one day's canonical table. Idempotent overwrite; the write is
    /// atomic (tmp file, then rename into place).
    pub fn write(&self, day: NaiveDate, table: &DataFrame) -> Result<(), DataError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| DataError::CacheError(format!("failed to create cache dir: {e}")))?;

        let path = self.day_path(day);
        let tmp_path = path.with_extension("parquet.tmp");

        let file = fs::File::create(&tmp_path)
            .map_err(|e| DataError::CacheError(format!("create {}: {e}", tmp_path.display())))?;
        ParquetWriter::new(file)
            .finish(&mut table.clone())
            .map_err(|e| DataError::CacheError(format!("parquet write for {day}: {e}")))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        Ok(())
    }

    /// Strict read of one day's table. Fails with `NoCachedDay` if the
    /// entry is absent.
    pub fn read(&self, day: NaiveDate) -> Result<DataFrame, DataError> {
        let path = self.day_path(day);
        if !path.is_file() {
            return Err(DataError::NoCachedDay { day });
        }

        let file = fs::File::open(&path)
            .map_err(|e| DataError::CacheError(format!("open {}: {e}", path.display())))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::CacheError(format!("read {}: {e}", path.display())))
    }

    /// Tolerant read used by the assembler: any failure to open or decode a
    /// supposedly-present entry is logged and degraded to an empty table.
    pub fn read_or_empty(&self, day: NaiveDate) -> DataFrame {
        match self.read(day) {
            Ok(df) => df,
            Err(err) => {
                warn!(%day, %err, "not a valid cached day, treating as empty");
                schema::empty_canonical()
            }
        }
    }

    /// Days currently cached, sorted chronologically. Files whose stem does
    /// not parse as a report day (sidecars, temp files) are ignored.
    pub fn cached_days(&self) -> Result<Vec<NaiveDate>, DataError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root)
            .map_err(|e| DataError::CacheError(format!("read cache dir: {e}")))?;

        let mut days = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("cache dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(day) = NaiveDate::parse_from_str(stem, DAY_STEM_FORMAT) {
                days.push(day);
            }
        }

        days.sort_unstable();
        Ok(days)
    }

    /// Delete the n chronologically-last entries to force a refetch of days
    /// the publisher may still be revising.
    ///
    /// `n = 0` is a no-op (guards against clearing the whole cache when the
    /// caller's intent is "purge nothing"), as is a root directory that
    /// does not exist yet. Entries are ordered by their parsed date, so the
    /// purge stays chronological across year boundaries despite the
    /// month-first filename format. Returns the number of entries removed.
    pub fn purge_recent(&self, n: usize) -> Result<usize, DataError> {
        if n == 0 || !self.root.is_dir() {
            return Ok(0);
        }

        let days = self.cached_days()?;
        let keep = days.len().saturating_sub(n);
        for day in &days[keep..] {
            let path = self.day_path(*day);
            fs::remove_file(&path)
                .map_err(|e| DataError::CacheError(format!("purge {}: {e}", path.display())))?;
            debug!(day = %day, "purged provisional cache entry");
        }

        Ok(days.len() - keep)
    }

    /// Write the advisory metadata sidecar.
    pub fn write_meta(&self, meta: &CacheMeta) -> Result<(), DataError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| DataError::CacheError(format!("failed to create cache dir: {e}")))?;
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(), json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        Ok(())
    }

    /// Read the advisory metadata sidecar, if present and parseable.
    pub fn read_meta(&self) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_day;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("episeries_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table(d: NaiveDate) -> DataFrame {
        let raw = df!(
            "Province_State" => ["Hubei", "Guangdong"],
            "Country_Region" => ["China", "China"],
            "Confirmed" => [444i64, 26],
            "Deaths" => [17i64, 0],
            "Recovered" => [28i64, 0],
        )
        .unwrap();
        normalize_day(raw, d).unwrap()
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 1, 22);

        cache.write(d, &sample_table(d)).unwrap();
        let loaded = cache.read(d).unwrap();

        assert!(loaded.equals(&sample_table(d)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_is_idempotent_overwrite() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 1, 22);

        cache.write(d, &sample_table(d)).unwrap();
        cache.write(d, &sample_table(d)).unwrap();

        assert_eq!(cache.cached_days().unwrap(), vec![d]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_tables_cache_and_restore() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2023, 3, 10);

        cache.write(d, &schema::empty_canonical()).unwrap();
        let loaded = cache.read(d).unwrap();

        assert_eq!(loaded.height(), 0);
        schema::validate(&loaded).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_missing_day_is_an_error() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);

        let result = cache.read(day(2020, 1, 22));
        assert!(matches!(result, Err(DataError::NoCachedDay { .. })));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_or_empty_degrades_corrupt_entries() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 5, 1);

        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("05-01-2020.parquet"), b"not a parquet file").unwrap();

        assert!(cache.exists(d));
        let loaded = cache.read_or_empty(d);
        assert_eq!(loaded.height(), 0);
        schema::validate(&loaded).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cached_days_ignores_foreign_files() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 1, 22);

        cache.write(d, &sample_table(d)).unwrap();
        fs::write(dir.join("meta.json"), "{}").unwrap();
        fs::write(dir.join("01-23-2020.parquet.tmp"), b"partial").unwrap();
        fs::write(dir.join("notes.txt"), b"hello").unwrap();

        assert_eq!(cache.cached_days().unwrap(), vec![d]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_zero_is_a_no_op() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 1, 22);

        cache.write(d, &sample_table(d)).unwrap();
        assert_eq!(cache.purge_recent(0).unwrap(), 0);
        assert!(cache.exists(d));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_on_missing_root_is_a_no_op() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);

        assert_eq!(cache.purge_recent(5).unwrap(), 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_removes_chronologically_last_entries() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let days = [day(2020, 1, 22), day(2020, 1, 23), day(2020, 1, 24)];

        for d in days {
            cache.write(d, &sample_table(d)).unwrap();
        }
        assert_eq!(cache.purge_recent(2).unwrap(), 2);
        assert_eq!(cache.cached_days().unwrap(), vec![days[0]]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_is_chronological_across_year_boundaries() {
        // Lexicographic filename order would wrongly rank 12-31-2020 after
        // 01-01-2021; the purge must go by the parsed date.
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let old = day(2020, 12, 31);
        let newer = day(2021, 1, 1);

        cache.write(old, &sample_table(old)).unwrap();
        cache.write(newer, &sample_table(newer)).unwrap();

        assert_eq!(cache.purge_recent(1).unwrap(), 1);
        assert_eq!(cache.cached_days().unwrap(), vec![old]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_larger_than_cache_clears_it() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);
        let d = day(2020, 1, 22);

        cache.write(d, &sample_table(d)).unwrap();
        assert_eq!(cache.purge_recent(10).unwrap(), 1);
        assert!(cache.cached_days().unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn meta_roundtrip() {
        let dir = temp_cache_dir();
        let cache = DailyCache::new(&dir);

        assert!(cache.read_meta().is_none());

        let meta = CacheMeta {
            source: "csse_daily_reports".into(),
            first_day: Some(day(2020, 1, 22)),
            last_day: Some(day(2020, 2, 1)),
            day_count: 11,
            refreshed_at: chrono::Local::now().naive_local(),
        };
        cache.write_meta(&meta).unwrap();

        let loaded = cache.read_meta().unwrap();
        assert_eq!(loaded.source, meta.source);
        assert_eq!(loaded.first_day, meta.first_day);
        assert_eq!(loaded.day_count, 11);

        let _ = fs::remove_dir_all(&dir);
    }
}
