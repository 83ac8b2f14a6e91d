//! Episeries CLI — update, export, and cache management commands.
//!
//! Commands:
//! - `update` — refresh the local day cache from the CSSE daily reports
//! - `export` — assemble the consolidated series and write CSV or Parquet
//! - `cache status` — report cached day count, covered range, total size
//! - `cache purge` — drop the most recent cached days to force a refetch

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use polars::prelude::{CsvWriter, ParquetWriter, SerWriter};
use std::path::{Path, PathBuf};

use episeries_core::assemble::{
    assemble_series, default_end_day, refresh_cache, series_epoch, AssembleOptions,
    StdoutProgress,
};
use episeries_core::{CsseDailyReports, DailyCache};

#[derive(Parser)]
#[command(
    name = "episeries",
    about = "Daily case-report cache and series assembler"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the local day cache from the remote daily reports.
    Update {
        /// Start date (YYYY-MM-DD). Defaults to the dataset epoch, 2020-01-22.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// How many of the most recent cached days to drop and refetch.
        #[arg(long, default_value_t = 5)]
        purge_days: usize,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Assemble the consolidated series and write it to disk.
    Export {
        /// Start date (YYYY-MM-DD). Defaults to the dataset epoch.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// How many of the most recent cached days to drop and refetch.
        #[arg(long, default_value_t = 5)]
        purge_days: usize,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Output file.
        #[arg(long, default_value = "series.csv")]
        out: PathBuf,

        /// Output format: csv or parquet.
        #[arg(long, default_value = "csv")]
        format: String,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached day count, covered range, and total size.
    Status {
        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Remove the N most recent cached days.
    Purge {
        /// How many days to remove, counted from the most recent.
        #[arg(long)]
        last: usize,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            start,
            end,
            purge_days,
            cache_dir,
        } => run_update(start, end, purge_days, cache_dir),
        Commands::Export {
            start,
            end,
            purge_days,
            cache_dir,
            out,
            format,
        } => run_export(start, end, purge_days, cache_dir, out, &format),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Purge { last, cache_dir } => run_cache_purge(&cache_dir, last),
        },
    }
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

fn run_update(
    start: Option<String>,
    end: Option<String>,
    purge_days: usize,
    cache_dir: PathBuf,
) -> Result<()> {
    let start_day = start.as_deref().map(parse_day).transpose()?.unwrap_or_else(series_epoch);
    let end_day = end.as_deref().map(parse_day).transpose()?.unwrap_or_else(default_end_day);

    let provider = CsseDailyReports::new();
    let cache = DailyCache::new(cache_dir);

    refresh_cache(&provider, &cache, start_day, end_day, purge_days, &StdoutProgress)
        .context("cache refresh failed")?;

    Ok(())
}

fn run_export(
    start: Option<String>,
    end: Option<String>,
    purge_days: usize,
    cache_dir: PathBuf,
    out: PathBuf,
    format: &str,
) -> Result<()> {
    let options = AssembleOptions {
        start: start.as_deref().map(parse_day).transpose()?,
        end: end.as_deref().map(parse_day).transpose()?,
        purge_days,
    };

    let provider = CsseDailyReports::new();
    let cache = DailyCache::new(cache_dir);

    let mut series = assemble_series(&provider, &cache, &options, &StdoutProgress)
        .context("series assembly failed")?;

    let file = std::fs::File::create(&out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    match format {
        "csv" => CsvWriter::new(file)
            .finish(&mut series)
            .with_context(|| format!("failed to write {}", out.display()))?,
        "parquet" => {
            ParquetWriter::new(file)
                .finish(&mut series)
                .with_context(|| format!("failed to write {}", out.display()))?;
        }
        other => bail!("unknown format '{other}'. Valid: csv, parquet"),
    }

    println!("Wrote {} rows to {}", series.height(), out.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let cache = DailyCache::new(cache_dir);
    let days = cache.cached_days()?;

    if days.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!("Days: {}", days.len());
    println!(
        "Range: {} to {}",
        days.first().unwrap(),
        days.last().unwrap()
    );
    println!("Total size: {}", format_size(dir_size(cache_dir)));

    if let Some(meta) = cache.read_meta() {
        println!("Source: {} (refreshed {})", meta.source, meta.refreshed_at);
    }

    Ok(())
}

fn run_cache_purge(cache_dir: &Path, last: usize) -> Result<()> {
    let cache = DailyCache::new(cache_dir);
    let removed = cache.purge_recent(last)?;

    if removed == 0 {
        println!("Nothing to purge.");
    } else {
        println!("Removed {removed} cached day(s); the next update will refetch them.");
    }

    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
