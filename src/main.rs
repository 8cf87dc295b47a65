// src/main.rs
mod download;
mod eastmoney;
mod storage;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Datelike;
use clap::Parser;

use download::{DownloadConfig, DownloadMode, Downloader};
use eastmoney::client::EastMoneyClient;
use eastmoney::models::{Quarter, ReportPeriod};
use utils::AppError;

/// Command Line Interface for the East Money performance-report downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Report year to download
    #[arg(short, long)]
    year: Option<u16>,

    /// Quarter: Q1-Q4, a bare digit, or 一季报/半年报/中报/三季报/年报
    #[arg(short, long, default_value = "Q4")]
    quarter: Quarter,

    /// Download all four quarters of the requested year(s)
    #[arg(short, long)]
    all: bool,

    /// Start year for a range download (use with --end)
    #[arg(short, long)]
    start: Option<u16>,

    /// End year for a range download (use with --start)
    #[arg(short, long)]
    end: Option<u16>,

    /// Output directory for the CSV files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Delay between page requests, in seconds
    #[arg(short, long, default_value_t = 0.5)]
    delay: f64,

    /// Re-download every row instead of skipping codes already on disk
    #[arg(long)]
    full: bool,

    /// Rows requested per page
    #[arg(long, default_value_t = 50)]
    page_size: u32,
}

/// Expands the CLI arguments into the list of periods to download.
fn requested_periods(args: &Args) -> Result<Vec<ReportPeriod>, AppError> {
    let years: Vec<u16> = if let Some(year) = args.year {
        vec![year]
    } else if let (Some(start), Some(end)) = (args.start, args.end) {
        if start > end {
            return Err(AppError::Config(format!(
                "start year {} is after end year {}",
                start, end
            )));
        }
        (start..=end).collect()
    } else {
        return Err(AppError::Config(
            "specify --year, or both --start and --end".to_string(),
        ));
    };

    let current_year = chrono::Utc::now().year() as u16;
    for &year in &years {
        if year > current_year {
            tracing::warn!("{} is in the future; the API will likely report no data", year);
        }
    }

    let quarters: Vec<Quarter> = if args.all {
        Quarter::ALL.to_vec()
    } else {
        vec![args.quarter]
    };

    let periods = years
        .iter()
        .flat_map(|&year| quarters.iter().map(move |&quarter| ReportPeriod::new(year, quarter)))
        .collect();
    Ok(periods)
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting download for args: {:?}", args);

    if !args.delay.is_finite() || args.delay < 0.0 {
        return Err(AppError::Config(format!("invalid delay: {}", args.delay)));
    }

    let periods = requested_periods(&args)?;

    // 3. Build the client and downloader
    let config = DownloadConfig {
        output_dir: args.output.clone(),
        mode: if args.full { DownloadMode::Full } else { DownloadMode::Incremental },
        delay: Duration::from_secs_f64(args.delay),
        page_size: args.page_size,
    };
    let client = EastMoneyClient::new()?;
    let downloader = Downloader::new(client, config).map_err(AppError::Storage)?;

    // 4. Run every requested period; failed periods are logged, not fatal
    let summary = downloader.download_many(&periods).await;

    let total: usize = summary.iter().map(|(_, count)| count).sum();
    if summary.len() > 1 {
        tracing::info!("Download summary:");
        for (period, count) in &summary {
            tracing::info!("  {}: {} new records", period, count);
        }
    }
    tracing::info!("Done. {} new records across {} period(s)", total, summary.len());

    Ok(())
}
