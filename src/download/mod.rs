// src/download/mod.rs
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::eastmoney::client::EastMoneyClient;
use crate::eastmoney::models::{RawRow, ReportPeriod, ReportRecord};
use crate::storage::{self, ExistingKeys};
use crate::utils::error::StorageError;
use crate::utils::AppError;

/// Whether rows already on disk are skipped or re-appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Incremental,
    Full,
}

/// Knobs for one downloader instance, shared by every period it runs.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub mode: DownloadMode,
    /// Cooperative pause between consecutive page requests.
    pub delay: Duration,
    pub page_size: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            mode: DownloadMode::Incremental,
            delay: Duration::from_millis(500),
            page_size: 50,
        }
    }
}

/// Drives pagination for report periods and appends only new rows.
pub struct Downloader {
    client: EastMoneyClient,
    config: DownloadConfig,
}

impl Downloader {
    /// Creates a downloader, making sure the output directory exists.
    pub fn new(client: EastMoneyClient, config: DownloadConfig) -> Result<Self, StorageError> {
        if !config.output_dir.exists() {
            fs::create_dir_all(&config.output_dir)?;
        }
        Ok(Self { client, config })
    }

    /// Output CSV path for one period.
    pub fn output_path(&self, period: ReportPeriod) -> PathBuf {
        self.config.output_dir.join(period.file_name())
    }

    /// Downloads one report period and appends the rows not yet on disk.
    /// Returns the number of newly appended records.
    ///
    /// Pagination stops at the reported page total, or earlier on the first
    /// page that comes back empty: the upstream count metadata is not always
    /// consistent with the actual data, and an empty page is treated as
    /// end-of-data.
    pub async fn download_period(&self, period: ReportPeriod) -> Result<usize, AppError> {
        let path = self.output_path(period);
        let existing = storage::load_existing_codes(&path);

        tracing::info!("Downloading {} into {}", period, path.display());

        let first = self
            .client
            .fetch_page(period, 1, self.config.page_size)
            .await?;

        if first.count == 0 || first.data.is_empty() {
            tracing::info!("No data published yet for {}", period);
            return Ok(0);
        }

        let total_pages = first.pages.max(1);
        tracing::info!("{}: {} records across {} pages", period, first.count, total_pages);

        // Codes yielded during this run; pages are not guaranteed disjoint.
        let mut seen = HashSet::new();
        let mut new_rows = Vec::new();
        self.collect_rows(&first.data, &existing, &mut seen, &mut new_rows);
        tracing::info!("Page 1/{}: {} new rows so far", total_pages, new_rows.len());

        for page in 2..=total_pages {
            tokio::time::sleep(self.config.delay).await;

            let result = self
                .client
                .fetch_page(period, page, self.config.page_size)
                .await?;

            if result.data.is_empty() {
                tracing::warn!(
                    "Page {}/{} for {} came back empty, treating as end of data",
                    page,
                    total_pages,
                    period
                );
                break;
            }

            self.collect_rows(&result.data, &existing, &mut seen, &mut new_rows);
            tracing::info!("Page {}/{}: {} new rows so far", page, total_pages, new_rows.len());
        }

        let appended = storage::append_records(&path, &new_rows)?;
        tracing::info!("{}: appended {} new records", period, appended);
        Ok(appended)
    }

    /// Maps a page of raw rows and keeps the ones that qualify as new.
    fn collect_rows(
        &self,
        rows: &[RawRow],
        existing: &ExistingKeys,
        seen: &mut HashSet<String>,
        out: &mut Vec<ReportRecord>,
    ) {
        for raw in rows {
            let record = ReportRecord::from_raw(raw);
            if record.stock_code.is_empty() {
                tracing::debug!("Skipping row without a stock code");
                continue;
            }
            if seen.contains(&record.stock_code) {
                continue;
            }
            if self.config.mode == DownloadMode::Incremental
                && existing.contains(&record.stock_code)
            {
                continue;
            }
            seen.insert(record.stock_code.clone());
            out.push(record);
        }
    }

    /// Downloads several periods sequentially. A failed period is logged and
    /// counted as zero new records; the remaining periods still run.
    pub async fn download_many(&self, periods: &[ReportPeriod]) -> Vec<(ReportPeriod, usize)> {
        let mut summary = Vec::with_capacity(periods.len());

        for (i, &period) in periods.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            match self.download_period(period).await {
                Ok(count) => summary.push((period, count)),
                Err(e) => {
                    tracing::error!("Download of {} failed: {}", period, e);
                    summary.push((period, 0));
                }
            }
        }

        summary
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::eastmoney::models::Quarter;
    use mockito::{Matcher, Server, ServerGuard};
    use std::fs;

    const PERIOD_FILE: &str = "业绩报表_2024年年报.csv";

    fn period() -> ReportPeriod {
        ReportPeriod::new(2024, Quarter::Q4)
    }

    fn page_body(count: u64, pages: u32, codes: &[&str]) -> String {
        let rows: Vec<String> = codes
            .iter()
            .map(|code| {
                format!(
                    r#"{{"SECURITY_CODE":"{}","SECURITY_NAME_ABBR":"示例{}","BASIC_EPS":1.0}}"#,
                    code, code
                )
            })
            .collect();
        format!(
            r#"{{"success":true,"result":{{"count":{},"pages":{},"data":[{}]}}}}"#,
            count,
            pages,
            rows.join(",")
        )
    }

    async fn mock_page(server: &mut ServerGuard, page: u32, body: String) -> mockito::Mock {
        server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded("pageNumber".into(), page.to_string()))
            .with_body(body)
            .create_async()
            .await
    }

    fn downloader(server: &ServerGuard, dir: &std::path::Path, mode: DownloadMode) -> Downloader {
        let client = EastMoneyClient::with_api_url(server.url()).unwrap();
        let config = DownloadConfig {
            output_dir: dir.to_path_buf(),
            mode,
            delay: Duration::ZERO,
            page_size: 2,
        };
        Downloader::new(client, config).unwrap()
    }

    #[tokio::test]
    async fn merges_new_rows_across_pages_and_keeps_one_header() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(3, 2, &["600000", "600001"])).await;
        mock_page(&mut server, 2, page_body(3, 2, &["600002"])).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PERIOD_FILE);
        // Pre-existing file holding only 600000.
        fs::write(
            &path,
            "\u{feff}股票代码,股票简称\n600000,浦发银行\n",
        )
        .unwrap();

        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);
        let appended = downloader.download_period(period()).await.unwrap();
        assert_eq!(appended, 2);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(text.lines().filter(|l| l.contains("股票代码")).count(), 1);
        assert!(lines[2].starts_with("600001"));
        assert!(lines[3].starts_with("600002"));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(3, 2, &["600000", "600001"])).await;
        mock_page(&mut server, 2, page_body(3, 2, &["600002"])).await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);

        let first_run = downloader.download_period(period()).await.unwrap();
        assert_eq!(first_run, 3);
        let after_first = fs::read(dir.path().join(PERIOD_FILE)).unwrap();

        let second_run = downloader.download_period(period()).await.unwrap();
        assert_eq!(second_run, 0);
        let after_second = fs::read(dir.path().join(PERIOD_FILE)).unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn full_mode_bypasses_the_existing_index() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(2, 1, &["600000", "600001"])).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PERIOD_FILE);
        fs::write(&path, "\u{feff}股票代码\n600000\n").unwrap();

        let downloader = downloader(&server, dir.path(), DownloadMode::Full);
        let appended = downloader.download_period(period()).await.unwrap();

        // Both rows kept, including the one already on disk.
        assert_eq!(appended, 2);
    }

    #[tokio::test]
    async fn repeated_codes_across_pages_are_yielded_once() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(3, 2, &["600000", "600001"])).await;
        mock_page(&mut server, 2, page_body(3, 2, &["600001"])).await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);
        let appended = downloader.download_period(period()).await.unwrap();

        assert_eq!(appended, 2);
    }

    #[tokio::test]
    async fn empty_page_terminates_before_reported_total() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(6, 3, &["600000", "600001"])).await;
        mock_page(&mut server, 2, page_body(6, 3, &[])).await;
        let page3 = mock_page(&mut server, 3, page_body(6, 3, &["600004"])).await.expect(0);

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);
        let appended = downloader.download_period(period()).await.unwrap();

        assert_eq!(appended, 2);
        page3.assert();
    }

    #[tokio::test]
    async fn empty_dataset_writes_nothing() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, page_body(0, 1, &[])).await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);
        let appended = downloader.download_period(period()).await.unwrap();

        assert_eq!(appended, 0);
        assert!(!dir.path().join(PERIOD_FILE).exists());
    }

    #[tokio::test]
    async fn failed_period_does_not_stop_the_next_one() {
        let mut server = Server::new_async().await;
        // 2023 errors at the transport level; 2024 succeeds.
        server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded(
                "filter".into(),
                "(REPORTDATE='2023-12-31')".into(),
            ))
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded(
                "filter".into(),
                "(REPORTDATE='2024-12-31')".into(),
            ))
            .with_body(page_body(1, 1, &["600000"]))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, dir.path(), DownloadMode::Incremental);
        let summary = downloader
            .download_many(&[
                ReportPeriod::new(2023, Quarter::Q4),
                ReportPeriod::new(2024, Quarter::Q4),
            ])
            .await;

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].1, 0);
        assert_eq!(summary[1].1, 1);
        assert!(dir.path().join(PERIOD_FILE).exists());
    }
}
