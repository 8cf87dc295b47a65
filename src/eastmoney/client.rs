// src/eastmoney/client.rs
use std::time::Duration;

use reqwest::header;

use crate::eastmoney::models::{ApiResponse, ReportPage, ReportPeriod};
use crate::utils::error::FetchError;

/// Production endpoint of the East Money data-center API.
pub const DEFAULT_API_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";

// The endpoint rejects requests without a browser-like User-Agent/Referer.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REFERER: &str = "https://data.eastmoney.com/";

const REPORT_NAME: &str = "RPT_LICO_FN_CPD";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the performance-report dataset.
pub struct EastMoneyClient {
    http: reqwest::Client,
    api_url: String,
}

impl EastMoneyClient {
    /// Creates a client against the production endpoint.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_api_url(DEFAULT_API_URL)
    }

    /// Creates a client against an alternate endpoint (used by tests).
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http, api_url: api_url.into() })
    }

    /// Fetches one page of report rows for the given period.
    ///
    /// Returns the decoded page (rows + total count + total pages). A
    /// transport failure, non-2xx status, `success: false` payload or
    /// undecodable body all surface as an error; there is no retry here.
    pub async fn fetch_page(
        &self,
        period: ReportPeriod,
        page: u32,
        page_size: u32,
    ) -> Result<ReportPage, FetchError> {
        let filter = format!("(REPORTDATE='{}')", period.report_date());
        let page_number = page.to_string();
        let page_size = page_size.to_string();

        let params = [
            ("sortColumns", "UPDATE_DATE,SECURITY_CODE"),
            ("sortTypes", "-1,-1"),
            ("pageSize", page_size.as_str()),
            ("pageNumber", page_number.as_str()),
            ("reportName", REPORT_NAME),
            ("columns", "ALL"),
            ("filter", filter.as_str()),
            ("source", "WEB"),
            ("client", "WEB"),
        ];

        tracing::debug!("Requesting {} page {} from {}", period, page, self.api_url);

        let response = self
            .http
            .get(&self.api_url)
            .query(&params)
            .header(header::ACCEPT, "*/*")
            .header(header::REFERER, REFERER)
            .send()
            .await?; // Propagates reqwest::Error as FetchError::Network

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for {} page {}", status, period, page);
            return Err(FetchError::Http(status));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if !body.success {
            let message = body.message.unwrap_or_else(|| "unknown error".to_string());
            tracing::error!("API error for {} page {}: {}", period, page, message);
            return Err(FetchError::Api(message));
        }

        let result = body.result.unwrap_or_default();
        tracing::debug!(
            "{} page {}: {} rows ({} total, {} pages)",
            period,
            page,
            result.data.len(),
            result.count,
            result.pages
        );

        Ok(result)
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::eastmoney::models::Quarter;
    use mockito::Matcher;

    fn period() -> ReportPeriod {
        ReportPeriod::new(2024, Quarter::Q4)
    }

    #[tokio::test]
    async fn fetch_page_decodes_success_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pageNumber".into(), "1".into()),
                Matcher::UrlEncoded("reportName".into(), "RPT_LICO_FN_CPD".into()),
                Matcher::UrlEncoded("filter".into(), "(REPORTDATE='2024-12-31')".into()),
            ]))
            .with_body(
                r#"{"success":true,"message":"ok","result":
                   {"count":1,"pages":1,"data":[{"SECURITY_CODE":"600000"}]}}"#,
            )
            .create_async()
            .await;

        let client = EastMoneyClient::with_api_url(server.url()).unwrap();
        let page = client.fetch_page(period(), 1, 50).await.unwrap();

        assert_eq!(page.count, 1);
        assert_eq!(page.pages, 1);
        assert_eq!(page.data.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_page_surfaces_api_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":false,"message":"参数错误"}"#)
            .create_async()
            .await;

        let client = EastMoneyClient::with_api_url(server.url()).unwrap();
        let err = client.fetch_page(period(), 1, 50).await.unwrap_err();

        match err {
            FetchError::Api(message) => assert_eq!(message, "参数错误"),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_page_maps_http_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = EastMoneyClient::with_api_url(server.url()).unwrap();
        let err = client.fetch_page(period(), 1, 50).await.unwrap_err();

        assert!(matches!(err, FetchError::Http(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn fetch_page_rejects_garbage_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = EastMoneyClient::with_api_url(server.url()).unwrap();
        let err = client.fetch_page(period(), 1, 50).await.unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)));
    }
}
