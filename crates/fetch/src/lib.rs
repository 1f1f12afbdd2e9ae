//! HTTP download stage.
//!
//! One [`Downloader`] per worker. A download never surfaces an error to the
//! worker loop: transport failures are retried in-call and exhaustion is
//! reported as a Fail page, so a dead host cannot stall the pipeline.

use std::time::Duration;

use tracing::{debug, warn};

use crawld_core::{CrawlError, PageInfo};

pub struct Downloader {
    client: reqwest::Client,
    retry: u32,
}

impl Downloader {
    pub fn new(timeout_seconds: u32, retry: u32) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(timeout_seconds)))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self {
            client,
            retry: retry.max(1),
        })
    }

    /// GET the URL, retrying transport errors up to the configured attempt
    /// count. Response status codes are not inspected: any transport-complete
    /// response counts as success.
    ///
    /// Also accepts the store's scheme-relative form (`//host/path`), which
    /// re-enqueued records carry, and fetches it over plain http.
    pub async fn download(&self, url: &str) -> PageInfo {
        let target = if url.starts_with("//") {
            format!("http:{url}")
        } else {
            url.to_string()
        };
        let mut last_error = String::new();
        for attempt in 1..=self.retry {
            match self.fetch_once(&target).await {
                Ok(body) => return PageInfo::success(url, body),
                Err(e) => {
                    debug!(url, attempt, error = %e, "download attempt failed");
                    last_error = e;
                }
            }
        }
        warn!(url, retries = self.retry, "download failed, giving up");
        PageInfo::fail(url, last_error)
    }

    async fn fetch_once(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawld_core::PageState;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let downloader = Downloader::new(5, 3).unwrap();
        let page = downloader.download(&format!("{}/page", server.uri())).await;
        assert_eq!(page.state, PageState::Success);
        assert_eq!(page.content, "<html>hi</html>");
        assert!(page.remark.is_empty());
    }

    #[tokio::test]
    async fn http_error_status_still_counts_as_success() {
        // Status codes are deliberately not inspected.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let downloader = Downloader::new(5, 2).unwrap();
        let page = downloader.download(&format!("{}/x", server.uri())).await;
        assert_eq!(page.state, PageState::Success);
        assert_eq!(page.content, "boom");
    }

    #[tokio::test]
    async fn exhausted_retries_report_fail_with_remark() {
        // Grab a port nobody is listening on by letting the mock server drop.
        let dead_uri = {
            let server = MockServer::start().await;
            server.uri()
        };

        let downloader = Downloader::new(1, 2).unwrap();
        let page = downloader.download(&format!("{dead_uri}/x")).await;
        assert_eq!(page.state, PageState::Fail);
        assert!(!page.remark.is_empty());
        assert!(page.content.is_empty());
    }

    #[tokio::test]
    async fn scheme_relative_urls_fetch_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p"))
            .respond_with(ResponseTemplate::new(200).set_body_string("retried"))
            .mount(&server)
            .await;

        let scheme_relative = format!("//{}/p", server.address());
        let downloader = Downloader::new(5, 2).unwrap();
        let page = downloader.download(&scheme_relative).await;
        assert_eq!(page.state, PageState::Success);
        assert_eq!(page.content, "retried");
        // The page keeps the URL it was asked for.
        assert_eq!(page.url, scheme_relative);
    }

    #[tokio::test]
    async fn zero_retry_config_still_attempts_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let downloader = Downloader::new(5, 0).unwrap();
        let page = downloader.download(&format!("{}/x", server.uri())).await;
        assert_eq!(page.state, PageState::Success);
    }
}
