//! HTTP client used by the crawler
//!
//! Thin wrapper around `reqwest` offering the three operations discovery
//! needs: a HEAD probe for the content type, a bounded partial download for
//! content sniffing, and a full page download with redirects followed.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

use crate::crawler::CrawlConfig;
use crate::crawler::CrawlError;
use crate::crawler::host_of;
use crate::crawler::politeness::Politeness;

/// A downloaded page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,

    /// Decoded response body
    pub body: String,
}

impl FetchedPage {
    /// Error statuses and empty bodies are not worth parsing.
    pub fn check(&self) -> Result<(), CrawlError> {
        if self.status >= 400 {
            return Err(CrawlError::Status(self.status));
        }
        if self.body.trim().is_empty() {
            return Err(CrawlError::EmptyBody);
        }
        Ok(())
    }
}

/// HTTP client for crawl requests
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Timeout for HEAD probes and sniffing downloads
    probe_timeout: Duration,

    /// Upper bound on bytes read while sniffing
    sniff_bytes: usize,

    /// Per-host spacing applied before every request, if any
    politeness: Option<Arc<Politeness>>,
}

impl HttpClient {
    /// Create a client from the crawl configuration
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let client = ReqwestClient::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            probe_timeout: config.head_timeout(),
            sniff_bytes: config.sniff_bytes,
            politeness: None,
        })
    }

    /// A copy of this client that waits on `politeness` before each request.
    pub(crate) fn throttled(&self, politeness: Arc<Politeness>) -> Self {
        Self {
            politeness: Some(politeness),
            ..self.clone()
        }
    }

    async fn throttle(&self, url: &Url) {
        if let (Some(politeness), Some(host)) = (&self.politeness, host_of(url)) {
            politeness.wait_for(&host).await;
        }
    }

    /// Content type reported by a HEAD request
    #[instrument(skip(self), fields(url = %url), level = "debug")]
    pub async fn content_type(&self, url: &Url) -> Result<Option<String>, CrawlError> {
        self.throttle(url).await;
        let response = self
            .client
            .head(url.as_str())
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        debug!(status = %response.status(), ?content_type, "HEAD probe");
        Ok(content_type)
    }

    /// Leading bytes of the resource, at most `sniff_bytes` of them
    #[instrument(skip(self), fields(url = %url), level = "debug")]
    pub async fn sniff(&self, url: &Url) -> Result<Vec<u8>, CrawlError> {
        self.throttle(url).await;
        let mut response = self
            .client
            .get(url.as_str())
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status(status.as_u16()));
        }

        let mut prefix = Vec::new();
        while prefix.len() < self.sniff_bytes {
            match response.chunk().await? {
                Some(chunk) => prefix.extend_from_slice(&chunk),
                None => break,
            }
        }
        prefix.truncate(self.sniff_bytes);
        Ok(prefix)
    }

    /// Download a page, following redirects
    #[instrument(skip(self), fields(url = %url), level = "debug")]
    pub async fn get_page(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
        self.throttle(url).await;
        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "GET page");
        Ok(FetchedPage {
            url: final_url,
            status,
            content_type,
            body,
        })
    }

    /// Body of a successful response, `None` for error statuses
    pub async fn get_text(&self, url: &Url) -> Result<Option<String>, CrawlError> {
        self.throttle(url).await;
        let response = self
            .client
            .get(url.as_str())
            .timeout(self.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}
