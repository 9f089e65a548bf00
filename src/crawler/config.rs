//! # Crawl Configuration Module
//!
//! Traversal parameters for a single crawl run. A `CrawlConfig` is built once
//! (directly, through `CrawlConfigBuilder`, or deserialized from JSON) and is
//! read-only while the crawl is running.
//!
//! ## Defaults
//!
//! The defaults describe a polite, same-site crawl: two link hops from the
//! seeds, at most 100 results, 50 pages per host and half a second between
//! requests. Navigation chrome (nav bars, headers, footers, sidebars, menus)
//! is stripped before links are collected.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pattern matching URLs whose path names a PDF file, optionally followed by
/// a query string or fragment.
pub const DEFAULT_PDF_PATTERN: &str = r"(?i)\.pdf(?:$|[?#])";

/// Which resource kinds a crawl reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Report both PDF documents and HTML pages
    #[default]
    All,
    /// Report PDF documents only; HTML pages are still traversed
    PdfOnly,
    /// Report HTML pages only; PDF classification is skipped entirely
    HtmlOnly,
}

impl CollectMode {
    pub fn wants_pdf(self) -> bool {
        matches!(self, Self::All | Self::PdfOnly)
    }

    pub fn wants_html(self) -> bool {
        matches!(self, Self::All | Self::HtmlOnly)
    }
}

impl std::str::FromStr for CollectMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(Self::All),
            "pdf_only" | "pdf" => Ok(Self::PdfOnly),
            "html_only" | "html" => Ok(Self::HtmlOnly),
            other => Err(format!("unknown collect mode '{other}'")),
        }
    }
}

/// Configuration for a crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Restrict the crawl to this domain and its subdomains
    pub base_domain: Option<String>,

    /// Without a base domain, stay on the hosts of the seed URLs
    pub same_domain_only: bool,

    /// Maximum number of results yielded by one crawl
    pub max_total: usize,

    /// Maximum number of HTML pages fetched per host
    pub max_pages_per_domain: usize,

    /// Maximum link distance from a seed (seeds are depth 0)
    pub max_depth: u32,

    /// Politeness delay in milliseconds between requests
    pub delay_ms: u64,

    /// Timeout for page downloads, in seconds
    pub request_timeout_secs: u64,

    /// Timeout for HEAD probes, in seconds
    pub head_timeout_secs: u64,

    /// How many leading bytes to read when sniffing for PDF magic bytes
    pub sniff_bytes: usize,

    /// User agent sent with every request
    pub user_agent: String,

    /// CSS selectors for layout regions removed before link extraction
    pub exclude_selectors: Vec<String>,

    /// URL prefixes that are never followed
    pub skip_schemes: Vec<String>,

    /// Global allow-list; when non-empty a link must match one pattern
    pub allow: Vec<String>,

    /// Global deny-list; a link matching any pattern is dropped
    pub deny: Vec<String>,

    /// Pattern classifying a URL as a PDF without any request
    pub pdf_pattern: String,

    /// Which resource kinds are reported
    pub mode: CollectMode,

    /// Whether to honour `Disallow` lines from robots.txt
    pub respect_robots_txt: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_domain: None,
            same_domain_only: true,
            max_total: 100,
            max_pages_per_domain: 50,
            max_depth: 2,
            delay_ms: 500,
            request_timeout_secs: 20,
            head_timeout_secs: 10,
            sniff_bytes: 8192,
            user_agent: format!("sift/{}", env!("CARGO_PKG_VERSION")),
            exclude_selectors: [
                "nav",
                "header",
                "footer",
                "aside",
                ".navigation",
                ".menu",
                ".sidebar",
                "#nav",
                "#header",
                "#footer",
                "#sidebar",
                "[role=navigation]",
            ]
            .map(String::from)
            .to_vec(),
            skip_schemes: vec!["mailto:".to_string(), "javascript:".to_string()],
            allow: Vec::new(),
            deny: Vec::new(),
            pdf_pattern: DEFAULT_PDF_PATTERN.to_string(),
            mode: CollectMode::All,
            respect_robots_txt: false,
        }
    }
}

/// Builder for CrawlConfig
#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlConfig::default(),
        }
    }

    /// Restrict the crawl to a domain and its subdomains
    pub fn base_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.base_domain = Some(domain.into().to_ascii_lowercase());
        self
    }

    /// Set whether to stay on the seed hosts
    pub fn same_domain_only(mut self, same_domain_only: bool) -> Self {
        self.config.same_domain_only = same_domain_only;
        self
    }

    /// Set the maximum number of yielded results
    pub fn max_total(mut self, max_total: usize) -> Self {
        self.config.max_total = max_total;
        self
    }

    /// Set the maximum number of pages fetched per host
    pub fn max_pages_per_domain(mut self, max_pages: usize) -> Self {
        self.config.max_pages_per_domain = max_pages;
        self
    }

    /// Set the maximum depth to crawl
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the politeness delay in milliseconds
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.delay_ms = delay_ms;
        self
    }

    /// Set the download timeout in seconds
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the HEAD probe timeout in seconds
    pub fn head_timeout_secs(mut self, secs: u64) -> Self {
        self.config.head_timeout_secs = secs;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Replace the global layout-exclusion selectors
    pub fn exclude_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.exclude_selectors = selectors;
        self
    }

    /// Replace the skipped URL prefixes
    pub fn skip_schemes(mut self, schemes: Vec<String>) -> Self {
        self.config.skip_schemes = schemes;
        self
    }

    /// Add a global allow pattern
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.config.allow.push(pattern.into());
        self
    }

    /// Add a global deny pattern
    pub fn deny(mut self, pattern: impl Into<String>) -> Self {
        self.config.deny.push(pattern.into());
        self
    }

    /// Replace the PDF URL pattern
    pub fn pdf_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.pdf_pattern = pattern.into();
        self
    }

    /// Set which resource kinds are reported
    pub fn mode(mut self, mode: CollectMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set whether to respect robots.txt
    pub fn respect_robots_txt(mut self, respect: bool) -> Self {
        self.config.respect_robots_txt = respect;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

impl CrawlConfig {
    /// Create a new builder
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        if config.max_total == 0 {
            return Err(Error::Config("max_total must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Get the politeness delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn head_timeout(&self) -> Duration {
        Duration::from_secs(self.head_timeout_secs)
    }
}
