//! Error types for the crawler module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// `discover` was called without any seed URL
    #[error("no seed URLs given")]
    NoSeeds,

    /// A seed could not be parsed as an absolute URL
    #[error("invalid seed URL '{seed}': {source}")]
    InvalidSeed {
        seed: String,
        #[source]
        source: url::ParseError,
    },

    /// An allow/deny/PDF pattern failed to compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A layout-exclusion selector failed to parse
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The server answered with an empty body
    #[error("empty response body")]
    EmptyBody,
}

impl CrawlError {
    /// Returns true for errors raised while validating configuration or seeds.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::NoSeeds
                | Self::InvalidSeed { .. }
                | Self::InvalidPattern { .. }
                | Self::InvalidSelector { .. }
        )
    }
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        if err.is_config() {
            return CrateError::Config(err.to_string());
        }
        match err {
            CrawlError::Http(e) => CrateError::Http(e),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
