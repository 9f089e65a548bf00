//! Diagnostics for URLs that produced no result

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::crawler::error::CrawlError;

/// Why a frontier entry produced no result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    TooDeep,
    HostNotAllowed,
    RobotsDisallowed,
    DomainCapReached,
    HttpStatus(u16),
    EmptyBody,
    FetchFailed(String),
}

impl From<&CrawlError> for SkipReason {
    fn from(err: &CrawlError) -> Self {
        match err {
            CrawlError::Status(status) => Self::HttpStatus(*status),
            CrawlError::EmptyBody => Self::EmptyBody,
            other => Self::FetchFailed(other.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooDeep => write!(f, "too deep"),
            Self::HostNotAllowed => write!(f, "host not allowed"),
            Self::RobotsDisallowed => write!(f, "disallowed by robots.txt"),
            Self::DomainCapReached => write!(f, "per-domain page cap reached"),
            Self::HttpStatus(status) => write!(f, "HTTP status {status}"),
            Self::EmptyBody => write!(f, "empty body"),
            Self::FetchFailed(message) => write!(f, "fetch failed: {message}"),
        }
    }
}

/// A URL the crawl dropped, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub url: Url,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Optional sink for skip diagnostics
#[derive(Debug, Clone, Default)]
pub(crate) struct Diagnostics {
    sender: Option<UnboundedSender<Skipped>>,
}

impl Diagnostics {
    pub fn new(sender: UnboundedSender<Skipped>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn skip(&self, url: &Url, reason: SkipReason) {
        if let Some(sender) = &self.sender {
            // a closed receiver only means nobody is listening any more
            let _ = sender.send(Skipped {
                url: url.clone(),
                reason,
            });
        }
    }
}
