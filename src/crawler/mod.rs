//! Rule-based discovery crawler
//!
//! This module walks a website breadth-first from a set of seed URLs and
//! reports every HTML page and PDF document it finds. What gets crawled is
//! decided by a global `CrawlConfig` plus optional per-domain `DomainRule`s.

mod classifier;
mod config;
mod discovery;
mod error;
mod frontier;
mod links;
mod policy;
pub(crate) mod politeness;
mod pool;
mod report;
mod robots;
mod rules;

pub use classifier::{PDF_MAGIC, PdfClassifier};
pub use config::{CollectMode, CrawlConfig, CrawlConfigBuilder, DEFAULT_PDF_PATTERN};
pub use discovery::RuleBasedCrawler;
pub use error::CrawlError;
pub use links::{LinkPolicy, extract_links, validate_selectors};
pub use policy::{HostPolicy, RegexFilter, host_matches, host_of};
pub use report::{SkipReason, Skipped};
pub use robots::RobotsRules;
pub use rules::{
    DomainRule, DomainRuleSpec, DomainRules, HookError, HookResult, LinkFilter, LinkMapper,
    PdfOverride, RequestHook, ResponseHook,
};

use std::fmt;

use serde::Serialize;
use url::Url;

/// What a discovered URL points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Html,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Html => write!(f, "html"),
        }
    }
}

/// A result of discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovered {
    pub url: Url,
    pub kind: ResourceKind,
}

impl Discovered {
    pub fn pdf(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Pdf,
        }
    }

    pub fn html(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Html,
        }
    }
}
