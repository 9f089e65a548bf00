//! # sift - rule-based web discovery
//!
//! This crate crawls websites breadth-first and reports the HTML pages and
//! PDF documents it finds. It does not store or index content; it only
//! answers the question "what is out there", under limits that keep the
//! crawl small and polite.
//!
//! ## Features
//!
//! - Global allow/deny URL patterns and per-domain rules with hooks
//! - PDF detection by URL pattern, `Content-Type` probe and magic bytes
//! - Layout-aware link extraction that skips navigation, headers and footers
//! - Depth, per-domain and total caps with politeness delays
//! - Lazy results as an async `Stream`, sequential or with a worker pool
//! - Optional robots.txt support and skip diagnostics
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use sift::crawler::{CrawlConfig, DomainRule, DomainRules, RuleBasedCrawler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlConfig::builder()
//!         .max_total(50)
//!         .max_depth(2)
//!         .deny("/login")
//!         .build();
//!     let rules = DomainRules::new().with("example.com", DomainRule::new().deny("/archive/"))?;
//!
//!     let crawler = RuleBasedCrawler::new(config, rules)?;
//!     let mut results = Box::pin(crawler.discover(["https://example.com/"])?);
//!     while let Some(found) = results.next().await {
//!         println!("{} {}", found.kind, found.url);
//!     }
//!     Ok(())
//! }
//! ```

mod error;

pub mod crawler;
pub mod http;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::crawler::{
        CollectMode, CrawlConfig, Discovered, DomainRule, DomainRules, ResourceKind,
        RuleBasedCrawler,
    };
    pub use crate::error::Error;
    pub use crate::error::Result;
}
