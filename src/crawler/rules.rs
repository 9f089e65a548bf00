//! # Domain Rules
//!
//! Per-domain overrides of crawl policy. A `DomainRule` is registered under a
//! domain suffix and applies to that domain and every subdomain of it. Rules
//! carry their own allow/deny patterns, an optional replacement set of
//! layout-exclusion selectors, and optional hooks:
//!
//! - `LinkFilter`: keep or drop an extracted link
//! - `LinkMapper`: rewrite one link into zero or more links
//! - `RequestHook`: side effect before a URL is requested
//! - `ResponseHook`: side effect after a page was downloaded
//! - `PdfOverride`: force or veto PDF classification
//!
//! Every hook trait is implemented for closures of the matching signature.
//! Hooks run behind `guarded`, so a hook that fails or panics only loses its
//! own contribution and never aborts a crawl.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::crawler::error::CrawlError;
use crate::crawler::links::validate_selectors;
use crate::crawler::policy::{RegexFilter, compile, host_matches, host_of};
use crate::http::FetchedPage;

/// Error returned by a hook
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a hook
pub type HookResult<T> = Result<T, HookError>;

/// Decides whether an extracted link is kept
pub trait LinkFilter: Send + Sync {
    fn accept(&self, link: &Url) -> HookResult<bool>;
}

/// Rewrites an extracted link into zero or more links
pub trait LinkMapper: Send + Sync {
    fn map(&self, link: &Url) -> HookResult<Vec<Url>>;
}

/// Runs before a URL is requested
pub trait RequestHook: Send + Sync {
    fn before_request(&self, url: &Url) -> HookResult<()>;
}

/// Runs after a page was downloaded, before its links are extracted
pub trait ResponseHook: Send + Sync {
    fn after_response(&self, url: &Url, page: &FetchedPage) -> HookResult<()>;
}

/// Overrides PDF detection; `None` defers to the regular heuristics
pub trait PdfOverride: Send + Sync {
    fn is_pdf(&self, url: &Url) -> HookResult<Option<bool>>;
}

impl<F> LinkFilter for F
where
    F: Fn(&Url) -> HookResult<bool> + Send + Sync,
{
    fn accept(&self, link: &Url) -> HookResult<bool> {
        self(link)
    }
}

impl<F> LinkMapper for F
where
    F: Fn(&Url) -> HookResult<Vec<Url>> + Send + Sync,
{
    fn map(&self, link: &Url) -> HookResult<Vec<Url>> {
        self(link)
    }
}

impl<F> RequestHook for F
where
    F: Fn(&Url) -> HookResult<()> + Send + Sync,
{
    fn before_request(&self, url: &Url) -> HookResult<()> {
        self(url)
    }
}

impl<F> ResponseHook for F
where
    F: Fn(&Url, &FetchedPage) -> HookResult<()> + Send + Sync,
{
    fn after_response(&self, url: &Url, page: &FetchedPage) -> HookResult<()> {
        self(url, page)
    }
}

impl<F> PdfOverride for F
where
    F: Fn(&Url) -> HookResult<Option<bool>> + Send + Sync,
{
    fn is_pdf(&self, url: &Url) -> HookResult<Option<bool>> {
        self(url)
    }
}

/// Run a hook, turning errors and panics into `None`.
pub(crate) fn guarded<T>(hook: &str, url: &Url, f: impl FnOnce() -> HookResult<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(hook, url = %url, error = %e, "hook failed");
            None
        }
        Err(_) => {
            warn!(hook, url = %url, "hook panicked");
            None
        }
    }
}

/// Per-domain crawl policy
#[derive(Clone, Default)]
pub struct DomainRule {
    allow: Vec<String>,
    deny: Vec<String>,
    exclude_selectors: Option<Vec<String>>,
    link_filter: Option<Arc<dyn LinkFilter>>,
    link_mapper: Option<Arc<dyn LinkMapper>>,
    before_request: Option<Arc<dyn RequestHook>>,
    after_response: Option<Arc<dyn ResponseHook>>,
    pdf_override: Option<Arc<dyn PdfOverride>>,
    filter: RegexFilter,
}

impl DomainRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an allow pattern; when any exist a link must match one
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.allow.push(pattern.into());
        self
    }

    /// Add a deny pattern
    pub fn deny(mut self, pattern: impl Into<String>) -> Self {
        self.deny.push(pattern.into());
        self
    }

    /// Replace the global layout-exclusion selectors for this domain
    pub fn exclude_selectors(mut self, selectors: Vec<String>) -> Self {
        self.exclude_selectors = Some(selectors);
        self
    }

    pub fn link_filter(mut self, filter: impl LinkFilter + 'static) -> Self {
        self.link_filter = Some(Arc::new(filter));
        self
    }

    pub fn link_mapper(mut self, mapper: impl LinkMapper + 'static) -> Self {
        self.link_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn before_request(mut self, hook: impl RequestHook + 'static) -> Self {
        self.before_request = Some(Arc::new(hook));
        self
    }

    pub fn after_response(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.after_response = Some(Arc::new(hook));
        self
    }

    pub fn pdf_override(mut self, hook: impl PdfOverride + 'static) -> Self {
        self.pdf_override = Some(Arc::new(hook));
        self
    }

    /// Compiles patterns and checks selectors; called on registration.
    fn prepare(mut self) -> Result<Self, CrawlError> {
        self.filter = RegexFilter::new(&self.allow, &self.deny)?;
        if let Some(selectors) = &self.exclude_selectors {
            validate_selectors(selectors)?;
        }
        Ok(self)
    }

    pub(crate) fn filter(&self) -> &RegexFilter {
        &self.filter
    }

    pub(crate) fn selectors(&self) -> Option<&[String]> {
        self.exclude_selectors.as_deref()
    }

    pub(crate) fn filter_link(&self, link: &Url) -> bool {
        match &self.link_filter {
            Some(filter) => guarded("link_filter", link, || filter.accept(link)).unwrap_or(false),
            None => true,
        }
    }

    /// Mapped links, or `None` when the rule has no mapper.
    pub(crate) fn map_link(&self, link: &Url) -> Option<Vec<Url>> {
        let mapper = self.link_mapper.as_ref()?;
        Some(guarded("link_mapper", link, || mapper.map(link)).unwrap_or_default())
    }

    pub(crate) fn run_before_request(&self, url: &Url) {
        if let Some(hook) = &self.before_request {
            guarded("before_request", url, || hook.before_request(url));
        }
    }

    pub(crate) fn run_after_response(&self, url: &Url, page: &FetchedPage) {
        if let Some(hook) = &self.after_response {
            guarded("after_response", url, || hook.after_response(url, page));
        }
    }

    pub(crate) fn pdf_verdict(&self, url: &Url) -> Option<bool> {
        let hook = self.pdf_override.as_ref()?;
        guarded("pdf_override", url, || hook.is_pdf(url)).flatten()
    }
}

impl fmt::Debug for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRule")
            .field("allow", &self.allow)
            .field("deny", &self.deny)
            .field("exclude_selectors", &self.exclude_selectors)
            .field("link_filter", &self.link_filter.is_some())
            .field("link_mapper", &self.link_mapper.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .field("pdf_override", &self.pdf_override.is_some())
            .finish()
    }
}

/// Registered domain rules, immutable once the crawler is built.
#[derive(Debug, Clone, Default)]
pub struct DomainRules {
    rules: Vec<(String, DomainRule)>,
}

impl DomainRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a domain and its subdomains.
    ///
    /// Registering the same domain twice replaces the earlier rule.
    pub fn insert(&mut self, domain: impl Into<String>, rule: DomainRule) -> Result<(), CrawlError> {
        let domain = domain.into().trim_start_matches('.').to_ascii_lowercase();
        let rule = rule.prepare()?;
        match self.rules.iter_mut().find(|(key, _)| *key == domain) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((domain, rule)),
        }
        Ok(())
    }

    /// Chainable form of `insert`
    pub fn with(mut self, domain: impl Into<String>, rule: DomainRule) -> Result<Self, CrawlError> {
        self.insert(domain, rule)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule registered under the longest domain suffix of the URL's host.
    pub fn match_rule(&self, url: &Url) -> Option<&DomainRule> {
        let host = host_of(url)?;
        self.rules
            .iter()
            .filter(|(domain, _)| host_matches(&host, domain))
            .max_by_key(|(domain, _)| domain.len())
            .map(|(_, rule)| rule)
    }

    /// Load declarative rules from a JSON array of `DomainRuleSpec`.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let specs: Vec<DomainRuleSpec> = serde_json::from_str(&content)?;
        let mut rules = Self::new();
        for spec in specs {
            let (domain, rule) = spec.into_rule()?;
            rules.insert(domain, rule)?;
        }
        Ok(rules)
    }
}

/// The declarative part of a `DomainRule`, as stored in a rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRuleSpec {
    pub domain: String,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub exclude_selectors: Option<Vec<String>>,
    /// URLs matching any of these patterns are classified as PDF
    #[serde(default)]
    pub pdf_paths: Vec<String>,
}

impl DomainRuleSpec {
    pub fn into_rule(self) -> Result<(String, DomainRule), CrawlError> {
        let mut rule = DomainRule::new();
        rule.allow = self.allow;
        rule.deny = self.deny;
        rule.exclude_selectors = self.exclude_selectors;
        if !self.pdf_paths.is_empty() {
            let patterns = self
                .pdf_paths
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>, _>>()?;
            rule = rule.pdf_override(PdfPaths(patterns));
        }
        Ok((self.domain, rule))
    }
}

/// Forces PDF classification for URLs matching any pattern.
struct PdfPaths(Vec<Regex>);

impl PdfOverride for PdfPaths {
    fn is_pdf(&self, url: &Url) -> HookResult<Option<bool>> {
        Ok(self.0.iter().any(|p| p.is_match(url.as_str())).then_some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_match_rule_includes_subdomains() {
        let rules = DomainRules::new()
            .with("Example.com", DomainRule::new().deny("/login"))
            .unwrap();

        assert!(rules.match_rule(&url("https://example.com/")).is_some());
        assert!(rules.match_rule(&url("https://news.example.com/a")).is_some());
        assert!(rules.match_rule(&url("https://notexample.com/")).is_none());
        assert!(rules.match_rule(&url("mailto:a@example.com")).is_none());
    }

    #[test]
    fn test_match_rule_prefers_longest_suffix() {
        let rules = DomainRules::new()
            .with("b.com", DomainRule::new().deny("outer"))
            .unwrap()
            .with("a.b.com", DomainRule::new().deny("inner"))
            .unwrap();

        let rule = rules.match_rule(&url("https://x.a.b.com/")).unwrap();
        assert!(!rule.filter().permits("https://x.a.b.com/inner"));
        assert!(rule.filter().permits("https://x.a.b.com/outer"));

        let rule = rules.match_rule(&url("https://c.b.com/")).unwrap();
        assert!(!rule.filter().permits("https://c.b.com/outer"));
    }

    #[test]
    fn test_insert_replaces_existing_domain() {
        let mut rules = DomainRules::new();
        rules.insert("example.com", DomainRule::new().deny("a")).unwrap();
        rules.insert("example.com", DomainRule::new().deny("b")).unwrap();

        assert_eq!(rules.len(), 1);
        let rule = rules.match_rule(&url("https://example.com/")).unwrap();
        assert!(rule.filter().permits("https://example.com/a"));
    }

    #[test]
    fn test_insert_rejects_bad_pattern_and_selector() {
        let mut rules = DomainRules::new();
        let err = rules.insert("e.com", DomainRule::new().allow("[")).unwrap_err();
        assert!(matches!(err, CrawlError::InvalidPattern { .. }));

        let err = rules
            .insert("e.com", DomainRule::new().exclude_selectors(vec!["<<".into()]))
            .unwrap_err();
        assert!(matches!(err, CrawlError::InvalidSelector { .. }));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_failing_hooks_are_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let rule = DomainRule::new()
            .before_request(move |_: &Url| -> HookResult<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".into())
            })
            .link_filter(|_: &Url| -> HookResult<bool> { panic!("filter bug") })
            .link_mapper(|_: &Url| -> HookResult<Vec<Url>> { Err("no mapping".into()) })
            .pdf_override(|_: &Url| -> HookResult<Option<bool>> { Err("unknown".into()) });

        let target = url("https://e.com/a");
        rule.run_before_request(&target);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!rule.filter_link(&target));
        assert_eq!(rule.map_link(&target), Some(Vec::new()));
        assert_eq!(rule.pdf_verdict(&target), None);
    }

    #[test]
    fn test_rule_without_hooks_is_neutral() {
        let rule = DomainRule::new();
        let target = url("https://e.com/a");
        assert!(rule.filter_link(&target));
        assert_eq!(rule.map_link(&target), None);
        assert_eq!(rule.pdf_verdict(&target), None);
    }

    #[test]
    fn test_rules_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"domain": "example.com", "deny": ["/login"], "pdf_paths": ["/download/"]}},
                {{"domain": "docs.test", "exclude_selectors": [".toc"]}}
            ]"#
        )
        .unwrap();

        let rules = DomainRules::from_json_file(file.path()).unwrap();
        assert_eq!(rules.len(), 2);

        let rule = rules.match_rule(&url("https://example.com/")).unwrap();
        assert!(!rule.filter().permits("https://example.com/login"));
        assert_eq!(rule.pdf_verdict(&url("https://example.com/download/7")), Some(true));
        assert_eq!(rule.pdf_verdict(&url("https://example.com/about")), None);

        let rule = rules.match_rule(&url("https://docs.test/")).unwrap();
        assert_eq!(rule.selectors(), Some(&[".toc".to_string()][..]));
    }
}
