//! Host admissibility and allow/deny filtering

use regex::Regex;
use url::Url;

use crate::crawler::error::CrawlError;

/// Compiled allow/deny pattern lists.
///
/// A URL passes when the allow-list is empty or one allow pattern matches,
/// and no deny pattern matches.
#[derive(Debug, Clone, Default)]
pub struct RegexFilter {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl RegexFilter {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, CrawlError> {
        Ok(Self {
            allow: compile_all(allow)?,
            deny: compile_all(deny)?,
        })
    }

    pub fn permits(&self, url: &str) -> bool {
        (self.allow.is_empty() || self.allow.iter().any(|p| p.is_match(url)))
            && !self.deny.iter().any(|p| p.is_match(url))
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex, CrawlError> {
    Regex::new(pattern).map_err(|source| CrawlError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, CrawlError> {
    patterns.iter().map(|p| compile(p)).collect()
}

/// Lower-cased host of a URL, if it has one.
pub fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// True when `host` equals `domain` or is one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Decides which hosts a crawl may visit.
///
/// The seed hosts are captured once when the policy is created, so the
/// answer for a given URL never changes during a crawl.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    scope: Scope,
}

#[derive(Debug, Clone)]
enum Scope {
    Base(String),
    Seeds(Vec<String>),
    Any,
}

impl HostPolicy {
    pub fn new(base_domain: Option<&str>, same_domain_only: bool, seeds: &[Url]) -> Self {
        let scope = match base_domain {
            Some(domain) => Scope::Base(domain.trim_start_matches('.').to_ascii_lowercase()),
            None if same_domain_only => {
                let mut hosts: Vec<String> = Vec::new();
                for host in seeds.iter().filter_map(host_of) {
                    if !hosts.contains(&host) {
                        hosts.push(host);
                    }
                }
                Scope::Seeds(hosts)
            }
            None => Scope::Any,
        };
        Self { scope }
    }

    /// Whether the URL's host may be crawled. URLs without a host never are.
    pub fn host_allowed(&self, url: &Url) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        match &self.scope {
            Scope::Base(domain) => host_matches(&host, domain),
            Scope::Seeds(hosts) => hosts.iter().any(|seed| host_matches(&host, seed)),
            Scope::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_host_matches_requires_label_boundary() {
        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("news.example.com", "example.com"));
        assert!(!host_matches("badexample.com", "example.com"));
        assert!(!host_matches("example.com", "news.example.com"));
    }

    #[test]
    fn test_base_domain_takes_precedence_over_seeds() {
        let seeds = vec![url("https://a.example.org/")];
        let policy = HostPolicy::new(Some("Example.com"), true, &seeds);

        assert!(policy.host_allowed(&url("https://docs.example.com/x")));
        assert!(!policy.host_allowed(&url("https://a.example.org/y")));
    }

    #[test]
    fn test_same_domain_uses_seed_hosts() {
        let seeds = vec![url("http://a.example/x"), url("https://b.test/")];
        let policy = HostPolicy::new(None, true, &seeds);

        assert!(policy.host_allowed(&url("http://a.example/y")));
        assert!(policy.host_allowed(&url("http://sub.b.test/")));
        assert!(!policy.host_allowed(&url("http://other.com/z")));
    }

    #[test]
    fn test_open_scope_admits_any_host() {
        let policy = HostPolicy::new(None, false, &[url("http://a.example/")]);
        assert!(policy.host_allowed(&url("http://other.com/z")));
        assert!(!policy.host_allowed(&url("mailto:someone@other.com")));
    }

    #[test]
    fn test_host_allowed_is_stable() {
        let policy = HostPolicy::new(None, true, &[url("http://a.example/")]);
        let candidate = url("http://a.example/page");
        let first = policy.host_allowed(&candidate);
        for _ in 0..3 {
            assert_eq!(policy.host_allowed(&candidate), first);
        }
    }

    #[test]
    fn test_regex_filter() {
        let filter =
            RegexFilter::new(&["/docs/".to_string()], &["\\.zip$".to_string()]).unwrap();
        assert!(filter.permits("https://e.com/docs/a.html"));
        assert!(!filter.permits("https://e.com/blog/a.html"));
        assert!(!filter.permits("https://e.com/docs/a.zip"));
        assert!(RegexFilter::default().permits("anything"));
    }

    #[test]
    fn test_regex_filter_reports_bad_pattern() {
        let err = RegexFilter::new(&["(".to_string()], &[]).unwrap_err();
        assert!(matches!(err, CrawlError::InvalidPattern { ref pattern, .. } if pattern == "("));
    }
}
