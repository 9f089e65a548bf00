//! Link extraction with layout stripping and per-domain link hooks

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::crawler::config::CrawlConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::policy::RegexFilter;
use crate::crawler::rules::DomainRule;

/// Crawl-wide link settings, validated once when the crawler is built.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    selectors: Vec<String>,
    skip_schemes: Vec<String>,
    filter: RegexFilter,
}

impl LinkPolicy {
    pub fn from_config(config: &CrawlConfig) -> Result<Self, CrawlError> {
        validate_selectors(&config.exclude_selectors)?;
        Ok(Self {
            selectors: config.exclude_selectors.clone(),
            skip_schemes: config
                .skip_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            filter: RegexFilter::new(&config.allow, &config.deny)?,
        })
    }

    fn skips(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.skip_schemes.iter().any(|prefix| {
            url.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }
}

/// Check that every selector parses.
pub fn validate_selectors(selectors: &[String]) -> Result<(), CrawlError> {
    for selector in selectors {
        Selector::parse(selector).map_err(|e| CrawlError::InvalidSelector {
            selector: selector.clone(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

/// Detach every element matching one of the selectors from the document.
fn strip_layout(document: &mut Html, selectors: &[String]) {
    let mut doomed = Vec::new();
    for raw in selectors {
        // selectors were validated when the crawler was built
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        doomed.extend(document.root_element().select(&selector).map(|el| el.id()));
    }
    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Extract outbound links from an HTML page.
///
/// Layout regions are removed first, so links that only appear in
/// navigation chrome never reach the result. The remaining anchors are
/// resolved against `base_url` and passed through the domain rule's mapper
/// and filter, then through the global and the domain allow/deny lists.
/// Links keep document order and are not deduplicated.
pub fn extract_links(
    html: &str,
    base_url: &Url,
    rule: Option<&DomainRule>,
    global: &LinkPolicy,
) -> Vec<Url> {
    let mut document = Html::parse_document(html);
    let selectors = rule
        .and_then(DomainRule::selectors)
        .unwrap_or(&global.selectors);
    strip_layout(&mut document, selectors);

    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let resolved = document
        .root_element()
        .select(&anchor)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base_url.join(href.trim()).ok())
        .filter(|link| !global.skips(link));

    let mapped: Vec<Url> = match rule {
        Some(rule) => resolved
            .flat_map(|link| rule.map_link(&link).unwrap_or_else(|| vec![link]))
            .filter(|link| rule.filter_link(link))
            .collect(),
        None => resolved.collect(),
    };

    let links: Vec<Url> = mapped
        .into_iter()
        .filter(|link| global.filter.permits(link.as_str()))
        .filter(|link| rule.is_none_or(|r| r.filter().permits(link.as_str())))
        .collect();

    debug!(page = %base_url, count = links.len(), "extracted links");
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::rules::{DomainRules, HookResult};

    fn base() -> Url {
        Url::parse("https://example.com/section/page").unwrap()
    }

    fn policy(config: CrawlConfig) -> LinkPolicy {
        LinkPolicy::from_config(&config).unwrap()
    }

    fn strings(links: &[Url]) -> Vec<&str> {
        links.iter().map(Url::as_str).collect()
    }

    fn rule(rule: DomainRule) -> DomainRules {
        DomainRules::new().with("example.com", rule).unwrap()
    }

    #[test]
    fn test_resolves_relative_links_in_document_order() {
        let html = r#"
            <a href="/docs">Docs</a>
            <a href="other">Other</a>
            <a href="https://rust-lang.org">Rust</a>
            <a href="/docs">Docs again</a>
        "#;
        let links = extract_links(html, &base(), None, &policy(CrawlConfig::default()));
        assert_eq!(
            strings(&links),
            vec![
                "https://example.com/docs",
                "https://example.com/section/other",
                "https://rust-lang.org/",
                "https://example.com/docs",
            ]
        );
    }

    #[test]
    fn test_layout_regions_are_stripped_before_scanning() {
        let html = r#"
            <html><body>
              <nav><a href="/nav-only">Nav</a></nav>
              <header><a href="/header-only">Home</a></header>
              <div class="menu"><ul><li><a href="/menu-only">Menu</a></li></ul></div>
              <main><a href="/article">Article</a></main>
              <footer><a href="/footer-only">Imprint</a></footer>
            </body></html>
        "#;
        let links = extract_links(html, &base(), None, &policy(CrawlConfig::default()));
        assert_eq!(strings(&links), vec!["https://example.com/article"]);
    }

    #[test]
    fn test_domain_selectors_replace_global_ones() {
        let html = r#"
            <nav><a href="/kept-nav">Nav</a></nav>
            <div class="toc"><a href="/toc">TOC</a></div>
        "#;
        let rules = rule(DomainRule::new().exclude_selectors(vec![".toc".into()]));
        let links = extract_links(
            html,
            &base(),
            rules.match_rule(&base()),
            &policy(CrawlConfig::default()),
        );
        assert_eq!(strings(&links), vec!["https://example.com/kept-nav"]);
    }

    #[test]
    fn test_skip_schemes() {
        let html = r#"
            <a href="mailto:team@example.com">Mail</a>
            <a href="JavaScript:void(0)">Click</a>
            <a href="/contact">Contact</a>
        "#;
        let links = extract_links(html, &base(), None, &policy(CrawlConfig::default()));
        assert_eq!(strings(&links), vec!["https://example.com/contact"]);
    }

    #[test]
    fn test_mapper_expands_and_survives_failures() {
        let html = r#"
            <a href="/bundle">Bundle</a>
            <a href="/broken">Broken</a>
            <a href="/gone">Gone</a>
        "#;
        let rules = rule(DomainRule::new().link_mapper(|link: &Url| -> HookResult<Vec<Url>> {
            match link.path() {
                "/bundle" => Ok(vec![link.join("part-1")?, link.join("part-2")?]),
                "/broken" => Err("cannot map".into()),
                _ => Ok(Vec::new()),
            }
        }));
        let links = extract_links(
            html,
            &base(),
            rules.match_rule(&base()),
            &policy(CrawlConfig::default()),
        );
        assert_eq!(
            strings(&links),
            vec!["https://example.com/part-1", "https://example.com/part-2"]
        );
    }

    #[test]
    fn test_link_filter_hook() {
        let html = r#"<a href="/keep">Keep</a><a href="/drop">Drop</a>"#;
        let rules = rule(
            DomainRule::new()
                .link_filter(|link: &Url| -> HookResult<bool> { Ok(link.path() != "/drop") }),
        );
        let links = extract_links(
            html,
            &base(),
            rules.match_rule(&base()),
            &policy(CrawlConfig::default()),
        );
        assert_eq!(strings(&links), vec!["https://example.com/keep"]);
    }

    #[test]
    fn test_global_then_domain_allow_deny() {
        let html = r#"
            <a href="/docs/a">A</a>
            <a href="/docs/login">Login</a>
            <a href="/blog/b">B</a>
            <a href="/docs/c.zip">Zip</a>
        "#;
        let global = policy(CrawlConfig::builder().allow("/docs/").deny(r"\.zip$").build());
        let rules = rule(DomainRule::new().deny("/login"));
        let links = extract_links(html, &base(), rules.match_rule(&base()), &global);
        assert_eq!(strings(&links), vec!["https://example.com/docs/a"]);
    }

    #[test]
    fn test_domain_deny_applies_without_global_lists() {
        let html = r#"<a href="/login?next=/">Login</a><a href="/about">About</a>"#;
        let rules = rule(DomainRule::new().deny("/login"));
        let links = extract_links(
            html,
            &base(),
            rules.match_rule(&base()),
            &policy(CrawlConfig::default()),
        );
        assert_eq!(strings(&links), vec!["https://example.com/about"]);
    }

    #[test]
    fn test_invalid_global_selector_fails_fast() {
        let config = CrawlConfig::builder()
            .exclude_selectors(vec!["div[".to_string()])
            .build();
        let err = LinkPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, CrawlError::InvalidSelector { .. }));
    }
}
