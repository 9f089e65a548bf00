//! PDF vs. HTML classification
//!
//! Checks are ordered from free to expensive: a domain override, the URL
//! pattern, a HEAD probe for the content type and finally the leading bytes
//! of the resource. Network failures are inconclusive and fall through to the
//! next check; a resource nothing identifies as PDF is treated as HTML.

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::crawler::error::CrawlError;
use crate::crawler::policy::compile;
use crate::crawler::rules::DomainRule;
use crate::http::HttpClient;

/// Leading bytes of every PDF file
pub const PDF_MAGIC: &[u8] = b"%PDF-";

const PDF_CONTENT_TYPES: [&str; 2] = ["application/pdf", "application/x-pdf"];

/// Decides whether a URL points to a PDF document
#[derive(Clone)]
pub struct PdfClassifier {
    pattern: Regex,
    http: HttpClient,
}

impl PdfClassifier {
    pub fn new(pdf_pattern: &str, http: HttpClient) -> Result<Self, CrawlError> {
        Ok(Self {
            pattern: compile(pdf_pattern)?,
            http,
        })
    }

    /// The same classifier issuing its requests through `http`
    pub(crate) fn with_http(&self, http: HttpClient) -> Self {
        Self {
            pattern: self.pattern.clone(),
            http,
        }
    }

    /// Whether the URL alone identifies a PDF, without any request
    pub fn matches_pattern(&self, url: &Url) -> bool {
        self.pattern.is_match(url.as_str())
    }

    pub async fn is_pdf(&self, url: &Url, rule: Option<&DomainRule>) -> bool {
        if let Some(verdict) = rule.and_then(|r| r.pdf_verdict(url)) {
            debug!(url = %url, verdict, "PDF verdict from domain rule");
            return verdict;
        }

        if self.matches_pattern(url) {
            return true;
        }

        match self.http.content_type(url).await {
            Ok(Some(content_type)) if is_pdf_content_type(&content_type) => return true,
            Ok(_) => {}
            Err(e) => debug!(url = %url, error = %e, "HEAD probe inconclusive"),
        }

        match self.http.sniff(url).await {
            Ok(prefix) => prefix.starts_with(PDF_MAGIC),
            Err(e) => {
                debug!(url = %url, error = %e, "content sniffing inconclusive");
                false
            }
        }
    }
}

fn is_pdf_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    PDF_CONTENT_TYPES.iter().any(|t| content_type.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlConfig;
    use crate::crawler::config::DEFAULT_PDF_PATTERN;
    use crate::crawler::rules::{DomainRules, HookResult};
    use mockito::Server;

    fn classifier() -> PdfClassifier {
        let http = HttpClient::new(&CrawlConfig::default()).unwrap();
        PdfClassifier::new(DEFAULT_PDF_PATTERN, http).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_pattern_accepts_query_and_fragment() {
        let c = classifier();
        assert!(c.matches_pattern(&url("https://e.com/a/report.pdf")));
        assert!(c.matches_pattern(&url("https://e.com/a/REPORT.PDF")));
        assert!(c.matches_pattern(&url("https://e.com/file.pdf?download=1")));
        assert!(c.matches_pattern(&url("https://e.com/file.pdf#page=2")));
        assert!(!c.matches_pattern(&url("https://e.com/file.pdfx")));
        assert!(!c.matches_pattern(&url("https://e.com/pdf/index.html")));
    }

    #[test]
    fn test_content_types() {
        assert!(is_pdf_content_type("application/pdf"));
        assert!(is_pdf_content_type("Application/X-PDF; charset=binary"));
        assert!(!is_pdf_content_type("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_extension_needs_no_network() {
        let mut server = Server::new_async().await;
        let head = server
            .mock("HEAD", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let get = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let target = url(&format!("{}/paper.pdf?download=1", server.url()));
        assert!(classifier().is_pdf(&target, None).await);

        head.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_override_wins_over_every_heuristic() {
        let mut server = Server::new_async().await;
        server
            .mock("HEAD", "/doc")
            .with_header("content-type", "application/pdf")
            .create_async()
            .await;
        let rules = DomainRules::new()
            .with(
                "127.0.0.1",
                DomainRule::new()
                    .pdf_override(|_: &Url| -> HookResult<Option<bool>> { Ok(Some(false)) }),
            )
            .unwrap();

        let c = classifier();
        let served_pdf = url(&format!("{}/doc", server.url()));
        let named_pdf = url(&format!("{}/file.pdf", server.url()));
        assert!(!c.is_pdf(&served_pdf, rules.match_rule(&served_pdf)).await);
        assert!(!c.is_pdf(&named_pdf, rules.match_rule(&named_pdf)).await);

        let rules = DomainRules::new()
            .with(
                "127.0.0.1",
                DomainRule::new()
                    .pdf_override(|_: &Url| -> HookResult<Option<bool>> { Ok(Some(true)) }),
            )
            .unwrap();
        let page = url(&format!("{}/index.html", server.url()));
        assert!(c.is_pdf(&page, rules.match_rule(&page)).await);
    }

    #[tokio::test]
    async fn test_head_content_type_detects_pdf() {
        let mut server = Server::new_async().await;
        server
            .mock("HEAD", "/download")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .create_async()
            .await;
        let get = server
            .mock("GET", "/download")
            .expect(0)
            .create_async()
            .await;

        let target = url(&format!("{}/download", server.url()));
        assert!(classifier().is_pdf(&target, None).await);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_magic_bytes_detect_pdf() {
        let mut server = Server::new_async().await;
        server
            .mock("HEAD", "/blob")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .create_async()
            .await;
        server
            .mock("GET", "/blob")
            .with_status(200)
            .with_body("%PDF-1.4\n%binary")
            .create_async()
            .await;
        server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("<!doctype html><html></html>")
            .create_async()
            .await;

        let c = classifier();
        assert!(c.is_pdf(&url(&format!("{}/blob", server.url())), None).await);
        assert!(!c.is_pdf(&url(&format!("{}/page", server.url())), None).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_html() {
        // nothing listens on port 9 of the loopback interface
        let target = url("http://127.0.0.1:9/unknown");
        assert!(!classifier().is_pdf(&target, None).await);
    }
}
