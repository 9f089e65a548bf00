//! Breadth-first discovery loop

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::crawler::classifier::PdfClassifier;
use crate::crawler::config::CrawlConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::links::{LinkPolicy, extract_links};
use crate::crawler::policy::{HostPolicy, host_of};
use crate::crawler::politeness::Politeness;
use crate::crawler::report::{Diagnostics, SkipReason, Skipped};
use crate::crawler::robots::RobotsGate;
use crate::crawler::rules::{DomainRule, DomainRules};
use crate::crawler::Discovered;
use crate::http::{FetchedPage, HttpClient};

/// Rule-based crawler discovering HTML pages and PDF documents.
///
/// Configuration, patterns and selectors are validated by `new`; a crawler
/// that was built successfully never fails mid-crawl. Each call to
/// `discover` starts from a fresh frontier.
pub struct RuleBasedCrawler {
    pub(crate) config: CrawlConfig,
    pub(crate) rules: DomainRules,
    links: LinkPolicy,
    pub(crate) http: HttpClient,
    pub(crate) classifier: PdfClassifier,
    pub(crate) cancel: CancellationToken,
    diagnostics: Diagnostics,
}

impl RuleBasedCrawler {
    pub fn new(config: CrawlConfig, rules: DomainRules) -> Result<Self, CrawlError> {
        let links = LinkPolicy::from_config(&config)?;
        let http = HttpClient::new(&config)?;
        let classifier = PdfClassifier::new(&config.pdf_pattern, http.clone())?;

        Ok(Self {
            config,
            rules,
            links,
            http,
            classifier,
            cancel: CancellationToken::new(),
            diagnostics: Diagnostics::default(),
        })
    }

    /// Report every URL that yields no result on `sender`.
    pub fn with_diagnostics(mut self, sender: UnboundedSender<Skipped>) -> Self {
        self.diagnostics = Diagnostics::new(sender);
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn rules(&self) -> &DomainRules {
        &self.rules
    }

    /// Token that stops the crawls of this crawler.
    ///
    /// Cancellation is permanent: every running crawl stops at its next step,
    /// and any later `discover` or `discover_concurrent` call on the same
    /// crawler ends without results. Build a new crawler to crawl again.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawl breadth-first from the seeds, one request at a time.
    ///
    /// Results are produced lazily; dropping the stream stops the crawl.
    /// Fails only when the seed list is empty or contains an invalid URL.
    #[instrument(skip_all)]
    pub fn discover<I, S>(
        &self,
        seeds: I,
    ) -> Result<impl Stream<Item = Discovered> + Send + '_, CrawlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = parse_seeds(seeds)?;
        Ok(self.discover_from(seeds))
    }

    fn discover_from(&self, seeds: Vec<Url>) -> impl Stream<Item = Discovered> + Send + '_ {
        let config = &self.config;
        let policy = HostPolicy::new(config.base_domain.as_deref(), config.same_domain_only, &seeds);
        let robots = RobotsGate::new(config.respect_robots_txt, &config.user_agent, self.http.clone());
        let politeness = Politeness::fixed(config.delay());
        let cancel = self.cancel.clone();
        info!(seeds = seeds.len(), max_total = config.max_total, "starting discovery");

        stream! {
            let mut frontier = Frontier::with_seeds(seeds);

            while frontier.yielded() < config.max_total {
                if cancel.is_cancelled() {
                    info!("discovery cancelled");
                    break;
                }
                let Some(FrontierEntry { url, depth }) = frontier.next_unvisited() else {
                    break;
                };

                let host = match self.admit(&policy, &robots, &url, depth).await {
                    Ok(host) => host,
                    Err(reason) => {
                        self.skip(&url, reason);
                        continue;
                    }
                };
                if frontier.fetched_from(&host) >= config.max_pages_per_domain {
                    self.skip(&url, SkipReason::DomainCapReached);
                    continue;
                }

                let rule = self.rules.match_rule(&url);
                if let Some(rule) = rule {
                    rule.run_before_request(&url);
                }

                if self.classify(&self.classifier, &url, rule).await {
                    let total = frontier.record_yield();
                    yield Discovered::pdf(url);
                    if total >= config.max_total {
                        break;
                    }
                    politeness.pause().await;
                    continue;
                }

                let page = match self.fetch(&self.http, &url, rule).await {
                    Ok(page) => page,
                    Err(e) => {
                        debug!(url = %url, error = %e, "fetch failed");
                        self.skip(&url, SkipReason::from(&e));
                        continue;
                    }
                };
                frontier.record_fetch(&host);

                if config.mode.wants_html() {
                    let total = frontier.record_yield();
                    yield Discovered::html(url.clone());
                    if total >= config.max_total {
                        break;
                    }
                }

                for link in self.children(&page, rule, &policy) {
                    if !frontier.is_visited(&link) {
                        frontier.push(link, depth + 1);
                    }
                }
                politeness.pause().await;
            }

            info!(yielded = frontier.yielded(), queued = frontier.queued(), "discovery finished");
        }
    }

    /// Depth, host and robots checks. Returns the URL's host on success.
    pub(crate) async fn admit(
        &self,
        policy: &HostPolicy,
        robots: &RobotsGate,
        url: &Url,
        depth: u32,
    ) -> Result<String, SkipReason> {
        if depth > self.config.max_depth {
            return Err(SkipReason::TooDeep);
        }
        let host = match host_of(url) {
            Some(host) if policy.host_allowed(url) => host,
            _ => return Err(SkipReason::HostNotAllowed),
        };
        if !robots.allows(url).await {
            return Err(SkipReason::RobotsDisallowed);
        }
        Ok(host)
    }

    /// Whether the URL should be reported as a PDF under the collect mode.
    pub(crate) async fn classify(
        &self,
        classifier: &PdfClassifier,
        url: &Url,
        rule: Option<&DomainRule>,
    ) -> bool {
        self.config.mode.wants_pdf() && classifier.is_pdf(url, rule).await
    }

    /// Download a page and run the response hook.
    pub(crate) async fn fetch(
        &self,
        http: &HttpClient,
        url: &Url,
        rule: Option<&DomainRule>,
    ) -> Result<FetchedPage, CrawlError> {
        let page = http.get_page(url).await?;
        if let Some(rule) = rule {
            rule.run_after_response(url, &page);
        }
        page.check()?;
        Ok(page)
    }

    /// Host-admissible links of a downloaded page.
    pub(crate) fn children(
        &self,
        page: &FetchedPage,
        rule: Option<&DomainRule>,
        policy: &HostPolicy,
    ) -> Vec<Url> {
        extract_links(&page.body, &page.url, rule, &self.links)
            .into_iter()
            .filter(|link| policy.host_allowed(link))
            .collect()
    }

    pub(crate) fn skip(&self, url: &Url, reason: SkipReason) {
        debug!(url = %url, %reason, "skipped");
        self.diagnostics.skip(url, reason);
    }
}

pub(crate) fn parse_seeds<I, S>(seeds: I) -> Result<Vec<Url>, CrawlError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let seeds = seeds
        .into_iter()
        .map(|seed| {
            let seed = seed.as_ref().trim();
            Url::parse(seed).map_err(|source| CrawlError::InvalidSeed {
                seed: seed.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if seeds.is_empty() {
        return Err(CrawlError::NoSeeds);
    }
    Ok(seeds)
}
