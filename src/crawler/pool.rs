//! Concurrent discovery with a fixed pool of workers
//!
//! Workers share one frontier guarded by a mutex. URLs are marked seen when
//! they are enqueued, so no URL is ever handed to two workers. The page cap of
//! a host is reserved before fetching and released again when the URL turns
//! out to be a PDF or the fetch fails. Every request of the crawl goes
//! through one throttled client, so requests to a host are spaced by the
//! configured delay. Results go through a bounded channel; dropping the
//! receiving stream stops every worker, including one waiting on a request.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument};
use url::Url;

use crate::crawler::Discovered;
use crate::crawler::classifier::PdfClassifier;
use crate::crawler::discovery::{RuleBasedCrawler, parse_seeds};
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::policy::HostPolicy;
use crate::crawler::politeness::Politeness;
use crate::crawler::report::SkipReason;
use crate::crawler::robots::RobotsGate;
use crate::http::HttpClient;

#[derive(Default)]
struct PoolState {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    fetched: HashMap<String, usize>,
    in_flight: usize,
}

/// Frontier and limits shared by the workers of one crawl
struct Pool {
    state: Mutex<PoolState>,
    wake: Notify,
    yielded: AtomicUsize,
    max_total: usize,
    max_per_domain: usize,
    stop: CancellationToken,
    policy: HostPolicy,
    robots: RobotsGate,
    http: HttpClient,
    classifier: PdfClassifier,
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn halt(&self) {
        self.stop.cancel();
        self.wake.notify_waiters();
    }

    /// Wait for the next entry. `None` once the crawl is over or nobody
    /// listens for results anymore.
    async fn next(&self, tx: &mpsc::Sender<Discovered>) -> Option<FrontierEntry> {
        loop {
            let woken = self.wake.notified();
            if tx.is_closed() {
                debug!("receiver dropped");
                self.halt();
                return None;
            }
            if self.stop.is_cancelled() || self.yielded.load(Ordering::SeqCst) >= self.max_total {
                return None;
            }
            {
                let mut state = self.lock();
                if let Some(entry) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(entry);
                }
                if state.in_flight == 0 {
                    drop(state);
                    debug!("frontier exhausted");
                    self.halt();
                    return None;
                }
            }
            tokio::select! {
                _ = woken => {}
                _ = self.stop.cancelled() => {}
            }
        }
    }

    /// Mark the entry handed out by `next` as done.
    fn finish(&self) {
        let idle = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0
        };
        if idle {
            self.wake.notify_waiters();
        }
    }

    fn enqueue(&self, links: Vec<Url>, depth: u32) {
        let added = {
            let mut state = self.lock();
            let mut added = 0;
            for url in links {
                if state.seen.insert(url.as_str().to_string()) {
                    state.queue.push_back(FrontierEntry { url, depth });
                    added += 1;
                }
            }
            added
        };
        if added > 0 {
            self.wake.notify_waiters();
        }
    }

    /// Take one page slot of the host, if any is left.
    fn reserve_page(&self, host: &str) -> bool {
        let mut state = self.lock();
        let fetched = state.fetched.entry(host.to_string()).or_insert(0);
        if *fetched >= self.max_per_domain {
            return false;
        }
        *fetched += 1;
        true
    }

    fn release_page(&self, host: &str) {
        if let Some(fetched) = self.lock().fetched.get_mut(host) {
            *fetched = fetched.saturating_sub(1);
        }
    }

    /// Send a result if the total allows it. Returns whether the crawl goes on.
    async fn emit(&self, tx: &mpsc::Sender<Discovered>, item: Discovered) -> bool {
        let reserved = self
            .yielded
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_total).then_some(n + 1)
            });
        let Ok(previous) = reserved else {
            return false;
        };
        if tx.send(item).await.is_err() {
            debug!("receiver dropped");
            self.halt();
            return false;
        }
        if previous + 1 >= self.max_total {
            self.halt();
            return false;
        }
        true
    }
}

impl RuleBasedCrawler {
    /// Crawl with `workers` concurrent tasks and stream the results.
    ///
    /// Results arrive in completion order rather than breadth-first order.
    /// Requests to one host are spaced by the configured delay. Must be called
    /// from within a tokio runtime.
    #[instrument(skip(self, seeds))]
    pub fn discover_concurrent<I, S>(
        self: Arc<Self>,
        seeds: I,
        workers: usize,
    ) -> Result<ReceiverStream<Discovered>, CrawlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = parse_seeds(seeds)?;
        let workers = workers.max(1);
        let config = &self.config;

        let mut state = PoolState::default();
        for url in &seeds {
            if state.seen.insert(url.as_str().to_string()) {
                state.queue.push_back(FrontierEntry {
                    url: url.clone(),
                    depth: 0,
                });
            }
        }
        let http = self
            .http
            .throttled(Arc::new(Politeness::per_host(config.delay())));
        let pool = Arc::new(Pool {
            state: Mutex::new(state),
            wake: Notify::new(),
            yielded: AtomicUsize::new(0),
            max_total: config.max_total,
            max_per_domain: config.max_pages_per_domain,
            stop: self.cancel.child_token(),
            policy: HostPolicy::new(config.base_domain.as_deref(), config.same_domain_only, &seeds),
            robots: RobotsGate::new(config.respect_robots_txt, &config.user_agent, http.clone()),
            classifier: self.classifier.with_http(http.clone()),
            http,
        });

        info!(seeds = seeds.len(), workers, "starting concurrent discovery");
        let (tx, rx) = mpsc::channel(workers * 2);
        for id in 0..workers {
            let worker = run_worker(self.clone(), pool.clone(), tx.clone());
            tokio::spawn(worker.instrument(info_span!("worker", id)));
        }
        tokio::spawn(watch_receiver(pool, tx));
        Ok(ReceiverStream::new(rx))
    }

    async fn process(&self, pool: &Pool, entry: FrontierEntry, tx: &mpsc::Sender<Discovered>) {
        let FrontierEntry { url, depth } = entry;

        let host = match self.admit(&pool.policy, &pool.robots, &url, depth).await {
            Ok(host) => host,
            Err(reason) => return self.skip(&url, reason),
        };
        if !pool.reserve_page(&host) {
            return self.skip(&url, SkipReason::DomainCapReached);
        }

        let rule = self.rules.match_rule(&url);
        if let Some(rule) = rule {
            rule.run_before_request(&url);
        }

        if self.classify(&pool.classifier, &url, rule).await {
            pool.release_page(&host);
            pool.emit(tx, Discovered::pdf(url)).await;
            return;
        }

        let page = match self.fetch(&pool.http, &url, rule).await {
            Ok(page) => page,
            Err(e) => {
                pool.release_page(&host);
                debug!(url = %url, error = %e, "fetch failed");
                return self.skip(&url, SkipReason::from(&e));
            }
        };

        if self.config.mode.wants_html() && !pool.emit(tx, Discovered::html(url.clone())).await {
            return;
        }
        let children = self.children(&page, rule, &pool.policy);
        pool.enqueue(children, depth + 1);
    }
}

async fn run_worker(crawler: Arc<RuleBasedCrawler>, pool: Arc<Pool>, tx: mpsc::Sender<Discovered>) {
    while let Some(entry) = pool.next(&tx).await {
        tokio::select! {
            _ = crawler.process(&pool, entry, &tx) => {}
            _ = pool.stop.cancelled() => {}
        }
        pool.finish();
    }
    debug!("worker done");
}

/// Halt the pool as soon as the result stream is dropped.
async fn watch_receiver(pool: Arc<Pool>, tx: mpsc::Sender<Discovered>) {
    tokio::select! {
        _ = tx.closed() => {
            debug!("receiver dropped");
            pool.halt();
        }
        _ = pool.stop.cancelled() => {}
    }
}
