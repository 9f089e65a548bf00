//! Frontier state for a sequential crawl

use std::collections::{HashMap, HashSet, VecDeque};

use url::Url;

/// A queued URL and its link distance from the seeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

/// FIFO work queue plus the bookkeeping of one crawl.
///
/// URLs are marked visited when dequeued, not when enqueued, so the same URL
/// may sit in the queue more than once; later copies are discarded by
/// `next_unvisited`.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    fetched: HashMap<String, usize>,
    yielded: usize,
}

impl Frontier {
    pub fn with_seeds(seeds: impl IntoIterator<Item = Url>) -> Self {
        let mut frontier = Self::default();
        for url in seeds {
            frontier.push(url, 0);
        }
        frontier
    }

    pub fn push(&mut self, url: Url, depth: u32) {
        self.queue.push_back(FrontierEntry { url, depth });
    }

    /// Pop entries until one not yet visited is found, and mark it visited.
    pub fn next_unvisited(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.queue.pop_front() {
            if self.visited.insert(entry.url.as_str().to_string()) {
                return Some(entry);
            }
        }
        None
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Pages fetched so far from a host
    pub fn fetched_from(&self, host: &str) -> usize {
        self.fetched.get(host).copied().unwrap_or(0)
    }

    pub fn record_fetch(&mut self, host: &str) {
        *self.fetched.entry(host.to_string()).or_insert(0) += 1;
    }

    /// Count a yielded result and return the new total.
    pub fn record_yield(&mut self) -> usize {
        self.yielded += 1;
        self.yielded
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }
}
