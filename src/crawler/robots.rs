//! robots.txt support
//!
//! Bodies are parsed with `texting_robots` for the product token of our user
//! agent. A robots.txt that cannot be fetched or parsed allows everything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use texting_robots::{Robot, get_robots_url};
use tracing::debug;
use url::Url;

use crate::http::HttpClient;

/// Parsed robots.txt of one origin
#[derive(Debug, Default)]
pub struct RobotsRules {
    robot: Option<Robot>,
}

impl RobotsRules {
    /// Parse a robots.txt body for the given user agent.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        match Robot::new(&agent_token(user_agent), body.as_bytes()) {
            Ok(robot) => Self { robot: Some(robot) },
            Err(e) => {
                debug!(error = %e, "unparsable robots.txt ignored");
                Self::default()
            }
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.robot
            .as_ref()
            .is_none_or(|robot| robot.allowed(url.as_str()))
    }
}

/// Product token of a user agent string, e.g. `sift` for `sift/0.1.0`.
fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Per-origin robots.txt cache for one crawl
#[derive(Clone)]
pub struct RobotsGate {
    enabled: bool,
    user_agent: String,
    http: HttpClient,
    cache: Arc<Mutex<HashMap<String, Arc<RobotsRules>>>>,
}

impl RobotsGate {
    pub fn new(enabled: bool, user_agent: &str, http: HttpClient) -> Self {
        Self {
            enabled,
            user_agent: user_agent.to_string(),
            http,
            cache: Arc::default(),
        }
    }

    /// Whether robots.txt permits fetching the URL. Always true when disabled.
    pub async fn allows(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }
        let origin = url.origin().ascii_serialization();
        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&origin).cloned());
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = Arc::new(self.fetch(url).await);
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(origin, rules.clone());
                }
                rules
            }
        };
        rules.allows(url)
    }

    async fn fetch(&self, url: &Url) -> RobotsRules {
        let Some(robots_url) = get_robots_url(url.as_str())
            .ok()
            .and_then(|raw| Url::parse(&raw).ok())
        else {
            return RobotsRules::default();
        };
        match self.http.get_text(&robots_url).await {
            Ok(Some(body)) => RobotsRules::parse(&body, &self.user_agent),
            Ok(None) => RobotsRules::default(),
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt unavailable");
                RobotsRules::default()
            }
        }
    }
}
