//! robots.txt retrieval and evaluation.
//!
//! Rules are fetched per call and never cached. Any failure to obtain the
//! file (network error, non-2xx, oversized body) allows access: a missing
//! robots.txt is not a denial.

use url::Url;

use super::fetcher::{Accept, Fetcher};

/// Checks whether the configured agent may fetch a URL.
#[derive(Debug, Clone)]
pub struct RobotsChecker {
    fetcher: Fetcher,
    agent: String,
}

impl RobotsChecker {
    pub fn new(fetcher: Fetcher, agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            agent: agent.into(),
        }
    }

    /// Fail-open verdict for `url` under its origin's robots.txt.
    pub async fn is_allowed(&self, url: &str) -> bool {
        let Ok(target) = Url::parse(url) else {
            return true;
        };
        let Ok(robots_url) = target.join("/robots.txt") else {
            return true;
        };

        let rules = match self.fetcher.get(robots_url.as_str(), Accept::RobotsTxt).await {
            Ok(bytes) => RobotsRules::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt unavailable, allowing");
                return true;
            }
        };

        let path = request_path(&target);
        let allowed = rules.is_allowed(&self.agent, &path);
        if !allowed {
            tracing::info!(url = %url, agent = %self.agent, "robots.txt disallows path");
        }
        allowed
    }
}

/// Path plus query, the part of a URL robots.txt patterns match against.
fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt: `User-agent` groups with their `Allow`/`Disallow` rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    /// Lenient line parser. Unknown directives (`Sitemap`, `Crawl-delay`) are ignored,
    /// as are rules appearing before any `User-agent` line.
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        // Consecutive User-agent lines share one group
        let mut collecting_agents = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(Group::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    // An empty Disallow means "nothing is disallowed"
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.rules.push(Rule {
                            allow: key == "allow",
                            pattern: value.to_owned(),
                        });
                    }
                }
                _ => {}
            }
        }

        Self { groups }
    }

    /// Evaluates `path` for `agent`.
    ///
    /// Groups naming the agent's product token take precedence over `*`.
    /// Within the selected groups the longest matching pattern wins, and
    /// `Allow` wins a tie. No matching rule means allowed.
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        if path == "/robots.txt" {
            return true;
        }

        let token = agent
            .split('/')
            .next()
            .unwrap_or(agent)
            .trim()
            .to_ascii_lowercase();

        let mut selected: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == token))
            .collect();
        if selected.is_empty() {
            selected = self
                .groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect();
        }

        selected
            .iter()
            .flat_map(|g| g.rules.iter())
            .filter(|rule| pattern_matches(&rule.pattern, path))
            .max_by_key(|rule| (rule.pattern.len(), rule.allow))
            .map(|rule| rule.allow)
            .unwrap_or(true)
    }
}

/// Prefix match with `*` wildcards and an optional `$` end anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    if parts.len() == 1 {
        return !anchored || path.len() == first.len();
    }

    let mut pos = first.len();
    let last_index = parts.len() - 1;
    for (index, part) in parts.iter().enumerate().skip(1) {
        if index == last_index && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }

    true
}
