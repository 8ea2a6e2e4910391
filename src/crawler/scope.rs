use crate::config::FilterConfig;
use crate::crawler::models::ResourceKind;
use crate::crawler::normalize::hostname;
use crate::{CrawlError, Result};
use std::collections::HashSet;
use url::Url;

/// Decides which traffic belongs to the crawl target.
///
/// Scope is the target *hostname* only: scheme and port are ignored, and
/// subdomains are out of scope.
#[derive(Debug, Clone)]
pub struct Scope {
    hostname: String,
    blocked_types: Vec<ResourceKind>,
    static_extensions: HashSet<String>,
}

impl Scope {
    pub fn new(target: &str, filters: &FilterConfig) -> Result<Self> {
        let hostname = hostname(target)
            .ok_or_else(|| CrawlError::InvalidUrl(format!("target has no host: {}", target)))?;

        Ok(Self {
            hostname,
            blocked_types: filters
                .blocked_resource_types
                .iter()
                .map(|t| ResourceKind::parse(t))
                .collect(),
            static_extensions: filters
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_blocked(&self, kind: &ResourceKind) -> bool {
        self.blocked_types.contains(kind)
    }

    pub fn in_scope(&self, url: &str) -> bool {
        hostname(url).is_some_and(|h| h == self.hostname)
    }

    pub fn is_static(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .is_some_and(|(_, ext)| self.static_extensions.contains(&ext.to_ascii_lowercase()))
    }

    /// Whether a URL is worth opening in a tab.
    pub fn is_navigable(&self, url: &str) -> bool {
        self.in_scope(url) && !self.is_static(url)
    }
}
