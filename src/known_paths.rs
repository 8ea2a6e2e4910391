use crate::crawler::normalize::hostname;
use crate::timeouts::secs;
use crate::{CrawlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// A URL the site advertises, with the robots rule or sitemap it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPath {
    pub url: String,
    pub pattern: String,
}

/// Source of URLs a site advertises outside its pages.
#[async_trait::async_trait]
pub trait KnownPaths: Send + Sync {
    async fn request(&self, target: &str) -> Result<Vec<KnownPath>>;
}

/// Reads `robots.txt` and `sitemap.xml` from the target's origin.
pub struct HttpKnownPaths {
    client: reqwest::Client,
}

static ROBOTS_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(allow|disallow|sitemap)\s*:\s*(\S+)").expect("valid regex")
});

static SITEMAP_LOC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").expect("valid regex"));

impl HttpKnownPaths {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(secs::KNOWN_PATHS))
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| CrawlError::ConfigError(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| CrawlError::KnownPathsFailed(e.to_string()))?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &Url) -> Result<Option<String>> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| CrawlError::KnownPathsFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            tracing::debug!("{} returned {}", url, response.status());
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::KnownPathsFailed(format!("{}: {}", url, e)))?;
        Ok(Some(body))
    }
}

#[async_trait::async_trait]
impl KnownPaths for HttpKnownPaths {
    async fn request(&self, target: &str) -> Result<Vec<KnownPath>> {
        let base = Url::parse(target).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        let host = hostname(target).unwrap_or_default();

        let mut found = Vec::new();
        let mut sitemaps = vec![join(&base, "/sitemap.xml")?];

        if let Some(robots) = self.fetch(&join(&base, "/robots.txt")?).await? {
            let parsed = parse_robots(&robots);
            found.extend(parsed.paths);
            for sitemap in parsed.sitemaps {
                if let Ok(url) = base.join(&sitemap)
                    && !sitemaps.contains(&url)
                {
                    sitemaps.push(url);
                }
            }
        }

        for sitemap in &sitemaps {
            match self.fetch(sitemap).await {
                Ok(Some(xml)) => {
                    let pattern = format!("Sitemap: {}", sitemap);
                    found.extend(parse_sitemap(&xml).into_iter().map(|loc| (loc, pattern.clone())));
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("sitemap skipped: {}", e),
            }
        }

        let mut seen = HashSet::new();
        let urls: Vec<KnownPath> = found
            .into_iter()
            .filter_map(|(path, pattern)| base.join(&path).ok().map(|url| (url, pattern)))
            .filter(|(url, _)| url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&host)))
            .map(|(mut url, pattern)| {
                url.set_fragment(None);
                KnownPath {
                    url: url.to_string(),
                    pattern,
                }
            })
            .filter(|path| seen.insert(path.url.clone()))
            .collect();

        tracing::debug!("{} known paths for {}", urls.len(), target);
        Ok(urls)
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| CrawlError::InvalidUrl(format!("{}{}: {}", base, path, e)))
}

#[derive(Debug, Default, PartialEq)]
pub struct RobotsPaths {
    /// Path and the rule that named it, e.g. `("/admin/", "Disallow: /admin/")`.
    pub paths: Vec<(String, String)>,
    pub sitemaps: Vec<String>,
}

/// Extracts concrete paths from Allow/Disallow rules. Wildcard patterns and
/// the bare root are skipped.
pub fn parse_robots(body: &str) -> RobotsPaths {
    let mut out = RobotsPaths::default();

    for cap in ROBOTS_DIRECTIVE.captures_iter(body) {
        let value = cap[2].trim();
        if cap[1].eq_ignore_ascii_case("sitemap") {
            out.sitemaps.push(value.to_string());
            continue;
        }

        let path = value.trim_end_matches('$');
        if path == "/" || path.contains('*') || !path.starts_with('/') {
            continue;
        }
        out.paths
            .push((path.to_string(), format!("{}: {}", &cap[1], value)));
    }

    out
}

pub fn parse_sitemap(body: &str) -> Vec<String> {
    SITEMAP_LOC
        .captures_iter(body)
        .map(|cap| cap[1].replace("&amp;", "&"))
        .filter(|loc| !loc.is_empty())
        .collect()
}
