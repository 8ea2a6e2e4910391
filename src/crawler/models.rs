use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Header multimap, keyed by the name as the wire carried it.
pub type Headers = BTreeMap<String, Vec<String>>;

pub fn headers_from_pairs<'a, I>(pairs: I) -> Headers
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    let mut headers = Headers::new();
    for (name, value) in pairs {
        headers.entry(name.clone()).or_default().push(value.clone());
    }
    headers
}

pub fn header_value<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "entry")]
    Entry,
    #[serde(rename = "page link")]
    PageLink,
    #[serde(rename = "dom link")]
    DomLink,
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "static parse")]
    StaticPath,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Entry => "entry",
            Self::PageLink => "page link",
            Self::DomLink => "dom link",
            Self::Document => "document",
            Self::StaticPath => "static parse",
        };
        f.write_str(s)
    }
}

/// A candidate navigation target waiting in the frontier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlInfo {
    pub url: String,
    pub source_type: SourceKind,
    pub matched: Option<String>,
    pub source_url: Option<String>,
}

impl UrlInfo {
    pub fn entry(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_type: SourceKind::Entry,
            matched: None,
            source_url: None,
        }
    }

    pub fn discovered(
        url: impl Into<String>,
        source_type: SourceKind,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            source_type,
            matched: None,
            source_url: Some(source_url.into()),
        }
    }

    pub fn with_match(mut self, pattern: impl Into<String>) -> Self {
        self.matched = Some(pattern.into());
        self
    }
}

/// Resource classification reported by the browser for a paused request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    WebSocket,
    Other(String),
}

impl ResourceKind {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "media" => Self::Media,
            "font" => Self::Font,
            "script" => Self::Script,
            "xhr" => Self::Xhr,
            "fetch" => Self::Fetch,
            "websocket" => Self::WebSocket,
            _ => Self::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "Document",
            Self::Stylesheet => "Stylesheet",
            Self::Image => "Image",
            Self::Media => "Media",
            Self::Font => "Font",
            Self::Script => "Script",
            Self::Xhr => "XHR",
            Self::Fetch => "Fetch",
            Self::WebSocket => "WebSocket",
            Self::Other(s) => s,
        }
    }
}

/// One outbound request paused by the browser, before it hits the network.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub resource_type: ResourceKind,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>, resource_type: ResourceKind) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            resource_type,
            headers: Vec::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl LoadedResponse {
    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "content-type")
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }
}

/// One in-scope request/response pair as recorded in the results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedExchange {
    pub url: String,
    pub method: String,
    pub host: String,
    pub headers: Headers,
    pub data: String,
    pub response_headers: Headers,
    pub response_body: String,
    pub request_str: String,
    pub status: u16,
    pub resource_type: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedExchange {
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.response_header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!(ResourceKind::parse("Font"), ResourceKind::Font);
        assert_eq!(ResourceKind::parse("image"), ResourceKind::Image);
        assert_eq!(ResourceKind::parse("XHR"), ResourceKind::Xhr);
        assert_eq!(
            ResourceKind::parse("Ping"),
            ResourceKind::Other("Ping".to_string())
        );
        assert_eq!(ResourceKind::parse("Ping").as_str(), "Ping");
    }

    #[test]
    fn test_headers_from_pairs_keeps_repeats() {
        let pairs = vec![
            ("Set-Cookie".to_string(), "a=1".to_string()),
            ("Set-Cookie".to_string(), "b=2".to_string()),
            ("Content-Type".to_string(), "text/html".to_string()),
        ];
        let headers = headers_from_pairs(&pairs);
        assert_eq!(headers["Set-Cookie"], vec!["a=1", "b=2"]);
        assert_eq!(header_value(&pairs, "content-type"), Some("text/html"));
    }

    #[test]
    fn test_source_kind_serializes_readable() {
        let info = UrlInfo::discovered("http://a/b", SourceKind::StaticPath, "robots.txt");
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"static parse\""));
        assert_eq!(SourceKind::PageLink.to_string(), "page link");
    }

    #[test]
    fn test_loaded_response_is_html() {
        let response = LoadedResponse {
            status: 200,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: Vec::new(),
        };
        assert!(response.is_html());
    }
}
