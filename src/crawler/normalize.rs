use crate::crawler::models::CapturedExchange;
use crate::{CrawlError, Result};
use url::Url;

/// Canonical frontier key: fragment stripped, query pairs sorted, scheme and
/// host lower-cased, default port dropped.
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CrawlError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            url.scheme(),
            raw
        )));
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    Ok(url.into())
}

/// Hostname of a URL, lower-cased; `None` for unparsable or host-less URLs.
pub fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Dedup key for recorded exchanges: method, normalized URL and the names of
/// any body parameters.
pub fn exchange_signature(exchange: &CapturedExchange) -> String {
    let url = normalize_url(&exchange.url).unwrap_or_else(|_| exchange.url.clone());
    let method = exchange.method.to_ascii_uppercase();

    if exchange.data.is_empty() {
        return format!("{} {}", method, url);
    }

    format!("{} {} {}", method, url, body_shape(&exchange.data))
}

fn body_shape(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        return format!(
            "json:{}",
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
        );
    }

    if body.contains('=') && !body.contains(char::is_whitespace) {
        let mut keys: Vec<String> = url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, _)| k.into_owned())
            .collect();
        keys.sort();
        keys.dedup();
        return format!("form:{}", keys.join(","));
    }

    format!("raw:{}", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::Headers;
    use chrono::Utc;

    fn exchange(method: &str, url: &str, data: &str) -> CapturedExchange {
        CapturedExchange {
            url: url.to_string(),
            method: method.to_string(),
            host: "example.com".to_string(),
            headers: Headers::new(),
            data: data.to_string(),
            response_headers: Headers::new(),
            response_body: String::new(),
            request_str: String::new(),
            status: 200,
            resource_type: "XHR".to_string(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_strips_fragment() {
        assert_eq!(
            normalize_url("http://example.com/a#top").unwrap(),
            normalize_url("http://example.com/a").unwrap()
        );
    }

    #[test]
    fn test_normalize_sorts_query() {
        assert_eq!(
            normalize_url("http://example.com/a?b=2&a=1").unwrap(),
            normalize_url("http://example.com/a?a=1&b=2").unwrap()
        );
    }

    #[test]
    fn test_normalize_lowercases_scheme_and_host() {
        assert_eq!(
            normalize_url("HTTP://Example.COM/Path").unwrap(),
            "http://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_drops_default_port_and_empty_query() {
        assert_eq!(
            normalize_url("https://example.com:443/x?").unwrap(),
            "https://example.com/x"
        );
    }

    #[test]
    fn test_normalize_keeps_distinct_paths() {
        assert_ne!(
            normalize_url("http://example.com/a").unwrap(),
            normalize_url("http://example.com/b").unwrap()
        );
    }

    #[test]
    fn test_normalize_rejects_non_http() {
        assert!(normalize_url("javascript:void(0)").is_err());
        assert!(normalize_url("mailto:a@b.c").is_err());
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_hostname() {
        assert_eq!(
            hostname("http://Example.com:8080/x").as_deref(),
            Some("example.com")
        );
        assert!(hostname("nope").is_none());
    }

    #[test]
    fn test_signature_ignores_body_values() {
        let a = exchange("post", "http://example.com/login", "user=a&pass=b");
        let b = exchange("POST", "http://example.com/login", "pass=x&user=y");
        assert_eq!(exchange_signature(&a), exchange_signature(&b));
    }

    #[test]
    fn test_signature_json_keys() {
        let a = exchange("POST", "http://example.com/api", r#"{"a":1,"b":2}"#);
        let b = exchange("POST", "http://example.com/api", r#"{"b":3,"a":4}"#);
        let c = exchange("POST", "http://example.com/api", r#"{"c":1}"#);
        assert_eq!(exchange_signature(&a), exchange_signature(&b));
        assert_ne!(exchange_signature(&a), exchange_signature(&c));
    }

    #[test]
    fn test_signature_distinguishes_method() {
        let a = exchange("GET", "http://example.com/x", "");
        let b = exchange("DELETE", "http://example.com/x", "");
        assert_ne!(exchange_signature(&a), exchange_signature(&b));
    }
}
