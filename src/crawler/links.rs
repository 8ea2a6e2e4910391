use scraper::{Html, Selector};
use url::Url;

const LINK_SELECTORS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("area[href]", "href"),
    ("form[action]", "action"),
    ("iframe[src]", "src"),
    ("frame[src]", "src"),
];

/// Absolute http(s) URLs referenced by navigational elements of `html`.
pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let base = document_base(&document, &base).unwrap_or(base);

    let mut links = Vec::new();
    for (css, attr) in LINK_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attr)
                && let Some(link) = resolve_link(&base, value)
                && !links.contains(&link)
            {
                links.push(link);
            }
        }
    }
    links
}

fn document_base(document: &Html, page: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    page.join(href).ok()
}

pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_resolves_relative() {
        let html = r#"<html><body>
            <a href="/b">B</a>
            <a href="http://other.test/c">C</a>
            <a href="d?x=1#frag">D</a>
            <form action="/login" method="post"></form>
            <iframe src="/frame"></iframe>
        </body></html>"#;

        let links = extract_links(html, "http://example.com/dir/a");
        assert_eq!(
            links,
            vec![
                "http://example.com/b",
                "http://other.test/c",
                "http://example.com/dir/d?x=1",
                "http://example.com/login",
                "http://example.com/frame",
            ]
        );
    }

    #[test]
    fn test_extract_links_skips_pseudo_schemes() {
        let html = r##"<a href="#top"></a><a href="mailto:x@y.z"></a>
            <a href="javascript:void(0)"></a><a href="ftp://example.com/f"></a>"##;
        assert!(extract_links(html, "http://example.com/").is_empty());
    }

    #[test]
    fn test_extract_links_honours_base_tag() {
        let html = r#"<head><base href="http://example.com/app/"></head><a href="page">p</a>"#;
        assert_eq!(
            extract_links(html, "http://example.com/"),
            vec!["http://example.com/app/page"]
        );
    }

    #[test]
    fn test_extract_links_dedups() {
        let html = r#"<a href="/x"></a><a href="/x#a"></a>"#;
        assert_eq!(extract_links(html, "http://example.com/").len(), 1);
    }
}
