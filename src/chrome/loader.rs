use crate::config::NetworkConfig;
use crate::crawler::driver::ResponseLoader;
use crate::crawler::models::{InterceptedRequest, LoadedResponse};
use crate::timeouts::secs;
use crate::{CrawlError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use std::time::Duration;

/// Request headers the client computes itself, or that would make the
/// origin answer with a body the browser cannot be handed back as-is.
const SKIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "accept-encoding", "connection"];

/// Replays intercepted requests through reqwest.
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(secs::RESPONSE_LOAD));

        if let Some(ref proxy) = network.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| CrawlError::ConfigError(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        if let Some(ref ua) = network.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder
            .build()
            .map_err(|e| CrawlError::NetworkError(e.to_string()))?;
        Ok(Self { client })
    }
}

fn request_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if name.starts_with(':')
            || SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skip| name.eq_ignore_ascii_case(skip))
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!("dropping malformed header {}", name),
        }
    }
    headers
}

#[async_trait::async_trait]
impl ResponseLoader for HttpLoader {
    async fn load(&self, request: &InterceptedRequest) -> Result<LoadedResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CrawlError::CaptureFailed(format!("bad method {}: {}", request.method, e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(request_headers(&request.headers));
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CrawlError::NetworkError(format!("{}: {}", request.url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CrawlError::NetworkError(format!("{}: {}", request.url, e)))?
            .to_vec();

        Ok(LoadedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::ResourceKind;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader() -> HttpLoader {
        HttpLoader::new(&NetworkConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_load_get_returns_status_headers_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("x-token", "abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let mut request =
            InterceptedRequest::get(format!("{}/page", server.uri()), ResourceKind::Document);
        request.headers.push(("X-Token".into(), "abc".into()));
        request.headers.push(("Host".into(), "ignored.test".into()));

        let response = loader().load(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_html());
        assert_eq!(response.body, b"<html></html>");
    }

    #[tokio::test]
    async fn test_load_post_forwards_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(body_string("a=1"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let mut request =
            InterceptedRequest::get(format!("{}/api", server.uri()), ResourceKind::Xhr);
        request.method = "POST".into();
        request.body = Some(b"a=1".to_vec());

        let response = loader().load(&request).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_load_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
            .mount(&server)
            .await;

        let request =
            InterceptedRequest::get(format!("{}/old", server.uri()), ResourceKind::Document);
        let response = loader().load(&request).await.unwrap();
        assert_eq!(response.status, 302);
    }

    #[tokio::test]
    async fn test_load_unreachable_is_network_error() {
        let request = InterceptedRequest::get("http://127.0.0.1:1/", ResourceKind::Document);
        let result = loader().load(&request).await;
        assert!(matches!(result, Err(CrawlError::NetworkError(_))));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let network = NetworkConfig {
            proxy: Some("::not a proxy::".into()),
            user_agent: None,
        };
        assert!(HttpLoader::new(&network).is_err());
    }
}
