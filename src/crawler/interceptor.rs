use crate::crawler::driver::ResponseLoader;
use crate::crawler::models::{
    CapturedExchange, InterceptedRequest, LoadedResponse, headers_from_pairs,
};
use crate::crawler::pipeline::{ExchangeSender, PendingExchange};
use crate::crawler::quiescence::{WorkGroup, WorkGuard};
use crate::crawler::scope::Scope;
use crate::utils::{encode_base64, truncate_bytes};
use chrono::Utc;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Rejected at the network layer, never fetched.
    Block,
    /// Forwarded unmodified and not recorded.
    PassThrough,
    /// Replayed through the loader and recorded.
    Capture,
}

#[derive(Debug)]
pub enum InterceptAction {
    Block,
    Continue,
    Fulfill(LoadedResponse),
}

/// Per-session network hook shared by every tab of the crawl.
pub struct Interceptor {
    scope: Arc<Scope>,
    loader: Arc<dyn ResponseLoader>,
    normalize: WorkGroup,
    exchanges: ExchangeSender,
    max_body_size: usize,
}

impl Interceptor {
    pub fn new(
        scope: Arc<Scope>,
        loader: Arc<dyn ResponseLoader>,
        normalize: WorkGroup,
        exchanges: ExchangeSender,
        max_body_size: usize,
    ) -> Self {
        Self {
            scope,
            loader,
            normalize,
            exchanges,
            max_body_size,
        }
    }

    pub fn classify(&self, request: &InterceptedRequest) -> Verdict {
        if self.scope.is_blocked(&request.resource_type) {
            return Verdict::Block;
        }
        if !self.scope.in_scope(&request.url) {
            return Verdict::PassThrough;
        }
        Verdict::Capture
    }

    /// Registers one intercepted event as pending normalization work. Call
    /// this before handing the event off to another task.
    pub fn track(&self) -> WorkGuard {
        self.normalize.add()
    }

    pub async fn handle(&self, request: InterceptedRequest) -> InterceptAction {
        let guard = self.track();
        self.handle_tracked(request, guard).await
    }

    pub async fn handle_tracked(
        &self,
        request: InterceptedRequest,
        guard: WorkGuard,
    ) -> InterceptAction {
        match self.classify(&request) {
            Verdict::Block => return InterceptAction::Block,
            Verdict::PassThrough => return InterceptAction::Continue,
            Verdict::Capture => {}
        }

        let response = match self.loader.load(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("failed to load response for {}: {}", request.url, e);
                return InterceptAction::Continue;
            }
        };

        if response.status == 404 {
            tracing::debug!("not recording 404 {}", request.url);
            return InterceptAction::Fulfill(response);
        }

        let exchange = self.build_exchange(&request, &response);
        if self
            .exchanges
            .send(PendingExchange { exchange, guard })
            .is_err()
        {
            tracing::warn!("normalization queue closed, dropping {}", request.url);
        }

        InterceptAction::Fulfill(response)
    }

    fn build_exchange(
        &self,
        request: &InterceptedRequest,
        response: &LoadedResponse,
    ) -> CapturedExchange {
        let body = request.body.as_deref().unwrap_or_default();
        let host = request_host(&request.url);

        CapturedExchange {
            url: request.url.clone(),
            method: request.method.clone(),
            host: host.clone(),
            headers: headers_from_pairs(&request.headers),
            data: String::from_utf8_lossy(body).into_owned(),
            response_headers: headers_from_pairs(&response.headers),
            response_body: encode_base64(truncate_bytes(&response.body, self.max_body_size)),
            request_str: encode_base64(&dump_request(request, &host)),
            status: response.status,
            resource_type: request.resource_type.as_str().to_string(),
            captured_at: Utc::now(),
        }
    }
}

fn request_host(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// HTTP/1.1 wire form of the request as the browser sent it.
pub fn dump_request(request: &InterceptedRequest, host: &str) -> Vec<u8> {
    let target = Url::parse(&request.url)
        .map(|u| match u.query() {
            Some(q) => format!("{}?{}", u.path(), q),
            None => u.path().to_string(),
        })
        .unwrap_or_else(|_| request.url.clone());

    let mut out = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", request.method, target, host);
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");

    let mut bytes = out.into_bytes();
    if let Some(body) = &request.body {
        bytes.extend_from_slice(body);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::crawler::models::ResourceKind;
    use crate::crawler::pipeline::exchange_channel;
    use crate::crawler::quiescence::{WorkKind, WorkTracker};
    use crate::{CrawlError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticLoader {
        status: u16,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ResponseLoader for StaticLoader {
        async fn load(&self, _request: &InterceptedRequest) -> Result<LoadedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.status == 0 {
                return Err(CrawlError::NetworkError("connection refused".into()));
            }
            Ok(LoadedResponse {
                status: self.status,
                headers: vec![("Content-Type".into(), "application/json".into())],
                body: b"{\"ok\":true}".to_vec(),
            })
        }
    }

    fn interceptor(
        status: u16,
    ) -> (
        Interceptor,
        crate::crawler::pipeline::ExchangeReceiver,
        Arc<StaticLoader>,
        Arc<WorkTracker>,
    ) {
        let scope = Arc::new(Scope::new("http://example.com/", &FilterConfig::default()).unwrap());
        let loader = Arc::new(StaticLoader {
            status,
            calls: AtomicUsize::new(0),
        });
        let tracker = WorkTracker::new();
        let (tx, rx) = exchange_channel();
        let interceptor = Interceptor::new(
            scope,
            loader.clone(),
            tracker.group(WorkKind::Normalize),
            tx,
            1024,
        );
        (interceptor, rx, loader, tracker)
    }

    #[tokio::test]
    async fn test_fonts_and_images_blocked_regardless_of_host() {
        let (interceptor, mut rx, loader, _) = interceptor(200);
        for (url, kind) in [
            ("http://example.com/a.woff2", ResourceKind::Font),
            ("http://cdn.other.org/logo.png", ResourceKind::Image),
        ] {
            let action = interceptor.handle(InterceptedRequest::get(url, kind)).await;
            assert!(matches!(action, InterceptAction::Block));
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_out_of_scope_passes_through_unrecorded() {
        let (interceptor, mut rx, loader, _) = interceptor(200);
        let action = interceptor
            .handle(InterceptedRequest::get(
                "http://other.org/c",
                ResourceKind::Document,
            ))
            .await;
        assert!(matches!(action, InterceptAction::Continue));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_in_scope_captured_and_fulfilled() {
        let (interceptor, mut rx, _, tracker) = interceptor(200);
        let mut request = InterceptedRequest::get("http://example.com/api?q=1", ResourceKind::Xhr);
        request.method = "POST".into();
        request.headers = vec![("X-Token".into(), "abc".into())];
        request.body = Some(b"a=1".to_vec());

        let action = interceptor.handle(request).await;
        assert!(matches!(action, InterceptAction::Fulfill(ref r) if r.status == 200));

        let pending = rx.try_recv().unwrap();
        assert_eq!(pending.exchange.method, "POST");
        assert_eq!(pending.exchange.host, "example.com");
        assert_eq!(pending.exchange.data, "a=1");
        assert_eq!(pending.exchange.status, 200);
        assert_eq!(pending.exchange.headers["X-Token"], vec!["abc"]);
        assert_eq!(tracker.pending(WorkKind::Normalize), 1);
        drop(pending);
        assert_eq!(tracker.pending(WorkKind::Normalize), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_fulfilled_but_not_recorded() {
        let (interceptor, mut rx, _, tracker) = interceptor(404);
        let action = interceptor
            .handle(InterceptedRequest::get(
                "http://example.com/data.json",
                ResourceKind::Fetch,
            ))
            .await;
        assert!(matches!(action, InterceptAction::Fulfill(ref r) if r.status == 404));
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.pending(WorkKind::Normalize), 0);
    }

    #[tokio::test]
    async fn test_load_failure_continues_request() {
        let (interceptor, mut rx, _, tracker) = interceptor(0);
        let action = interceptor
            .handle(InterceptedRequest::get(
                "http://example.com/x",
                ResourceKind::Document,
            ))
            .await;
        assert!(matches!(action, InterceptAction::Continue));
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_dump_request() {
        let mut request = InterceptedRequest::get("http://example.com:8080/p?x=1", ResourceKind::Xhr);
        request.method = "POST".into();
        request.headers = vec![
            ("Host".into(), "ignored".into()),
            ("Content-Type".into(), "text/plain".into()),
        ];
        request.body = Some(b"hello".to_vec());

        let dump = String::from_utf8(dump_request(&request, &request_host(&request.url))).unwrap();
        assert_eq!(
            dump,
            "POST /p?x=1 HTTP/1.1\r\nHost: example.com:8080\r\nContent-Type: text/plain\r\n\r\nhello"
        );
    }
}
