use crate::crawler::driver::TabHandle;
use crate::crawler::interceptor::{InterceptAction, Interceptor};
use crate::crawler::models::{InterceptedRequest, LoadedResponse, ResourceKind};
use crate::crawler::quiescence::WorkGuard;
use crate::js_templates::COLLECT_LINKS;
use crate::timeouts::ms;
use crate::utils::{decode_base64, encode_base64};
use crate::{CrawlError, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, FulfillRequestParams,
    HeaderEntry,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventJavascriptDialogOpening,
    HandleJavaScriptDialogParams, NavigateParams,
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Hop-by-hop and transport headers that no longer describe a fulfilled body.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &["transfer-encoding", "connection", "content-encoding"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PausedRequest {
    url: String,
    method: String,
    #[serde(default)]
    headers: serde_json::Value,
    post_data: Option<String>,
    #[serde(default)]
    post_data_entries: Vec<PostDataEntry>,
}

#[derive(Debug, Deserialize)]
struct PostDataEntry {
    bytes: Option<String>,
}

fn to_intercepted(event: &EventRequestPaused) -> Result<InterceptedRequest> {
    let value = serde_json::to_value(&event.request)?;
    let paused: PausedRequest = serde_json::from_value(value)?;

    let resource_type = match serde_json::to_value(&event.resource_type)? {
        serde_json::Value::String(s) => ResourceKind::parse(&s),
        other => ResourceKind::Other(other.to_string()),
    };

    let headers = match paused.headers {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect(),
        _ => Vec::new(),
    };

    let body = if !paused.post_data_entries.is_empty() {
        let mut body = Vec::new();
        for entry in paused.post_data_entries {
            if let Some(bytes) = entry.bytes {
                body.extend(decode_base64(&bytes)?);
            }
        }
        Some(body)
    } else {
        paused.post_data.map(String::into_bytes)
    };

    Ok(InterceptedRequest {
        url: paused.url,
        method: paused.method,
        resource_type,
        headers,
        body,
    })
}

async fn respond(page: &Page, event: &EventRequestPaused, action: InterceptAction) -> Result<()> {
    let id = event.request_id.clone();
    let sent = match action {
        InterceptAction::Block => page
            .execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
            .await
            .map(|_| ()),
        InterceptAction::Continue => page.execute(ContinueRequestParams::new(id)).await.map(|_| ()),
        InterceptAction::Fulfill(response) => {
            page.execute(fulfill_params(id, &response)?).await.map(|_| ())
        }
    };
    sent.map_err(|e| CrawlError::CaptureFailed(e.to_string()))
}

fn fulfill_params(id: fetch::RequestId, response: &LoadedResponse) -> Result<FulfillRequestParams> {
    let headers: Vec<HeaderEntry> = response
        .headers
        .iter()
        .filter(|(name, _)| {
            !STRIPPED_RESPONSE_HEADERS
                .iter()
                .any(|h| name.eq_ignore_ascii_case(h))
        })
        .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone()))
        .collect();

    FulfillRequestParams::builder()
        .request_id(id)
        .response_code(response.status as i64)
        .response_headers(headers)
        .body(encode_base64(&response.body))
        .build()
        .map_err(CrawlError::CaptureFailed)
}

async fn handle_paused(
    page: Page,
    interceptor: Arc<Interceptor>,
    event: Arc<EventRequestPaused>,
    guard: WorkGuard,
) {
    let action = match to_intercepted(&event) {
        Ok(request) => interceptor.handle_tracked(request, guard).await,
        Err(e) => {
            tracing::warn!("could not read paused request {}: {}", event.request.url, e);
            drop(guard);
            InterceptAction::Continue
        }
    };

    if let Err(e) = respond(&page, &event, action).await {
        tracing::debug!("could not resume {}: {}", event.request.url, e);
    }
}

/// Routes every paused request of `page` through the interceptor, one task
/// per event, and dismisses JavaScript dialogs.
async fn attach(page: &Page, interceptor: Arc<Interceptor>) -> Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| CrawlError::Connection(format!("Failed to attach fetch listener: {}", e)))?;
    let mut dialogs = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| CrawlError::Connection(format!("Failed to attach dialog listener: {}", e)))?;

    page.execute(fetch::EnableParams::default())
        .await
        .map_err(|e| CrawlError::Connection(format!("Failed to enable Fetch domain: {}", e)))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = paused.next() => {
                    // Counted before the hand-off so quiescence sees it.
                    let guard = interceptor.track();
                    tokio::spawn(handle_paused(page.clone(), interceptor.clone(), event, guard));
                }
                Some(dialog) = dialogs.next() => {
                    tracing::debug!("dismissing {:?} dialog: {}", dialog.r#type, dialog.message);
                    if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(false)).await {
                        tracing::debug!("failed to dismiss dialog: {}", e);
                    }
                }
                else => break,
            }
        }
    }))
}

async fn prepare(
    page: &Page,
    scripts: &[String],
    interceptor: Arc<Interceptor>,
) -> Result<JoinHandle<()>> {
    for script in scripts {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
            .await
            .map_err(|e| CrawlError::Connection(format!("Failed to inject script: {}", e)))?;
    }
    attach(page, interceptor).await
}

pub struct ChromeTab {
    page: Page,
    url: String,
    listener: JoinHandle<()>,
}

impl ChromeTab {
    /// Prepares `page` (scripts, interception) and starts navigating to `url`.
    pub(crate) async fn open(
        page: Page,
        url: &str,
        scripts: &[String],
        interceptor: Arc<Interceptor>,
        slow_motion: Option<Duration>,
    ) -> Result<Self> {
        let navigate = match NavigateParams::builder().url(url).build() {
            Ok(navigate) => navigate,
            Err(e) => {
                let _ = page.close().await;
                return Err(CrawlError::General(e));
            }
        };

        let listener = match prepare(&page, scripts, interceptor).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = page.close().await;
                return Err(e);
            }
        };

        if let Some(delay) = slow_motion {
            tokio::time::sleep(delay).await;
        }

        if let Err(e) = page.execute(navigate).await {
            listener.abort();
            let _ = page.close().await;
            return Err(CrawlError::NetworkError(format!(
                "Failed to navigate to {}: {}",
                url, e
            )));
        }

        Ok(Self {
            page,
            url: url.to_string(),
            listener,
        })
    }
}

#[async_trait::async_trait]
impl TabHandle for ChromeTab {
    async fn settle(&mut self) -> Result<Vec<String>> {
        if let Err(e) = self.page.wait_for_navigation().await {
            tracing::debug!("navigation of {} did not complete: {}", self.url, e);
        }
        tokio::time::sleep(Duration::from_millis(ms::NETWORK_QUIET)).await;

        let links: Vec<String> = self
            .page
            .evaluate(COLLECT_LINKS)
            .await
            .map_err(|e| CrawlError::General(format!("Failed to collect links: {}", e)))?
            .into_value()
            .map_err(|e| CrawlError::General(format!("Failed to read links: {}", e)))?;

        tracing::debug!("{} links on {}", links.len(), self.url);
        Ok(links)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromeTab {
            page,
            url,
            listener,
        } = *self;
        listener.abort();
        page.close()
            .await
            .map_err(|e| CrawlError::General(format!("Failed to close tab {}: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_request_view_reads_post_entries() {
        let raw = serde_json::json!({
            "url": "http://example.com/api",
            "method": "POST",
            "headers": {"Content-Type": "application/json"},
            "postDataEntries": [{"bytes": "eyJhIjox"}, {"bytes": "fQ=="}],
            "initialPriority": "High",
            "referrerPolicy": "no-referrer"
        });
        let paused: PausedRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(paused.method, "POST");
        assert_eq!(paused.post_data_entries.len(), 2);
    }

    #[test]
    fn test_fulfill_strips_transport_headers() {
        let response = LoadedResponse {
            status: 200,
            headers: vec![
                ("Content-Type".into(), "text/html".into()),
                ("Transfer-Encoding".into(), "chunked".into()),
                ("Content-Encoding".into(), "gzip".into()),
            ],
            body: b"ok".to_vec(),
        };
        let params = fulfill_params(fetch::RequestId::new("r1"), &response).unwrap();
        let headers = params.response_headers.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, "Content-Type");
        assert_eq!(params.response_code, 200);
    }
}
