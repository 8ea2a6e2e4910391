use crate::Result;
use crate::crawler::interceptor::Interceptor;
use crate::crawler::models::{InterceptedRequest, LoadedResponse};
use std::sync::Arc;

/// Browser-control collaborator: one instance per crawl session.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Opens a tab with `interceptor` hooked into its network traffic, then
    /// starts navigating to `url`.
    async fn open_tab(&self, url: &str, interceptor: Arc<Interceptor>)
    -> Result<Box<dyn TabHandle>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait TabHandle: Send {
    /// Waits for navigation and network activity to quiet down, returning
    /// the links found in the rendered DOM.
    async fn settle(&mut self) -> Result<Vec<String>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Default transport used to replay a captured request and obtain its
/// full response.
#[async_trait::async_trait]
pub trait ResponseLoader: Send + Sync {
    async fn load(&self, request: &InterceptedRequest) -> Result<LoadedResponse>;
}
