use crate::crawler::frontier::Frontier;
use crate::crawler::links::extract_links;
use crate::crawler::models::{CapturedExchange, SourceKind, UrlInfo};
use crate::crawler::normalize::exchange_signature;
use crate::crawler::quiescence::WorkGuard;
use crate::crawler::scope::Scope;
use crate::crawler::sink::ResultSink;
use crate::utils::decode_base64;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A captured exchange on its way to normalization. The guard keeps the
/// exchange counted as outstanding work until it has been processed.
#[derive(Debug)]
pub struct PendingExchange {
    pub exchange: CapturedExchange,
    pub guard: WorkGuard,
}

pub type ExchangeSender = mpsc::UnboundedSender<PendingExchange>;
pub type ExchangeReceiver = mpsc::UnboundedReceiver<PendingExchange>;

pub fn exchange_channel() -> (ExchangeSender, ExchangeReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub processed: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub discovered: usize,
}

/// Handle to a running normalization stage.
pub struct NormalizationHandle {
    close: oneshot::Sender<()>,
    task: JoinHandle<NormalizeStats>,
}

impl NormalizationHandle {
    /// Stops accepting new exchanges, drains what is already queued and
    /// waits for the stage to finish.
    pub async fn close(self) -> NormalizeStats {
        let _ = self.close.send(());
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("normalization stage failed: {}", e);
                NormalizeStats::default()
            }
        }
    }
}

/// Dedups captured exchanges into the result sink and feeds newly seen
/// navigation targets back into the frontier.
pub struct NormalizationStage {
    frontier: Arc<Frontier>,
    sink: Arc<ResultSink>,
    scope: Arc<Scope>,
    seen: HashSet<String>,
    stats: NormalizeStats,
}

impl NormalizationStage {
    pub fn new(frontier: Arc<Frontier>, sink: Arc<ResultSink>, scope: Arc<Scope>) -> Self {
        Self {
            frontier,
            sink,
            scope,
            seen: HashSet::new(),
            stats: NormalizeStats::default(),
        }
    }

    pub fn spawn(mut self, mut rx: ExchangeReceiver) -> NormalizationHandle {
        let (close, mut close_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    pending = rx.recv() => match pending {
                        Some(pending) => self.process(pending).await,
                        None => break,
                    },
                    _ = &mut close_rx => {
                        rx.close();
                        while let Some(pending) = rx.recv().await {
                            self.process(pending).await;
                        }
                        break;
                    }
                }
            }
            tracing::debug!(stats = ?self.stats, "normalization stage finished");
            self.stats
        });

        NormalizationHandle { close, task }
    }

    pub async fn process(&mut self, pending: PendingExchange) {
        let PendingExchange { exchange, guard } = pending;
        self.stats.processed += 1;

        if !self.seen.insert(exchange_signature(&exchange)) {
            self.stats.duplicates += 1;
            return;
        }

        self.discover(&exchange).await;

        if self.sink.push(exchange).await {
            self.stats.recorded += 1;
        }

        // Frontier pushes above already hold their own dispatch guards.
        drop(guard);
    }

    async fn discover(&mut self, exchange: &CapturedExchange) {
        if !exchange.is_html() {
            return;
        }

        if exchange.method.eq_ignore_ascii_case("GET")
            && (200..300).contains(&exchange.status)
            && self.scope.is_navigable(&exchange.url)
        {
            let entry = UrlInfo::discovered(&exchange.url, SourceKind::Document, &exchange.url);
            if self.frontier.push(entry).await {
                self.stats.discovered += 1;
            }
        }

        let body = match decode_base64(&exchange.response_body) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("skipping link extraction for {}: {}", exchange.url, e);
                return;
            }
        };
        let html = String::from_utf8_lossy(&body);

        for link in extract_links(&html, &exchange.url) {
            if !self.scope.is_navigable(&link) {
                continue;
            }
            let entry = UrlInfo::discovered(link, SourceKind::PageLink, &exchange.url);
            if self.frontier.push(entry).await {
                self.stats.discovered += 1;
            }
        }
    }
}
