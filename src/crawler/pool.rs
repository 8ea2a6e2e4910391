use crate::config::MAX_TAB_POOL_SIZE;
use crate::crawler::driver::{BrowserDriver, TabHandle};
use crate::crawler::frontier::Frontier;
use crate::crawler::interceptor::Interceptor;
use crate::crawler::models::{SourceKind, UrlInfo};
use crate::crawler::quiescence::{WorkGroup, WorkGuard};
use crate::crawler::scope::Scope;
use crate::{CrawlError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabOutcome {
    Settled { links: usize },
    TimedOut,
    Failed(String),
}

/// Everything a tab worker needs, shared by all workers of one pool.
pub struct TabContext {
    pub driver: Arc<dyn BrowserDriver>,
    pub interceptor: Arc<Interceptor>,
    pub frontier: Arc<Frontier>,
    pub scope: Arc<Scope>,
    pub tab_timeout: Duration,
}

/// Bounded set of browser tabs. Each submitted entry holds one slot from
/// the moment it is accepted until its tab is closed.
pub struct TabPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    tabs: WorkGroup,
    ctx: Arc<TabContext>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl TabPool {
    pub fn new(capacity: usize, tabs: WorkGroup, ctx: TabContext) -> Self {
        let capacity = capacity.clamp(1, MAX_TAB_POOL_SIZE);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            tabs,
            ctx: Arc::new(ctx),
            visited: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Waits for a free slot, then runs the tab for `entry` in the background.
    pub async fn submit(&self, entry: UrlInfo) -> Result<JoinHandle<TabOutcome>> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::PoolReleased)?;
        let guard = self.tabs.add();

        let ctx = self.ctx.clone();
        let visited = self.visited.clone();
        Ok(tokio::spawn(async move {
            run_tab(ctx, visited, entry, permit, guard).await
        }))
    }

    /// Waits for every slot to come back, then refuses further submissions.
    pub async fn release(&self) {
        match self.slots.acquire_many(self.capacity as u32).await {
            Ok(permits) => {
                permits.forget();
                self.slots.close();
            }
            Err(_) => tracing::debug!("tab pool already released"),
        }
    }

    pub async fn visited(&self) -> Vec<String> {
        self.visited.lock().await.clone()
    }
}

async fn run_tab(
    ctx: Arc<TabContext>,
    visited: Arc<Mutex<Vec<String>>>,
    entry: UrlInfo,
    _permit: OwnedSemaphorePermit,
    _guard: WorkGuard,
) -> TabOutcome {
    let deadline = Instant::now() + ctx.tab_timeout;
    tracing::debug!(source = %entry.source_type, "opening tab {}", entry.url);

    // The open runs on its own task so a timeout never drops a half-opened
    // tab. The slot stays held until whatever it yields has been closed.
    let driver = ctx.driver.clone();
    let interceptor = ctx.interceptor.clone();
    let url = entry.url.clone();
    let mut opening = tokio::spawn(async move { driver.open_tab(&url, interceptor).await });

    let mut tab = match timeout_at(deadline, &mut opening).await {
        Ok(Ok(Ok(tab))) => tab,
        Ok(Ok(Err(e))) => {
            tracing::warn!("failed to open tab {}: {}", entry.url, e);
            return TabOutcome::Failed(e.to_string());
        }
        Ok(Err(e)) => return join_failure(e),
        Err(_) => {
            tracing::debug!("tab {} did not open within timeout, closing", entry.url);
            match opening.await {
                Ok(Ok(tab)) => close_tab(tab, &entry.url).await,
                Ok(Err(e)) => tracing::debug!("late open of {} failed: {}", entry.url, e),
                Err(e) => return join_failure(e),
            }
            return TabOutcome::TimedOut;
        }
    };
    visited.lock().await.push(entry.url.clone());

    let outcome = match timeout_at(deadline, tab.settle()).await {
        Ok(Ok(links)) => {
            let count = links.len();
            for link in links {
                if ctx.scope.is_navigable(&link) {
                    ctx.frontier
                        .push(UrlInfo::discovered(link, SourceKind::DomLink, &entry.url))
                        .await;
                }
            }
            TabOutcome::Settled { links: count }
        }
        Ok(Err(e)) => {
            tracing::warn!("tab {} failed to settle: {}", entry.url, e);
            TabOutcome::Failed(e.to_string())
        }
        Err(_) => {
            tracing::debug!("tab {} did not settle, closing", entry.url);
            TabOutcome::TimedOut
        }
    };

    close_tab(tab, &entry.url).await;
    outcome
}

async fn close_tab(tab: Box<dyn TabHandle>, url: &str) {
    if let Err(e) = tab.close().await {
        tracing::warn!("failed to close tab {}: {}", url, e);
    }
}

/// A panic while opening unwinds the worker too, so its slot is released.
fn join_failure(e: JoinError) -> TabOutcome {
    match e.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(e) => TabOutcome::Failed(e.to_string()),
    }
}
