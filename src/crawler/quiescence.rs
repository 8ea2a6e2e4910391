use crate::{CrawlError, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Frontier entries queued or claimed but not yet handed to a tab.
    Dispatch,
    /// Tab workers holding a pool slot.
    Tabs,
    /// Captured exchanges not yet normalized.
    Normalize,
}

impl WorkKind {
    fn index(self) -> usize {
        match self {
            Self::Dispatch => 0,
            Self::Tabs => 1,
            Self::Normalize => 2,
        }
    }
}

/// Outstanding-work counters shared by every subsystem of one crawl.
///
/// Work handed from one stage to another must acquire the downstream guard
/// before dropping the upstream one, so `total` only reaches zero once no
/// stage can produce more work.
#[derive(Debug, Default)]
pub struct WorkTracker {
    total: AtomicUsize,
    counts: [AtomicUsize; 3],
    notify: Notify,
}

impl WorkTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn group(self: &Arc<Self>, kind: WorkKind) -> WorkGroup {
        WorkGroup {
            tracker: self.clone(),
            kind,
        }
    }

    pub fn pending(&self, kind: WorkKind) -> usize {
        self.counts[kind.index()].load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self, kind: WorkKind) {
        self.wait_until(|t| t.pending(kind) == 0).await
    }

    pub async fn wait_all_clear(&self) {
        self.wait_until(|t| t.outstanding() == 0).await
    }

    async fn wait_until<F>(&self, done: F)
    where
        F: Fn(&Self) -> bool,
    {
        loop {
            let notified = self.notify.notified();
            if done(self) {
                return;
            }
            notified.await;
        }
    }

    fn acquire(&self, kind: WorkKind) {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.counts[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, kind: WorkKind) {
        self.counts[kind.index()].fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Handle onto one counter of a [`WorkTracker`].
#[derive(Debug, Clone)]
pub struct WorkGroup {
    tracker: Arc<WorkTracker>,
    kind: WorkKind,
}

impl WorkGroup {
    pub fn add(&self) -> WorkGuard {
        self.tracker.acquire(self.kind);
        WorkGuard {
            tracker: self.tracker.clone(),
            kind: self.kind,
        }
    }

    pub fn pending(&self) -> usize {
        self.tracker.pending(self.kind)
    }

    pub async fn wait(&self) {
        self.tracker.wait_idle(self.kind).await
    }
}

/// One unit of outstanding work; released on drop, including during unwinding.
#[must_use = "dropping the guard immediately marks the work as done"]
#[derive(Debug)]
pub struct WorkGuard {
    tracker: Arc<WorkTracker>,
    kind: WorkKind,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.tracker.release(self.kind);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrainStage {
    FrontierEmpty,
    TabsDrained,
    PoolReleased,
    BrowserClosed,
    NormalizationDrained,
    ResultsFlushed,
}

impl DrainStage {
    pub const SEQUENCE: [DrainStage; 6] = [
        Self::FrontierEmpty,
        Self::TabsDrained,
        Self::PoolReleased,
        Self::BrowserClosed,
        Self::NormalizationDrained,
        Self::ResultsFlushed,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Running,
    /// Draining; holds the last stage that completed, if any.
    Draining(Option<DrainStage>),
    Terminated,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining(None) => write!(f, "draining"),
            Self::Draining(Some(stage)) => write!(f, "draining ({:?})", stage),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Crawl completion state machine: `Running` → `Draining` through each
/// [`DrainStage`] in order → `Terminated`.
pub struct QuiescenceDetector {
    tracker: Arc<WorkTracker>,
    state: watch::Sender<CrawlState>,
}

impl Default for QuiescenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QuiescenceDetector {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CrawlState::Running);
        Self {
            tracker: WorkTracker::new(),
            state,
        }
    }

    pub fn dispatch(&self) -> WorkGroup {
        self.tracker.group(WorkKind::Dispatch)
    }

    pub fn tabs(&self) -> WorkGroup {
        self.tracker.group(WorkKind::Tabs)
    }

    pub fn normalize(&self) -> WorkGroup {
        self.tracker.group(WorkKind::Normalize)
    }

    pub fn state(&self) -> CrawlState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlState> {
        self.state.subscribe()
    }

    pub fn begin_draining(&self) -> Result<()> {
        match self.state() {
            CrawlState::Running => {
                self.state.send_replace(CrawlState::Draining(None));
                tracing::debug!("crawl draining");
                Ok(())
            }
            other => Err(CrawlError::General(format!(
                "cannot start draining from state {}",
                other
            ))),
        }
    }

    /// Records completion of `stage`, which must be the next one in sequence.
    pub fn advance(&self, stage: DrainStage) -> Result<()> {
        let expected = match self.state() {
            CrawlState::Draining(None) => Some(DrainStage::SEQUENCE[0]),
            CrawlState::Draining(Some(last)) => DrainStage::SEQUENCE
                .iter()
                .position(|s| *s == last)
                .and_then(|i| DrainStage::SEQUENCE.get(i + 1).copied()),
            _ => None,
        };

        if expected != Some(stage) {
            return Err(CrawlError::General(format!(
                "out-of-order drain stage {:?} in state {}",
                stage,
                self.state()
            )));
        }

        self.state.send_replace(CrawlState::Draining(Some(stage)));
        tracing::debug!(?stage, "drain stage complete");
        Ok(())
    }

    pub fn terminate(&self) -> Result<()> {
        if self.state() != CrawlState::Draining(Some(DrainStage::ResultsFlushed)) {
            return Err(CrawlError::General(format!(
                "cannot terminate from state {}",
                self.state()
            )));
        }
        self.state.send_replace(CrawlState::Terminated);
        Ok(())
    }

    /// Resolves once no subsystem holds outstanding work.
    pub async fn wait_all_clear(&self) {
        self.tracker.wait_all_clear().await
    }
}
