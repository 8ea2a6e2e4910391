use crate::crawler::models::UrlInfo;
use crate::crawler::normalize::normalize_url;
use crate::crawler::quiescence::{WorkGroup, WorkGuard};
use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};

struct Queued {
    entry: UrlInfo,
    guard: WorkGuard,
}

#[derive(Default)]
struct FrontierState {
    queue: VecDeque<Queued>,
    seen: HashSet<String>,
    closed: bool,
}

/// An entry removed from the frontier. It stays counted as dispatch work
/// until the claim is dropped.
pub struct Claimed {
    pub entry: UrlInfo,
    guard: WorkGuard,
}

impl Claimed {
    pub fn into_parts(self) -> (UrlInfo, WorkGuard) {
        (self.entry, self.guard)
    }
}

/// Deduplicated work queue of navigation targets.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    dispatch: WorkGroup,
    max_urls: Option<usize>,
}

impl Frontier {
    pub fn new(dispatch: WorkGroup, max_urls: Option<usize>) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            dispatch,
            max_urls,
        }
    }

    /// Queues `entry` unless its normalized URL was already seen. Returns
    /// whether it was newly added.
    pub async fn push(&self, entry: UrlInfo) -> bool {
        let key = match normalize_url(&entry.url) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("frontier rejected {}: {}", entry.url, e);
                return false;
            }
        };

        let mut state = self.state.lock().await;
        if state.closed {
            tracing::debug!("frontier closed, dropping {}", entry.url);
            return false;
        }
        if let Some(max) = self.max_urls
            && state.seen.len() >= max
        {
            return false;
        }
        if !state.seen.insert(key) {
            return false;
        }

        tracing::debug!(source = %entry.source_type, "queued {}", entry.url);
        state.queue.push_back(Queued {
            entry,
            guard: self.dispatch.add(),
        });
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Records a URL as visited without queueing it.
    pub async fn mark_seen(&self, url: &str) -> bool {
        match normalize_url(url) {
            Ok(key) => self.state.lock().await.seen.insert(key),
            Err(_) => false,
        }
    }

    /// Waits for the next entry; `None` once the frontier is closed and drained.
    pub async fn pop(&self) -> Option<Claimed> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(queued) = state.queue.pop_front() {
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(Claimed {
                        entry: queued.entry,
                        guard: queued.guard,
                    });
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn seen_count(&self) -> usize {
        self.state.lock().await.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::SourceKind;
    use crate::crawler::quiescence::{WorkKind, WorkTracker};
    use std::sync::Arc;
    use std::time::Duration;

    fn frontier() -> (Frontier, Arc<WorkTracker>) {
        let tracker = WorkTracker::new();
        (Frontier::new(tracker.group(WorkKind::Dispatch), None), tracker)
    }

    fn link(url: &str) -> UrlInfo {
        UrlInfo::discovered(url, SourceKind::PageLink, "http://example.com/")
    }

    #[tokio::test]
    async fn test_push_dedups_fragment_and_query_order() {
        let (frontier, _) = frontier();
        assert!(frontier.push(link("http://example.com/a?x=1&y=2")).await);
        assert!(!frontier.push(link("http://example.com/a?y=2&x=1#frag")).await);
        assert!(!frontier.push(link("HTTP://EXAMPLE.com/a?x=1&y=2")).await);
        assert_eq!(frontier.len().await, 1);
    }

    #[tokio::test]
    async fn test_push_rejects_invalid() {
        let (frontier, _) = frontier();
        assert!(!frontier.push(link("javascript:alert(1)")).await);
        assert!(frontier.is_empty().await);
    }

    #[tokio::test]
    async fn test_queued_entries_count_as_dispatch_work() {
        let (frontier, tracker) = frontier();
        frontier.push(link("http://example.com/a")).await;
        frontier.push(link("http://example.com/b")).await;
        assert_eq!(tracker.pending(WorkKind::Dispatch), 2);

        let claimed = frontier.pop().await.unwrap();
        assert_eq!(claimed.entry.url, "http://example.com/a");
        assert_eq!(tracker.pending(WorkKind::Dispatch), 2);
        drop(claimed);
        assert_eq!(tracker.pending(WorkKind::Dispatch), 1);
    }

    #[tokio::test]
    async fn test_pop_blocks_until_push() {
        let (frontier, _) = frontier();
        let frontier = Arc::new(frontier);

        let consumer = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.pop().await.map(|c| c.entry.url) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        frontier.push(link("http://example.com/late")).await;
        let url = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url.as_deref(), Some("http://example.com/late"));
    }

    #[tokio::test]
    async fn test_close_releases_waiting_consumers() {
        let (frontier, _) = frontier();
        let frontier = Arc::new(frontier);

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let frontier = frontier.clone();
                tokio::spawn(async move { frontier.pop().await.is_none() })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        frontier.close().await;
        for consumer in consumers {
            let empty = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .unwrap()
                .unwrap();
            assert!(empty);
        }
        assert!(!frontier.push(link("http://example.com/after")).await);
    }

    #[tokio::test]
    async fn test_close_drains_remaining_entries_first() {
        let (frontier, _) = frontier();
        frontier.push(link("http://example.com/a")).await;
        frontier.close().await;
        assert!(frontier.pop().await.is_some());
        assert!(frontier.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_mark_seen_blocks_later_push() {
        let (frontier, _) = frontier();
        assert!(frontier.mark_seen("http://example.com/#top").await);
        assert!(!frontier.push(link("http://example.com/")).await);
    }

    #[tokio::test]
    async fn test_max_urls_cap() {
        let tracker = WorkTracker::new();
        let frontier = Frontier::new(tracker.group(WorkKind::Dispatch), Some(1));
        assert!(frontier.push(link("http://example.com/a")).await);
        assert!(!frontier.push(link("http://example.com/b")).await);
        assert_eq!(frontier.seen_count().await, 1);
    }

    #[tokio::test]
    async fn test_static_path_keeps_its_pattern() {
        let (frontier, _) = frontier();
        let entry = UrlInfo::discovered(
            "http://example.com/admin/",
            SourceKind::StaticPath,
            "http://example.com/",
        )
        .with_match("Disallow: /admin/");
        assert!(frontier.push(entry).await);

        let claimed = frontier.pop().await.unwrap();
        assert_eq!(claimed.entry.source_type, SourceKind::StaticPath);
        assert_eq!(claimed.entry.matched.as_deref(), Some("Disallow: /admin/"));
    }
}
