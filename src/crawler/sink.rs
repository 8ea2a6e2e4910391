use crate::crawler::models::CapturedExchange;
use crate::output::{CrawlResults, ResultWriter};
use crate::{CrawlError, Result};
use tokio::sync::Mutex;

#[derive(Default)]
struct SinkState {
    records: Vec<CapturedExchange>,
    sealed: bool,
}

/// Append-only buffer of finished exchanges, persisted once at shutdown.
#[derive(Default)]
pub struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a record. Returns `false` once the sink has been flushed.
    pub async fn push(&self, exchange: CapturedExchange) -> bool {
        let mut state = self.state.lock().await;
        if state.sealed {
            tracing::warn!("result sink already flushed, dropping {}", exchange.url);
            return false;
        }
        state.records.push(exchange);
        true
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_sealed(&self) -> bool {
        self.state.lock().await.sealed
    }

    /// Seals the sink and hands every buffered record to `writer`. Only one
    /// flush is allowed per crawl.
    pub async fn flush(
        &self,
        writer: &dyn ResultWriter,
        mut results: CrawlResults,
    ) -> Result<usize> {
        let records = {
            let mut state = self.state.lock().await;
            if state.sealed {
                return Err(CrawlError::PersistFailed(
                    "result sink was already flushed".into(),
                ));
            }
            state.sealed = true;
            std::mem::take(&mut state.records)
        };

        let count = records.len();
        results.exchanges = records;
        writer.persist(&results)?;
        tracing::debug!("flushed {} exchanges", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::Headers;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemoryWriter {
        written: StdMutex<Vec<CrawlResults>>,
    }

    impl ResultWriter for MemoryWriter {
        fn persist(&self, results: &CrawlResults) -> Result<()> {
            self.written.lock().unwrap().push(results.clone());
            Ok(())
        }
    }

    fn exchange(url: &str) -> CapturedExchange {
        CapturedExchange {
            url: url.to_string(),
            method: "GET".into(),
            host: "example.com".into(),
            headers: Headers::new(),
            data: String::new(),
            response_headers: Headers::new(),
            response_body: String::new(),
            request_str: String::new(),
            status: 200,
            resource_type: "Document".into(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_flush_persists_everything_once() {
        let sink = ResultSink::new();
        assert!(sink.push(exchange("http://example.com/a")).await);
        assert!(sink.push(exchange("http://example.com/b")).await);
        assert_eq!(sink.len().await, 2);

        let writer = MemoryWriter::default();
        let count = sink
            .flush(&writer, CrawlResults::new("http://example.com/"))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let written = writer.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].exchanges[1].url, "http://example.com/b");
    }

    #[tokio::test]
    async fn test_push_after_flush_rejected() {
        let sink = ResultSink::new();
        let writer = MemoryWriter::default();
        sink.flush(&writer, CrawlResults::new("http://example.com/"))
            .await
            .unwrap();

        assert!(sink.is_sealed().await);
        assert!(!sink.push(exchange("http://example.com/late")).await);
        assert!(
            sink.flush(&writer, CrawlResults::new("http://example.com/"))
                .await
                .is_err()
        );
    }
}
