use crate::chrome::{ChromeDriver, HttpLoader};
use crate::config::Config;
use crate::crawler::driver::{BrowserDriver, ResponseLoader};
use crate::crawler::frontier::Frontier;
use crate::crawler::interceptor::Interceptor;
use crate::crawler::models::{SourceKind, UrlInfo};
use crate::crawler::normalize::normalize_url;
use crate::crawler::pipeline::{NormalizationStage, exchange_channel};
use crate::crawler::pool::{TabContext, TabPool};
use crate::crawler::quiescence::{CrawlState, DrainStage, QuiescenceDetector};
use crate::crawler::scope::Scope;
use crate::crawler::sink::ResultSink;
use crate::inject::{LoginAuto, ScriptSet};
use crate::known_paths::{HttpKnownPaths, KnownPaths};
use crate::output::{CrawlReport, CrawlResults, FileResultWriter, ResultWriter};
use crate::timeouts::secs;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One crawl of one target, from the first tab to the final flush.
pub struct CrawlSession {
    target: String,
    config: Config,
    driver: Arc<dyn BrowserDriver>,
    loader: Arc<dyn ResponseLoader>,
    writer: Box<dyn ResultWriter>,
    known_paths: Option<Arc<dyn KnownPaths>>,
    detector: QuiescenceDetector,
}

impl CrawlSession {
    pub fn new(
        target: &str,
        config: Config,
        driver: Arc<dyn BrowserDriver>,
        loader: Arc<dyn ResponseLoader>,
        writer: Box<dyn ResultWriter>,
    ) -> Result<Self> {
        let target = normalize_url(target)?;
        Ok(Self {
            target,
            config,
            driver,
            loader,
            writer,
            known_paths: None,
            detector: QuiescenceDetector::new(),
        })
    }

    pub fn with_known_paths(mut self, known_paths: Arc<dyn KnownPaths>) -> Self {
        self.known_paths = Some(known_paths);
        self
    }

    /// Starts Chrome and wires the default collaborators from `config`.
    pub async fn launch(target: &str, config: Config) -> Result<Self> {
        let scripts = ScriptSet::load(&config.inject)?;
        let login = LoginAuto::init(&config.login);
        let scripts = scripts.with_login(login);

        let driver = tokio::time::timeout(
            config.browser.launch_timeout(),
            ChromeDriver::launch(&config, scripts),
        )
        .await
        .map_err(|_| {
            CrawlError::LaunchFailed(format!(
                "browser did not start within {}s",
                config.browser.launch_timeout_secs
            ))
        })??;

        let loader = HttpLoader::new(&config.network)?;
        let known_paths = HttpKnownPaths::new(config.network.proxy.as_deref())?;
        let writer = FileResultWriter::from_config(&config.output);

        Ok(Self::new(
            target,
            config,
            Arc::new(driver),
            Arc::new(loader),
            Box::new(writer),
        )?
        .with_known_paths(Arc::new(known_paths)))
    }

    pub fn state(&self) -> CrawlState {
        self.detector.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlState> {
        self.detector.subscribe()
    }

    pub async fn run(self) -> Result<CrawlReport> {
        let scope = Arc::new(Scope::new(&self.target, &self.config.filters)?);
        let frontier = Arc::new(Frontier::new(
            self.detector.dispatch(),
            self.config.crawl.max_urls,
        ));
        let sink = Arc::new(ResultSink::new());
        let mut results = CrawlResults::new(&self.target);

        let (exchanges, rx) = exchange_channel();
        let interceptor = Arc::new(Interceptor::new(
            scope.clone(),
            self.loader.clone(),
            self.detector.normalize(),
            exchanges,
            self.config.filters.max_body_size,
        ));
        let normalization =
            NormalizationStage::new(frontier.clone(), sink.clone(), scope.clone()).spawn(rx);

        let pool = Arc::new(TabPool::new(
            self.config.crawl.tab_pool_size,
            self.detector.tabs(),
            TabContext {
                driver: self.driver.clone(),
                interceptor,
                frontier: frontier.clone(),
                scope: scope.clone(),
                tab_timeout: self.config.browser.tab_timeout(),
            },
        ));

        tracing::info!(
            "crawling {} with {} tabs",
            self.target,
            pool.capacity()
        );

        self.seed_known_paths(&frontier, &scope);

        frontier.mark_seen(&self.target).await;
        let entry_tab = pool.submit(UrlInfo::entry(&self.target)).await?;
        let dispatcher = spawn_dispatcher(frontier.clone(), pool.clone());

        if let Err(e) = entry_tab.await {
            tracing::error!("entry tab worker failed: {}", e);
        }

        if self.config.dev {
            tracing::warn!("dev mode: shutdown disabled, interrupt to exit");
            futures::future::pending::<()>().await;
        }

        self.detector.begin_draining()?;

        self.detector.wait_all_clear().await;
        frontier.close().await;
        if let Err(e) = dispatcher.await {
            tracing::error!("dispatcher failed: {}", e);
        }
        tracing::debug!("frontier drained");
        self.detector.advance(DrainStage::FrontierEmpty)?;

        self.detector.tabs().wait().await;
        tracing::debug!("tab workers finished");
        self.detector.advance(DrainStage::TabsDrained)?;

        pool.release().await;
        tracing::debug!("tab pool released");
        self.detector.advance(DrainStage::PoolReleased)?;

        match tokio::time::timeout(Duration::from_secs(secs::BROWSER_CLOSE), self.driver.close())
            .await
        {
            Ok(Ok(())) => tracing::debug!("browser closed"),
            Ok(Err(e)) => tracing::error!("failed to close browser: {}", e),
            Err(_) => tracing::error!("browser did not close within {}s", secs::BROWSER_CLOSE),
        }
        self.detector.advance(DrainStage::BrowserClosed)?;

        let stats = normalization.close().await;
        self.detector.normalize().wait().await;
        tracing::debug!(
            recorded = stats.recorded,
            duplicates = stats.duplicates,
            "normalization drained"
        );
        self.detector.advance(DrainStage::NormalizationDrained)?;

        results.pages_visited = pool.visited().await.len();
        results.finished_at = Some(Utc::now());
        let exchanges = sink.flush(self.writer.as_ref(), results).await?;
        tracing::debug!("results flushed");
        self.detector.advance(DrainStage::ResultsFlushed)?;

        self.detector.terminate()?;

        Ok(CrawlReport {
            target: self.target.clone(),
            pages_visited: pool.visited().await.len(),
            exchanges,
            output: self.writer.location().map(|p| p.to_path_buf()),
        })
    }

    fn seed_known_paths(&self, frontier: &Arc<Frontier>, scope: &Arc<Scope>) {
        let Some(known_paths) = self.known_paths.clone() else {
            return;
        };

        let guard = self.detector.dispatch().add();
        let frontier = frontier.clone();
        let scope = scope.clone();
        let target = self.target.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let urls = match tokio::time::timeout(
                Duration::from_secs(secs::KNOWN_PATHS),
                known_paths.request(&target),
            )
            .await
            {
                Ok(Ok(urls)) => urls,
                Ok(Err(e)) => {
                    tracing::error!("known paths lookup failed: {}", e);
                    return;
                }
                Err(_) => {
                    tracing::error!("known paths lookup timed out");
                    return;
                }
            };

            for path in urls {
                if scope.is_navigable(&path.url) {
                    let entry = UrlInfo::discovered(path.url, SourceKind::StaticPath, &target)
                        .with_match(path.pattern);
                    frontier.push(entry).await;
                }
            }
        });
    }
}

fn spawn_dispatcher(frontier: Arc<Frontier>, pool: Arc<TabPool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(claimed) = frontier.pop().await {
            let (entry, guard) = claimed.into_parts();
            if let Err(e) = pool.submit(entry).await {
                tracing::warn!("could not dispatch tab: {}", e);
            }
            // The tab worker holds its own guard from here on.
            drop(guard);
        }
    })
}
