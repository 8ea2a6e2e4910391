use super::tab::ChromeTab;
use crate::config::Config;
use crate::crawler::driver::{BrowserDriver, TabHandle};
use crate::crawler::interceptor::Interceptor;
use crate::inject::ScriptSet;
use crate::timeouts::{ms, secs};
use crate::{CrawlError, Result};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Browser-control collaborator backed by a locally launched Chrome.
pub struct ChromeDriver {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    scripts: ScriptSet,
    slow_motion: Option<Duration>,
}

fn launch_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "--disable-infobars".to_string(),
        "--disable-extensions".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-sync".to_string(),
    ];

    if config.browser.ignore_certificate_errors {
        args.push("--ignore-certificate-errors".to_string());
    }
    if let Some(ref proxy) = config.network.proxy {
        args.push(format!("--proxy-server={}", proxy));
    }
    if let Some(ref ua) = config.network.user_agent {
        args.push(format!("--user-agent={}", ua));
    }

    args
}

impl ChromeDriver {
    pub async fn launch(config: &Config, scripts: ScriptSet) -> Result<Self> {
        let chrome_path = config
            .browser
            .chrome_path
            .clone()
            .map(Ok)
            .unwrap_or_else(crate::utils::find_chrome_executable)?;

        let headless = config.effective_headless();

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .request_timeout(Duration::from_secs(secs::REQUEST))
            .launch_timeout(config.browser.launch_timeout())
            .window_size(config.browser.window_width, config.browser.window_height)
            .incognito()
            .args(launch_args(config));

        if !headless {
            builder = builder.with_head();
        }
        if config.browser.no_sandbox {
            builder = builder.no_sandbox();
        }

        let browser_config = builder.build().map_err(CrawlError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CrawlError::LaunchFailed(e.to_string()))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::info!(
            "launched {} ({})",
            chrome_path.display(),
            if headless { "headless" } else { "visible" }
        );

        // Slow motion only makes sense when someone is watching.
        let slow_motion = if headless {
            None
        } else {
            config.browser.slow_motion()
        };

        Ok(Self {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler)),
            scripts,
            slow_motion,
        })
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open_tab(
        &self,
        url: &str,
        interceptor: Arc<Interceptor>,
    ) -> Result<Box<dyn TabHandle>> {
        let page = {
            let guard = self.browser.read().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| CrawlError::Connection("browser is closed".into()))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| CrawlError::Connection(format!("Failed to open tab: {}", e)))?
        };

        let tab = ChromeTab::open(
            page,
            url,
            self.scripts.scripts(),
            interceptor,
            self.slow_motion,
        )
        .await?;
        Ok(Box::new(tab))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| CrawlError::BrowserClose(e.to_string()));
        if closed.is_ok() {
            let _ = browser.wait().await;
        } else {
            let _ = browser.kill().await;
        }

        tokio::time::sleep(Duration::from_millis(ms::PAGE_CLOSE_SETTLE)).await;
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }

        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_include_proxy_and_defaults() {
        let mut config = Config::default();
        config.network.proxy = Some("http://127.0.0.1:8080".into());
        let args = launch_args(&config);
        assert!(args.contains(&"--disable-infobars".to_string()));
        assert!(args.contains(&"--disable-extensions".to_string()));
        assert!(args.contains(&"--proxy-server=http://127.0.0.1:8080".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
    }

    #[test]
    fn test_launch_args_without_proxy() {
        let mut config = Config::default();
        config.browser.ignore_certificate_errors = false;
        let args = launch_args(&config);
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
        assert!(!args.contains(&"--ignore-certificate-errors".to_string()));
    }
}
