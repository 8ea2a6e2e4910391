use crate::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest tab pool a config may ask for.
pub const MAX_TAB_POOL_SIZE: usize = 64;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub inject: InjectConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Skip the shutdown sequence and keep the browser open until interrupted.
    #[serde(default)]
    pub dev: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_tab_timeout")]
    pub tab_timeout_secs: u64,
    #[serde(default)]
    pub slow_motion_ms: u64,
    #[serde(default = "default_true")]
    pub no_sandbox: bool,
    #[serde(default = "default_true")]
    pub ignore_certificate_errors: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    #[serde(default = "default_tab_pool_size")]
    pub tab_pool_size: usize,
    /// Upper bound on distinct URLs accepted into the frontier.
    pub max_urls: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_blocked_resource_types")]
    pub blocked_resource_types: Vec<String>,
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InjectConfig {
    pub scripts_dir: Option<PathBuf>,
    #[serde(default)]
    pub scripts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoginConfig {
    #[serde(default)]
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Ndjson,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub pretty: bool,
}

fn default_headless() -> bool {
    true
}
fn default_true() -> bool {
    true
}
fn default_launch_timeout() -> u64 {
    30
}
fn default_tab_timeout() -> u64 {
    15
}
fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    800
}
fn default_tab_pool_size() -> usize {
    4
}
fn default_max_body_size() -> usize {
    5 * 1024 * 1024
}
fn default_output_path() -> PathBuf {
    PathBuf::from("crawl-results.json")
}

fn default_blocked_resource_types() -> Vec<String> {
    vec!["Font".to_string(), "Image".to_string()]
}

fn default_static_extensions() -> Vec<String> {
    [
        "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp",
        "woff", "woff2", "ttf", "eot", "otf", "mp3", "mp4", "webm", "avi", "mov", "pdf", "zip",
        "gz", "tar", "rar", "7z", "exe", "dmg", "apk", "doc", "docx", "xls", "xlsx", "ppt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: default_headless(),
            launch_timeout_secs: default_launch_timeout(),
            tab_timeout_secs: default_tab_timeout(),
            slow_motion_ms: 0,
            no_sandbox: true,
            ignore_certificate_errors: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn tab_timeout(&self) -> Duration {
        Duration::from_secs(self.tab_timeout_secs)
    }

    pub fn slow_motion(&self) -> Option<Duration> {
        (self.slow_motion_ms > 0).then(|| Duration::from_millis(self.slow_motion_ms))
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            tab_pool_size: default_tab_pool_size(),
            max_urls: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blocked_resource_types: default_blocked_resource_types(),
            static_extensions: default_static_extensions(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: OutputFormat::default(),
            pretty: false,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    default_config_dir().map(|p| p.join("config.toml"))
}

pub fn default_config_dir() -> Result<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|p| p.join("browser-crawler"))
        .ok_or_else(|| CrawlError::ConfigError("Could not determine config directory".into()))
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let global_path = default_config_path()?;
        if global_path.exists() {
            let content = std::fs::read_to_string(&global_path)?;
            config = toml::from_str(&content)?;
        }

        let project_path = PathBuf::from(".browser-crawler.toml");
        if project_path.exists() {
            let content = std::fs::read_to_string(&project_path)?;
            let project: toml::Table = toml::from_str(&content)?;
            config = config.merge(project)?;
        }

        config.load_from_env();

        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.load_from_env();
        Ok(config)
    }

    pub fn load_with_overrides(&self, cli_overrides: ConfigOverrides) -> Self {
        let mut config = self.clone();

        if let Some(headless) = cli_overrides.headless {
            config.browser.headless = headless;
        }
        if let Some(chrome_path) = cli_overrides.chrome_path {
            config.browser.chrome_path = Some(chrome_path);
        }
        if let Some(timeout) = cli_overrides.launch_timeout {
            config.browser.launch_timeout_secs = timeout;
        }
        if let Some(timeout) = cli_overrides.tab_timeout {
            config.browser.tab_timeout_secs = timeout;
        }
        if let Some(slow) = cli_overrides.slow_motion_ms {
            config.browser.slow_motion_ms = slow;
        }
        if let Some(size) = cli_overrides.tab_pool_size {
            config.crawl.tab_pool_size = size;
        }
        if let Some(proxy) = cli_overrides.proxy {
            config.network.proxy = Some(proxy);
        }
        if let Some(path) = cli_overrides.output {
            config.output.path = path;
        }
        if let Some(format) = cli_overrides.format {
            config.output.format = format;
        }
        if cli_overrides.dev {
            config.dev = true;
        }

        config
    }

    /// Overlays the keys present in `project` onto this config. Keys the
    /// project file leaves out keep their current value.
    fn merge(self, project: toml::Table) -> Result<Self> {
        let mut base = match toml::Value::try_from(&self) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(CrawlError::ConfigError("config is not a table".into())),
            Err(e) => return Err(CrawlError::ConfigError(e.to_string())),
        };
        overlay(&mut base, project);
        Ok(toml::Value::Table(base).try_into()?)
    }

    fn load_from_env(&mut self) {
        if let Ok(headless) = std::env::var("CRAWLER_HEADLESS") {
            self.browser.headless = headless == "true" || headless == "1";
        }
        if let Ok(proxy) = std::env::var("CRAWLER_PROXY")
            && !proxy.is_empty()
        {
            self.network.proxy = Some(proxy);
        }
        if let Ok(size) = std::env::var("CRAWLER_TAB_POOL")
            && let Ok(size) = size.parse()
        {
            self.crawl.tab_pool_size = size;
        }
        if let Ok(timeout) = std::env::var("CRAWLER_TAB_TIMEOUT")
            && let Ok(timeout) = timeout.parse()
        {
            self.browser.tab_timeout_secs = timeout;
        }
        if let Ok(path) = std::env::var("CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.crawl.tab_pool_size == 0 || self.crawl.tab_pool_size > MAX_TAB_POOL_SIZE {
            return Err(CrawlError::ConfigError(format!(
                "tab_pool_size must be between 1 and {}",
                MAX_TAB_POOL_SIZE
            )));
        }

        if self.browser.launch_timeout_secs == 0 || self.browser.tab_timeout_secs == 0 {
            return Err(CrawlError::ConfigError(
                "launch_timeout_secs and tab_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref proxy) = self.network.proxy
            && url::Url::parse(proxy).is_err()
        {
            return Err(CrawlError::ConfigError(format!(
                "Proxy is not a valid URL: {}",
                proxy
            )));
        }

        if let Some(ref path) = self.browser.chrome_path
            && !path.exists()
        {
            return Err(CrawlError::ConfigError(format!(
                "Chrome path does not exist: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Headless unless the user asked for a window or dev mode is on.
    pub fn effective_headless(&self) -> bool {
        self.browser.headless && !self.dev
    }
}

fn overlay(base: &mut toml::Table, project: toml::Table) {
    for (key, value) in project {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => overlay(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub headless: Option<bool>,
    pub chrome_path: Option<PathBuf>,
    pub launch_timeout: Option<u64>,
    pub tab_timeout: Option<u64>,
    pub slow_motion_ms: Option<u64>,
    pub tab_pool_size: Option<usize>,
    pub proxy: Option<String>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub dev: bool,
}
