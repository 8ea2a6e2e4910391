use crate::config::{Config, ConfigOverrides, OutputFormat};
use crate::crawler::CrawlSession;
use crate::output::{print_output, text};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "browser-crawler")]
#[command(version, about = "Headless-browser crawler")]
#[command(
    long_about = "Drives Chrome through a target site, follows every in-scope link and records each HTTP exchange the pages make"
)]
pub struct Cli {
    /// Entry URL; its hostname defines the crawl scope
    pub target: String,

    #[arg(long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Where to write the captured exchanges")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, help = "Output format")]
    pub format: Option<OutputFormat>,

    #[arg(long, help = "Print the summary as JSON")]
    pub json: bool,

    #[arg(long, help = "Run Chrome in headless mode")]
    pub headless: Option<bool>,

    #[arg(long, env = "CRAWLER_TAB_POOL", help = "Number of concurrent tabs")]
    pub tab_pool: Option<usize>,

    #[arg(long, help = "Seconds a tab may take to settle")]
    pub tab_timeout: Option<u64>,

    #[arg(long, help = "Seconds to wait for Chrome to start")]
    pub launch_timeout: Option<u64>,

    #[arg(long, env = "CRAWLER_PROXY", help = "Proxy URL for the browser and loader")]
    pub proxy: Option<String>,

    #[arg(long, help = "Delay before each navigation in visible mode (ms)")]
    pub slow_motion: Option<u64>,

    #[arg(long, help = "Path to Chrome executable")]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, help = "Keep the browser open and never finish (debugging)")]
    pub dev: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            launch_timeout: self.launch_timeout,
            tab_timeout: self.tab_timeout,
            slow_motion_ms: self.slow_motion,
            tab_pool_size: self.tab_pool,
            proxy: self.proxy.clone(),
            output: self.output.clone(),
            format: self.format,
            dev: self.dev,
        }
    }
}

pub async fn run() -> crate::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let config = config.load_with_overrides(cli.overrides());
    config.validate()?;

    if config.dev {
        eprintln!(
            "{}",
            text::warning("Dev mode: the crawl will not finish on its own, press Ctrl+C to stop")
        );
    }

    let session = CrawlSession::launch(&cli.target, config).await?;
    let report = session.run().await?;

    print_output(&report, cli.json, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["browser-crawler", "http://example.com"]).unwrap();
        assert_eq!(cli.target, "http://example.com");
        assert!(!cli.dev);
        assert!(cli.format.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::try_parse_from([
            "browser-crawler",
            "http://example.com",
            "--tab-pool",
            "2",
            "--tab-timeout",
            "5",
            "--format",
            "ndjson",
            "--headless",
            "false",
            "--dev",
        ])
        .unwrap();

        let config = Config::default().load_with_overrides(cli.overrides());
        assert_eq!(config.crawl.tab_pool_size, 2);
        assert_eq!(config.browser.tab_timeout_secs, 5);
        assert_eq!(config.output.format, OutputFormat::Ndjson);
        assert!(!config.browser.headless);
        assert!(config.dev);
    }

    #[test]
    fn test_target_is_required() {
        assert!(Cli::try_parse_from(["browser-crawler"]).is_err());
    }
}
