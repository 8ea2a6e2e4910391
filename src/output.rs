use crate::config::{OutputConfig, OutputFormat};
use crate::crawler::models::CapturedExchange;
use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait OutputFormatter {
    fn format_text(&self) -> String;
    fn format_json(&self, pretty: bool) -> crate::Result<String>;
}

pub fn print_output<T: OutputFormatter>(
    data: &T,
    as_json: bool,
    json_pretty: bool,
) -> crate::Result<()> {
    let output = if as_json {
        data.format_json(json_pretty)?
    } else {
        data.format_text()
    };

    println!("{}", output);
    Ok(())
}

pub fn to_json<T: Serialize>(data: &T, pretty: bool) -> crate::Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}

/// Everything one crawl run produced, as handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResults {
    pub run_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_visited: usize,
    pub exchanges: Vec<CapturedExchange>,
}

impl CrawlResults {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            started_at: Utc::now(),
            finished_at: None,
            pages_visited: 0,
            exchanges: Vec::new(),
        }
    }
}

/// Header line written before the exchanges in NDJSON output.
#[derive(Serialize)]
struct RunHeader<'a> {
    run_id: &'a str,
    target: &'a str,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    pages_visited: usize,
    exchange_count: usize,
}

pub trait ResultWriter: Send + Sync {
    fn persist(&self, results: &CrawlResults) -> Result<()>;

    fn location(&self) -> Option<&Path> {
        None
    }
}

pub struct FileResultWriter {
    path: PathBuf,
    format: OutputFormat,
    pretty: bool,
}

impl FileResultWriter {
    pub fn new(path: impl Into<PathBuf>, format: OutputFormat, pretty: bool) -> Self {
        Self {
            path: path.into(),
            format,
            pretty,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.path, config.format, config.pretty)
    }

    fn write(&self, results: &CrawlResults) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);

        match self.format {
            OutputFormat::Json if self.pretty => serde_json::to_writer_pretty(&mut writer, results)?,
            OutputFormat::Json => serde_json::to_writer(&mut writer, results)?,
            OutputFormat::Ndjson => {
                let header = RunHeader {
                    run_id: &results.run_id,
                    target: &results.target,
                    started_at: results.started_at,
                    finished_at: results.finished_at,
                    pages_visited: results.pages_visited,
                    exchange_count: results.exchanges.len(),
                };
                serde_json::to_writer(&mut writer, &header)?;
                writeln!(writer)?;
                for exchange in &results.exchanges {
                    serde_json::to_writer(&mut writer, exchange)?;
                    writeln!(writer)?;
                }
            }
        }

        writer.flush()?;
        Ok(())
    }
}

impl ResultWriter for FileResultWriter {
    fn persist(&self, results: &CrawlResults) -> Result<()> {
        self.write(results).map_err(|e| {
            CrawlError::PersistFailed(format!("{}: {}", self.path.display(), e))
        })
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Summary returned once a crawl reaches the terminated state.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub target: String,
    pub pages_visited: usize,
    pub exchanges: usize,
    pub output: Option<PathBuf>,
}

impl OutputFormatter for CrawlReport {
    fn format_text(&self) -> String {
        let mut out = text::success(&format!("Crawled {}", self.target));
        out.push('\n');
        out.push_str(&text::key_value(
            "Pages visited",
            &self.pages_visited.to_string(),
        ));
        out.push('\n');
        out.push_str(&text::key_value(
            "Exchanges recorded",
            &self.exchanges.to_string(),
        ));
        if let Some(ref path) = self.output {
            out.push('\n');
            out.push_str(&text::key_value("Output", &path.display().to_string()));
        }
        out
    }

    fn format_json(&self, pretty: bool) -> crate::Result<String> {
        to_json(self, pretty)
    }
}

pub mod text {
    use colored::Colorize;

    pub fn success(msg: &str) -> String {
        format!("{} {}", "✓".green().bold(), msg)
    }

    pub fn error(msg: &str) -> String {
        format!("{} {}", "✗".red().bold(), msg)
    }

    pub fn warning(msg: &str) -> String {
        format!("{} {}", "⚠".yellow().bold(), msg)
    }

    pub fn key_value(key: &str, value: &str) -> String {
        format!("  {}: {}", key.bold(), value)
    }
}
