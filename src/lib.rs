pub mod chrome;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod inject;
pub mod js_templates;
pub mod known_paths;
pub mod output;
pub mod timeouts;
pub mod utils;

pub use config::{Config, OutputFormat};
pub use error::CrawlError;

pub type Result<T> = std::result::Result<T, CrawlError>;
