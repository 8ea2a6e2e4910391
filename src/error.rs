use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Known paths lookup failed: {0}")]
    KnownPathsFailed(String),

    #[error("Browser close failed: {0}")]
    BrowserClose(String),

    #[error("Failed to persist results: {0}")]
    PersistFailed(String),

    #[error("Tab pool has been released")]
    PoolReleased,

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("General error: {0}")]
    General(String),
}

impl CrawlError {
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::LaunchFailed(_) => vec![
                "Ensure Chrome/Chromium is installed".into(),
                "Try specifying Chrome path with --chrome-path".into(),
                "Increase --launch-timeout on slow machines".into(),
            ],
            Self::Connection(_) => vec![
                "Check if Chrome was closed manually".into(),
                "Try running again with --verbose".into(),
            ],
            Self::ConfigError(_) | Self::TomlDeError(_) => vec![
                "Check configuration file syntax".into(),
                "Use --config to specify a different config file".into(),
            ],
            Self::InvalidUrl(_) => vec![
                "Ensure URL includes protocol (http:// or https://)".into(),
                "Check for typos in the URL".into(),
            ],
            Self::NetworkError(_) => vec![
                "Check network connectivity".into(),
                "Verify proxy settings if using a proxy".into(),
            ],
            Self::PersistFailed(_) | Self::IoError(_) => vec![
                "Ensure output directory exists and is writable".into(),
            ],
            _ => vec!["Run with --verbose for more details".into()],
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LaunchFailed(_) | Self::Connection(_) => 3,
            Self::IoError(_) | Self::PersistFailed(_) => 6,
            Self::ConfigError(_) | Self::TomlDeError(_) => 7,
            Self::InvalidUrl(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CrawlError::LaunchFailed("x".into()).exit_code(), 3);
        assert_eq!(CrawlError::InvalidUrl("x".into()).exit_code(), 2);
        assert_eq!(CrawlError::ConfigError("x".into()).exit_code(), 7);
        assert_eq!(CrawlError::CaptureFailed("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_launch_failed_has_suggestions() {
        let err = CrawlError::LaunchFailed("boom".into());
        assert!(!err.suggestions().is_empty());
        assert_eq!(err.to_string(), "Failed to launch browser: boom");
    }
}
