use crate::{CrawlError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::PathBuf;

pub fn find_chrome_executable() -> Result<PathBuf> {
    if let Some(path) = find_in_standard_locations() {
        return Ok(path);
    }

    if let Some(path) = find_in_path() {
        return Ok(path);
    }

    Err(CrawlError::LaunchFailed(
        "Could not find Chrome/Chromium executable. Please specify with --chrome-path".into(),
    ))
}

fn standard_locations() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    }
}

fn find_in_standard_locations() -> Option<PathBuf> {
    standard_locations()
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn find_in_path() -> Option<PathBuf> {
    let binaries = if cfg!(windows) {
        vec!["chrome.exe", "chromium.exe"]
    } else {
        vec!["google-chrome", "chromium", "chromium-browser", "chrome"]
    };

    binaries
        .into_iter()
        .find_map(|binary| which::which(binary).ok())
}

/// Base64 so arbitrary bytes survive JSON output.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| CrawlError::CaptureFailed(format!("invalid base64 payload: {}", e)))
}

pub fn truncate_bytes(data: &[u8], max: usize) -> &[u8] {
    if data.len() > max { &data[..max] } else { data }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let encoded = encode_base64(b"\x00\xffbinary");
        assert_eq!(decode_base64(&encoded).unwrap(), b"\x00\xffbinary");
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(decode_base64("@@not base64@@").is_err());
    }

    #[test]
    fn test_truncate_bytes() {
        assert_eq!(truncate_bytes(b"abcdef", 3), b"abc");
        assert_eq!(truncate_bytes(b"ab", 3), b"ab");
    }
}
