//! # Remote video info
//!
//! Resolves a page URL to a direct media link by asking a yt-dlp compatible
//! program. Site-specific scraping is left entirely to that program.

use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ExtractorConfig;
use crate::error::ExtractError;

/// Title reported when the extractor does not provide one
pub const DEFAULT_TITLE: &str = "downloaded_video";

/// Direct link and title of a remote video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub download_url: Option<String>,
    pub title: String,
}

/// Looks up a remote video without downloading it
pub trait InfoExtractor: Send + Sync {
    fn extract(&self, url: &str) -> Result<VideoInfo, ExtractError>;
}

/// Runs `yt-dlp --dump-single-json` and reads `url` and `title` from its output
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
    format: String,
}

impl YtDlpExtractor {
    pub fn new<S: Into<String>>(program: S, format: S) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.program.as_str(), config.format.as_str())
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }
}

impl InfoExtractor for YtDlpExtractor {
    fn extract(&self, url: &str) -> Result<VideoInfo, ExtractError> {
        info!("Fetching video info for {}", url);

        let output = Command::new(&self.program)
            .args(["--dump-single-json", "--skip-download", "--no-warnings", "--no-playlist"])
            .arg("-f")
            .arg(&self.format)
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExtractError::LaunchFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("{} exited with {}", self.program, output.status);
            return Err(ExtractError::ExtractionFailed {
                stderr: if stderr.is_empty() {
                    format!("{} exited with {}", self.program, output.status)
                } else {
                    stderr
                },
            });
        }

        parse_info(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    url: Option<String>,
    title: Option<String>,
}

/// Pick `url` and `title` out of a yt-dlp info JSON document
pub(crate) fn parse_info(json: &[u8]) -> Result<VideoInfo, ExtractError> {
    let raw: RawInfo = serde_json::from_slice(json)
        .map_err(|e| ExtractError::InvalidOutput { reason: e.to_string() })?;

    Ok(VideoInfo {
        download_url: raw.url,
        title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let json = br#"{"id":"abc","title":"Sunset timelapse","url":"https://cdn.example.com/v.mp4","ext":"mp4"}"#;
        let info = parse_info(json).unwrap();
        assert_eq!(info.download_url.as_deref(), Some("https://cdn.example.com/v.mp4"));
        assert_eq!(info.title, "Sunset timelapse");
    }

    #[test]
    fn test_parse_info_defaults() {
        let info = parse_info(br#"{"id":"abc"}"#).unwrap();
        assert_eq!(info.download_url, None);
        assert_eq!(info.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_parse_info_rejects_garbage() {
        assert!(matches!(
            parse_info(b"<html>"),
            Err(ExtractError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn test_missing_program() {
        let extractor = YtDlpExtractor::new("definitely-not-yt-dlp-9f3e", "best");
        assert!(matches!(
            extractor.extract("https://example.com/watch?v=1"),
            Err(ExtractError::LaunchFailed { .. })
        ));
    }
}
