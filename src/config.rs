use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::ResizeFilter,
};

/// Environment variable overriding [`StorageConfig::upload_dir`]
pub const UPLOAD_DIR_ENV: &str = "UPLOAD_FOLDER";

/// Environment variable overriding [`StorageConfig::processed_dir`]
pub const PROCESSED_DIR_ENV: &str = "PROCESSED_FOLDER";

/// Main configuration for the video enhancer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Upload staging and processed output directories
    pub storage: StorageConfig,

    /// Frame pipeline settings
    pub enhance: EnhanceConfig,

    /// Remote video info lookup settings
    pub extractor: ExtractorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `UPLOAD_FOLDER` / `PROCESSED_FOLDER` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply directory overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(UPLOAD_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(PROCESSED_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage.processed_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.enhance.validate()?;
        self.extractor.validate()?;
        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: IpAddr,

    /// Port to bind
    pub port: u16,

    /// Largest accepted request body for uploads, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            max_upload_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.max_upload_bytes".to_string(),
                value: self.max_upload_bytes.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Where uploads are staged and processed files are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upload staging directory
    pub upload_dir: PathBuf,

    /// Processed output directory
    pub processed_dir: PathBuf,

    /// Lowercase file extensions accepted by the upload endpoint
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            allowed_extensions: vec!["mp4".to_string(), "avi".to_string(), "mov".to_string()],
        }
    }
}

impl StorageConfig {
    /// Whether `filename` carries one of the allowed extensions
    ///
    /// The extension is whatever follows the last `.`, compared case-insensitively.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.upload_dir".to_string(),
                value: String::new()
            }.into());
        }

        if self.processed_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.processed_dir".to_string(),
                value: String::new()
            }.into());
        }

        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.allowed_extensions".to_string(),
                value: "[]".to_string()
            }.into());
        }

        if let Some(bad) = self.allowed_extensions.iter()
            .find(|ext| ext.is_empty() || ext.contains('.') || ext.to_lowercase() != **ext)
        {
            return Err(ConfigError::InvalidValue {
                key: "storage.allowed_extensions".to_string(),
                value: bad.clone()
            }.into());
        }

        Ok(())
    }
}

/// Frame pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Scaling filter used to stretch frames to the target resolution
    pub filter: ResizeFilter,

    /// ffmpeg executable used by the process backend
    pub ffmpeg_program: String,

    /// ffprobe executable used by the process backend
    pub ffprobe_program: String,

    /// Use libav directly instead of the executables (needs the `ffmpeg` feature)
    pub native: bool,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            filter: ResizeFilter::default(),
            ffmpeg_program: "ffmpeg".to_string(),
            ffprobe_program: "ffprobe".to_string(),
            native: false,
        }
    }
}

impl EnhanceConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_program.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "enhance.ffmpeg_program".to_string(),
                value: self.ffmpeg_program.clone()
            }.into());
        }

        if self.ffprobe_program.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "enhance.ffprobe_program".to_string(),
                value: self.ffprobe_program.clone()
            }.into());
        }

        if self.native && !cfg!(feature = "ffmpeg") {
            return Err(ConfigError::InvalidValue {
                key: "enhance.native".to_string(),
                value: "true (built without the `ffmpeg` feature)".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Remote video info extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// yt-dlp compatible executable
    pub program: String,

    /// Format selector passed with `-f`
    pub format: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "best".to_string(),
        }
    }
}

impl ExtractorConfig {
    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "extractor.program".to_string(),
                value: self.program.clone()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.server.port = 8080;
        original_config.enhance.filter = ResizeFilter::Lanczos3;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.server.port, 8080);
        assert_eq!(loaded_config.enhance.filter, ResizeFilter::Lanczos3);
        assert_eq!(loaded_config.storage.allowed_extensions, original_config.storage.allowed_extensions);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[storage]\nupload_dir = \"/srv/in\"\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.storage.upload_dir, PathBuf::from("/srv/in"));
        assert_eq!(config.storage.processed_dir, PathBuf::from("processed"));
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(
            err,
            crate::EnhancerError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            UPLOAD_DIR_ENV => Some("/data/uploads".to_string()),
            PROCESSED_DIR_ENV => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.storage.upload_dir, PathBuf::from("/data/uploads"));
        assert_eq!(config.storage.processed_dir, PathBuf::from("processed"));
    }

    #[test]
    fn test_allowed_extensions() {
        let storage = StorageConfig::default();
        assert!(storage.is_allowed("clip.mp4"));
        assert!(storage.is_allowed("CLIP.MOV"));
        assert!(storage.is_allowed("archive.tar.avi"));
        assert!(!storage.is_allowed("video.txt"));
        assert!(!storage.is_allowed("video"));
        assert!(!storage.is_allowed("clip.mp4v"));
        assert!(!storage.is_allowed(""));
    }

    #[test]
    fn test_invalid_extension_list() {
        let mut config = Config::default();
        config.storage.allowed_extensions = vec!["MP4".to_string()];
        assert!(config.validate().is_err());

        config.storage.allowed_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_upload_limit() {
        let mut config = Config::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
