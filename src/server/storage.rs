use std::path::{Component, Path};

use axum::extract::multipart::Field;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::server::api::{ApiError, ApiResult};

/// Create the upload and processed directories if they are missing
pub async fn ensure_directories(storage: &StorageConfig) -> Result<()> {
    for dir in [&storage.upload_dir, &storage.processed_dir] {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            info!("Creating directory {}", dir.display());
        }
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Reduce a client-supplied upload name to its final path component
///
/// Directory parts are dropped; names that reduce to nothing are rejected.
pub fn upload_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Accept `name` only if it is a single, normal path component
pub fn plain_file_name(name: &str) -> Option<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name && !name.contains('\\') => Some(name),
        _ => None,
    }
}

/// Stream one multipart field into `path`, replacing any existing file
pub async fn save_field(field: &mut Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        ApiError::internal(format!("Could not store upload: {e}"))
    })?;

    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        file.write_all(&chunk).await.map_err(|e| {
            ApiError::internal(format!("Could not store upload: {e}"))
        })?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| ApiError::internal(format!("Could not store upload: {e}")))?;
    debug!("Stored {} bytes at {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_upload_file_name() {
        assert_eq!(upload_file_name("clip.mp4").as_deref(), Some("clip.mp4"));
        assert_eq!(upload_file_name("../../etc/clip.mp4").as_deref(), Some("clip.mp4"));
        assert_eq!(upload_file_name("C:\\Users\\me\\clip.mov").as_deref(), Some("clip.mov"));
        assert_eq!(upload_file_name(""), None);
        assert_eq!(upload_file_name("uploads/"), None);
        assert_eq!(upload_file_name(".."), None);
    }

    #[test]
    fn test_plain_file_name() {
        assert_eq!(plain_file_name("clip.mp4_enhanced.avi"), Some("clip.mp4_enhanced.avi"));
        assert_eq!(plain_file_name("../secret"), None);
        assert_eq!(plain_file_name("nested/clip.avi"), None);
        assert_eq!(plain_file_name("/etc/passwd"), None);
        assert_eq!(plain_file_name(".."), None);
        assert_eq!(plain_file_name(""), None);
    }

    #[tokio::test]
    async fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig {
            upload_dir: dir.path().join("uploads"),
            processed_dir: dir.path().join("nested").join("processed"),
            ..StorageConfig::default()
        };

        ensure_directories(&storage).await.unwrap();
        assert!(storage.upload_dir.is_dir());
        assert!(storage.processed_dir.is_dir());

        // Existing directories are left alone
        ensure_directories(&storage).await.unwrap();
    }
}
