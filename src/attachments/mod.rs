//! Image attachments. Items keep only the public URL.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

static STORAGE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/upload/(?:v\d+/)?(.+)\.[a-zA-Z]+$").expect("valid storage id pattern")
});

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("could not extract storage id from url {0}")]
    PatternMatch(String),
    #[error("unsupported attachment type {0:?}")]
    Unsupported(String),
    #[error("attachment host failure: {0}")]
    Host(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn storage_id_from_url(url: &str) -> Result<String, AttachmentError> {
    STORAGE_ID_PATTERN
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| AttachmentError::PatternMatch(url.to_string()))
}

#[allow(async_fn_in_trait)]
pub trait AttachmentHost {
    /// Stores the file and returns its public URL.
    async fn upload(&self, source: &Path) -> Result<String, AttachmentError>;

    async fn destroy(&self, storage_id: &str) -> Result<(), AttachmentError>;
}

/// Attachment host backed by a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    root: PathBuf,
    public_base: String,
}

impl DirectoryHost {
    pub fn new(root: PathBuf, public_base: Option<String>) -> Self {
        let public_base = public_base
            .unwrap_or_else(|| format!("file://{}", root.display()))
            .trim_end_matches('/')
            .to_string();
        Self { root, public_base }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AttachmentHost for DirectoryHost {
    async fn upload(&self, source: &Path) -> Result<String, AttachmentError> {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| AttachmentError::Unsupported(source.display().to_string()))?;
        let storage_id = Uuid::new_v4().simple().to_string();
        fs::create_dir_all(&self.root)?;
        let target = self.root.join(format!("{storage_id}.{extension}"));
        fs::copy(source, &target)?;
        tracing::debug!(path = %target.display(), "stored attachment");
        let version = OffsetDateTime::now_utc().unix_timestamp();
        Ok(format!(
            "{}/upload/v{version}/{storage_id}.{extension}",
            self.public_base
        ))
    }

    async fn destroy(&self, storage_id: &str) -> Result<(), AttachmentError> {
        let missing = || AttachmentError::Host(format!("no stored file for {storage_id}"));
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(missing()),
            Err(err) => return Err(err.into()),
        };
        let mut removed = false;
        for entry in entries {
            let path = entry?.path();
            if path.file_stem().and_then(|stem| stem.to_str()) == Some(storage_id) {
                fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "removed attachment");
                removed = true;
            }
        }
        if removed {
            Ok(())
        } else {
            Err(missing())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn extracts_storage_id_with_and_without_version() {
        assert_eq!(
            storage_id_from_url("https://cdn.example/img/upload/v1712/folder/cat.png").unwrap(),
            "folder/cat"
        );
        assert_eq!(
            storage_id_from_url("https://cdn.example/img/upload/cat.jpeg").unwrap(),
            "cat"
        );
    }

    #[test]
    fn rejects_urls_without_upload_segment_or_extension() {
        assert_matches!(
            storage_id_from_url("https://cdn.example/img/cat.png"),
            Err(AttachmentError::PatternMatch(_))
        );
        assert_matches!(
            storage_id_from_url("https://cdn.example/upload/v1/cat"),
            Err(AttachmentError::PatternMatch(_))
        );
    }

    #[tokio::test]
    async fn directory_host_round_trips_uploads() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("photo.PNG");
        fs::write(&source, b"png bytes")?;
        let host = DirectoryHost::new(temp.path().join("uploads"), None);

        let url = host.upload(&source).await?;
        let storage_id = storage_id_from_url(&url)?;
        let stored = host.root().join(format!("{storage_id}.png"));
        assert!(stored.exists());

        host.destroy(&storage_id).await?;
        assert!(!stored.exists());
        Ok(())
    }

    #[tokio::test]
    async fn destroy_without_matching_file_is_an_error() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("cat.png");
        fs::write(&source, b"png bytes")?;
        let host = DirectoryHost::new(temp.path().join("uploads"), None);

        assert_matches!(host.destroy("never-stored").await, Err(AttachmentError::Host(_)));

        let url = host.upload(&source).await?;
        assert_matches!(host.destroy("never-stored").await, Err(AttachmentError::Host(_)));
        let storage_id = storage_id_from_url(&url)?;
        host.destroy(&storage_id).await?;
        assert_matches!(host.destroy(&storage_id).await, Err(AttachmentError::Host(_)));
        Ok(())
    }

    #[tokio::test]
    async fn directory_host_rejects_unknown_types() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("notes.txt");
        fs::write(&source, b"text")?;
        let host = DirectoryHost::new(temp.path().join("uploads"), None);
        assert_matches!(
            host.upload(&source).await,
            Err(AttachmentError::Unsupported(_))
        );
        Ok(())
    }
}
