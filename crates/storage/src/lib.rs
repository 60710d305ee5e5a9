use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Extension carried by every blob file on disk.
pub const BLOB_EXTENSION: &str = "enc";

/// Storage trait for opaque blob persistence.
///
/// Blobs are addressed by caller-chosen names. The storage layer never
/// interprets the bytes it holds.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put_blob(&self, name: &str, data: &[u8]) -> Result<()>;
    async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Local filesystem-based storage implementation.
///
/// Each blob lives in a flat directory as `{name}.enc`.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    blobs_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(blobs_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&blobs_dir)
            .with_context(|| format!("Failed to create storage directory {}", blobs_dir.display()))?;

        Ok(Self { blobs_dir })
    }

    pub fn root(&self) -> &Path {
        &self.blobs_dir
    }

    /// Resolve a blob name to its file path.
    ///
    /// Returns `None` for names that are not plain tokens, so no name can
    /// escape the storage directory.
    pub fn blob_path(&self, name: &str) -> Option<PathBuf> {
        let token = normalize_name(name)?;
        Some(self.blobs_dir.join(format!("{}.{}", token, BLOB_EXTENSION)))
    }

    /// Remove a blob file. Returns `false` if it did not exist.
    pub async fn remove_blob(&self, name: &str) -> Result<bool> {
        let Some(path) = self.blob_path(name) else {
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed blob {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove blob {}", name)),
        }
    }

    /// List the names of all blobs currently on disk, sorted.
    pub async fn list_blobs(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.blobs_dir).await
            .context("Failed to read storage directory")?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if normalize_name(stem).is_some() {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Strip an optional `.enc` suffix and reject anything that is not a plain token.
fn normalize_name(name: &str) -> Option<&str> {
    let token = name
        .strip_suffix(BLOB_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(name);

    let valid = !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    valid.then_some(token)
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put_blob(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self
            .blob_path(name)
            .ok_or_else(|| anyhow::anyhow!("Invalid blob name: {:?}", name))?;

        // Exclusive create: an existing blob is never overwritten
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create blob {}", name))?;

        let written: std::io::Result<()> = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(e).with_context(|| format!("Failed to write blob {}", name));
        }

        tracing::debug!("Stored blob {} ({} bytes)", name, data.len());
        Ok(())
    }

    async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.blob_path(name) else {
            return Ok(None);
        };

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read blob {}", name)),
        };

        tracing::debug!("Retrieved blob {} ({} bytes)", name, data.len());
        Ok(Some(data))
    }
}
