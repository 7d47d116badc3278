// ABOUTME: Local filesystem byte store for uploaded deliverables and archive files
// ABOUTME: Streams into a staging file with SHA-256 and size tracking, promoted when the ledger records it

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    max_bytes: u64,
}

impl BlobStore {
    pub async fn open(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("staging")).await?;
        fs::create_dir_all(root.join("objects")).await?;
        Ok(Self { root, max_bytes })
    }

    pub async fn begin(&self) -> Result<BlobWriter> {
        let path = self
            .root
            .join("staging")
            .join(format!("{}.part", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok(BlobWriter {
            file: Some(file),
            path,
            hasher: Sha256::new(),
            size: 0,
            limit: self.max_bytes,
            finished: false,
        })
    }

    fn object_path(&self, blob_key: &str) -> PathBuf {
        self.root.join("objects").join(blob_key)
    }

    /// Moves a staged upload under its final key.
    pub async fn promote(&self, mut staged: StagedBlob, blob_key: &str) -> Result<()> {
        fs::rename(&staged.path, self.object_path(blob_key)).await?;
        staged.kept = true;
        tracing::debug!(blob_key, size = staged.size_bytes, "blob promoted");
        Ok(())
    }

    pub async fn remove(&self, blob_key: &str) -> Result<()> {
        match fs::remove_file(self.object_path(blob_key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn exists(&self, blob_key: &str) -> bool {
        fs::try_exists(self.object_path(blob_key)).await.unwrap_or(false)
    }
}

/// In-flight upload. Dropping it before `finish` deletes the partial bytes.
pub struct BlobWriter {
    file: Option<File>,
    path: PathBuf,
    hasher: Sha256,
    size: u64,
    limit: u64,
    finished: bool,
}

impl BlobWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.size += chunk.len() as u64;
        if self.size > self.limit {
            return Err(AppError::Validation(format!(
                "file exceeds the {} MB upload limit",
                self.limit / (1024 * 1024)
            )));
        }
        self.hasher.update(chunk);
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AppError::Internal("blob writer already closed".to_string()))?;
        file.write_all(chunk).await?;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.size
    }

    pub async fn finish(mut self) -> Result<StagedBlob> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.finished = true;
        Ok(StagedBlob {
            path: self.path.clone(),
            sha256: format!("{:x}", self.hasher.clone().finalize()),
            size_bytes: self.size as i64,
            kept: false,
        })
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            discard_path(&self.path);
        }
    }
}

/// Complete upload waiting for its ledger commit. Dropped unpromoted, it is deleted.
#[derive(Debug)]
pub struct StagedBlob {
    path: PathBuf,
    pub sha256: String,
    pub size_bytes: i64,
    kept: bool,
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if !self.kept {
            discard_path(&self.path);
        }
    }
}

fn discard_path(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to discard staged upload: {}", err);
        }
    }
}
