//! # Fact Store
//!
//! Durable key-value facts backing the completion ledger. A fact is either a
//! write-once marker (its existence is the fact) or an append-only record of
//! text lines.
//!
//! Two implementations ship here: [`InMemoryFactStore`] for tests and
//! single-process runs, and [`FileSystemFactStore`], which lays the facts out
//! as plain files under a root directory.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::{LedgerError, LedgerResult};

/// Durable storage for markers and append-only records
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Make sure a namespace (directory) exists before markers are written into it
    async fn ensure_namespace(&self, namespace: &str) -> LedgerResult<()>;

    /// Whether a marker or record exists under `key`
    async fn exists(&self, key: &str) -> LedgerResult<bool>;

    /// Create a marker. Re-creating an existing marker is harmless.
    async fn put_marker(&self, key: &str) -> LedgerResult<()>;

    /// Remove a marker if present
    async fn remove(&self, key: &str) -> LedgerResult<()>;

    /// Append lines to a record, creating it on first use
    async fn append_lines(&self, key: &str, lines: &[String]) -> LedgerResult<()>;

    /// Read all lines of a record. A missing record reads as empty.
    async fn read_lines(&self, key: &str) -> LedgerResult<Vec<String>>;
}

/// Thread-safe in-memory fact store. Clones share the same facts.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFactStore {
    markers: Arc<DashSet<String>>,
    records: Arc<DashMap<String, Vec<String>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn ensure_namespace(&self, _namespace: &str) -> LedgerResult<()> {
        Ok(())
    }

    async fn exists(&self, key: &str) -> LedgerResult<bool> {
        Ok(self.markers.contains(key) || self.records.contains_key(key))
    }

    async fn put_marker(&self, key: &str) -> LedgerResult<()> {
        self.markers.insert(key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> LedgerResult<()> {
        self.markers.remove(key);
        Ok(())
    }

    async fn append_lines(&self, key: &str, lines: &[String]) -> LedgerResult<()> {
        self.records
            .entry(key.to_string())
            .or_default()
            .extend(lines.iter().cloned());
        Ok(())
    }

    async fn read_lines(&self, key: &str) -> LedgerResult<Vec<String>> {
        Ok(self
            .records
            .get(key)
            .map(|lines| lines.value().clone())
            .unwrap_or_default())
    }
}

/// Facts stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FileSystemFactStore {
    root: PathBuf,
}

impl FileSystemFactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn io_error(key: &str, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            key: key.to_string(),
            source,
        }
    }

    async fn ensure_parent(&self, key: &str, path: &Path) -> LedgerResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(key, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FactStore for FileSystemFactStore {
    async fn ensure_namespace(&self, namespace: &str) -> LedgerResult<()> {
        tokio::fs::create_dir_all(self.path_for(namespace))
            .await
            .map_err(|e| Self::io_error(namespace, e))
    }

    async fn exists(&self, key: &str) -> LedgerResult<bool> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| Self::io_error(key, e))
    }

    async fn put_marker(&self, key: &str) -> LedgerResult<()> {
        let path = self.path_for(key);
        self.ensure_parent(key, &path).await?;
        tokio::fs::File::create(&path)
            .await
            .map(|_| ())
            .map_err(|e| Self::io_error(key, e))
    }

    async fn remove(&self, key: &str) -> LedgerResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    async fn append_lines(&self, key: &str, lines: &[String]) -> LedgerResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let path = self.path_for(key);
        self.ensure_parent(key, &path).await?;

        let mut payload = String::new();
        for line in lines {
            payload.push_str(line);
            payload.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Self::io_error(key, e))?;
        file.write_all(payload.as_bytes())
            .await
            .map_err(|e| Self::io_error(key, e))?;
        file.flush().await.map_err(|e| Self::io_error(key, e))
    }

    async fn read_lines(&self, key: &str) -> LedgerResult<Vec<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }
}
