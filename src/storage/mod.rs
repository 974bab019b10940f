// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable single-document JSON namespaces
//!
//! Each namespace is one JSON file. Edits are read-modify-write under an
//! async mutex and land via temp file + rename, so concurrent edits never
//! lose an update and a crash never leaves a half-written document. File
//! I/O after `open` runs on the blocking pool.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{KatalisError, Result};

/// One durable JSON document of type `T`.
pub struct JsonDocument<T> {
    path: Option<PathBuf>,
    cell: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + 'static,
{
    /// Open a file-backed document. A missing or unreadable file yields
    /// `T::default()`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = read_or_default(&path);
        Self {
            path: Some(path),
            cell: Mutex::new(initial),
        }
    }

    /// A document that lives only in memory.
    pub fn in_memory(initial: T) -> Self {
        Self {
            path: None,
            cell: Mutex::new(initial),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Last loaded value without touching disk; `None` while an edit holds
    /// the lock.
    pub fn peek(&self) -> Option<T> {
        self.cell.try_lock().ok().map(|value| value.clone())
    }

    /// Current value, re-read from disk for file-backed documents.
    pub async fn load(&self) -> T {
        let mut cell = self.cell.lock().await;
        if let Some(path) = &self.path {
            match read_blocking(path.clone()).await {
                Ok(value) => *cell = value,
                Err(e) => tracing::warn!("Keeping cached {}: {}", path.display(), e),
            }
        }
        cell.clone()
    }

    /// Atomically apply `edit` and persist the result.
    pub async fn update<F>(&self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let mut cell = self.cell.lock().await;
        let mut next = match &self.path {
            Some(path) => read_blocking(path.clone()).await?,
            None => cell.clone(),
        };
        edit(&mut next);
        if let Some(path) = &self.path {
            let path = path.clone();
            let value = next.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &value))
                .await
                .map_err(|e| KatalisError::Task(e.to_string()))??;
        }
        *cell = next.clone();
        Ok(next)
    }

    /// Replace the document with `T::default()`.
    pub async fn reset(&self) -> Result<T> {
        self.update(|value| *value = T::default()).await
    }
}

async fn read_blocking<T>(path: PathBuf) -> Result<T>
where
    T: DeserializeOwned + Default + Send + 'static,
{
    tokio::task::spawn_blocking(move || read_or_default(&path))
        .await
        .map_err(|e| KatalisError::Task(e.to_string()))
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}, using defaults", path.display(), e);
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Corrupt document {}: {}, using defaults", path.display(), e);
            T::default()
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::open(dir.path().join("c.json"));
        assert_eq!(doc.load().await, Counter::default());
    }

    #[tokio::test]
    async fn test_update_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("c.json");
        let doc: JsonDocument<Counter> = JsonDocument::open(&path);
        doc.update(|c| c.value = 7).await.unwrap();

        let reopened: JsonDocument<Counter> = JsonDocument::open(&path);
        assert_eq!(reopened.load().await.value, 7);
        assert!(!dir.path().join("nested").join("c.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "{not json").unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::open(&path);
        assert_eq!(doc.load().await.value, 0);
        doc.update(|c| c.value += 1).await.unwrap();
        assert_eq!(doc.load().await.value, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let dir = TempDir::new().unwrap();
        let doc: Arc<JsonDocument<Counter>> =
            Arc::new(JsonDocument::open(dir.path().join("c.json")));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                doc.update(|c| c.value += 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(doc.load().await.value, 32);
    }

    #[tokio::test]
    async fn test_in_memory_reset() {
        let doc = JsonDocument::in_memory(Counter { value: 3 });
        assert!(doc.path().is_none());
        assert_eq!(doc.load().await.value, 3);
        doc.reset().await.unwrap();
        assert_eq!(doc.load().await.value, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loads_see_edits_from_other_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        let writer: Arc<JsonDocument<Counter>> = Arc::new(JsonDocument::open(&path));
        let reader: JsonDocument<Counter> = JsonDocument::open(&path);

        let edits = {
            let writer = writer.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    writer.update(|c| c.value += 1).await.unwrap();
                }
            })
        };
        let mut last = 0;
        while !edits.is_finished() {
            let seen = reader.load().await.value;
            assert!(seen >= last, "went back from {} to {}", last, seen);
            last = seen;
            tokio::task::yield_now().await;
        }
        edits.await.unwrap();

        assert_eq!(reader.load().await.value, 20);
        assert_eq!(reader.peek().unwrap().value, 20);
    }
}
