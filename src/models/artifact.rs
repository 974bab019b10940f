// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model artifact resolution and staging

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use super::layout::ArtifactLayout;
use super::staging::{sha256_file, stage_copy, ProgressFn};
use super::validation::{validate_artifact, ArtifactSpec, ArtifactValidation};
use crate::error::{KatalisError, Result};
use crate::hardware::DeviceInfoProvider;

/// Diagnostics view of the artifact state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub active_path: Option<PathBuf>,
    pub manual_override: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub model_found: bool,
    pub is_valid: bool,
}

/// Result of setting or clearing the manual override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OverrideOutcome {
    Cleared,
    Set { path: PathBuf, size_bytes: u64 },
    Rejected { path: PathBuf, validation: ArtifactValidation },
}

/// Locates, validates and stages the model artifact.
///
/// The manager is the only writer of the canonical file. Resolution and
/// staging are serialized so two callers never copy onto the same path.
pub struct ArtifactManager {
    layout: ArtifactLayout,
    spec: ArtifactSpec,
    device: Arc<dyn DeviceInfoProvider>,
    manual_override: RwLock<Option<PathBuf>>,
    staging_lock: Mutex<()>,
    progress: Option<Arc<ProgressFn>>,
}

impl ArtifactManager {
    pub fn new(
        layout: ArtifactLayout,
        spec: ArtifactSpec,
        device: Arc<dyn DeviceInfoProvider>,
    ) -> Self {
        Self {
            layout,
            spec,
            device,
            manual_override: RwLock::new(None),
            staging_lock: Mutex::new(()),
            progress: None,
        }
    }

    /// Report staging progress as `(copied, total)` bytes.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn spec(&self) -> &ArtifactSpec {
        &self.spec
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.layout.canonical_path(&self.spec.file_name)
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.layout.search_paths(&self.spec.file_name)
    }

    pub fn manual_override(&self) -> Option<PathBuf> {
        match self.manual_override.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::warn!("Manual override lock poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn store_override(&self, value: Option<PathBuf>) {
        match self.manual_override.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => {
                tracing::warn!("Manual override lock poisoned, recovering");
                *poisoned.into_inner() = value;
            }
        }
    }

    /// Apply the validation rule to one path.
    pub fn validate(&self, path: &Path) -> ArtifactValidation {
        validate_artifact(path, &self.spec)
    }

    /// Set (or clear with `None`) the manual override. A path that fails
    /// validation is rejected and the previous override is kept.
    pub fn set_manual_override(&self, path: Option<PathBuf>) -> OverrideOutcome {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => absolute(&p),
            _ => {
                self.store_override(None);
                tracing::info!("Manual model path cleared");
                return OverrideOutcome::Cleared;
            }
        };

        match self.validate(&path) {
            ArtifactValidation::Valid { size_bytes } => {
                tracing::info!("Manual model path set to {}", path.display());
                self.store_override(Some(path.clone()));
                OverrideOutcome::Set { path, size_bytes }
            }
            validation => {
                tracing::warn!(
                    "Rejected manual model path {}: {:?}",
                    path.display(),
                    validation.issue()
                );
                OverrideOutcome::Rejected { path, validation }
            }
        }
    }

    /// The path inference would read from right now, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.manual_override().or_else(|| {
            let canonical = self.canonical_path();
            canonical.exists().then_some(canonical)
        })
    }

    pub fn model_info(&self) -> ModelInfo {
        let active_path = self.current_path();
        let model_found = active_path.as_ref().is_some_and(|p| p.exists());
        let is_valid = active_path
            .as_ref()
            .is_some_and(|p| self.validate(p).is_valid());
        ModelInfo {
            active_path,
            manual_override: self.manual_override(),
            search_paths: self.search_paths(),
            model_found,
            is_valid,
        }
    }

    /// Resolve a usable artifact, staging it into the canonical location if
    /// needed. Returns the absolute path inference should load.
    pub async fn ensure_available(&self) -> Result<PathBuf> {
        self.check_memory()?;

        let _guard = self.staging_lock.lock().await;

        if let Some(path) = self.manual_override() {
            return match self.validate_blocking(path.clone()).await? {
                ArtifactValidation::Valid { .. } => {
                    tracing::debug!("Using manual override {}", path.display());
                    Ok(path)
                }
                ArtifactValidation::Invalid { issue } => {
                    Err(KatalisError::ArtifactInvalid { path, issue })
                }
            };
        }

        let canonical = self.canonical_path();
        if self.validate_blocking(canonical.clone()).await?.is_valid() {
            tracing::debug!("Canonical model copy is valid: {}", canonical.display());
            return Ok(canonical);
        }

        let mut sources = self.layout.external_candidates(&self.spec.file_name);
        sources.push(self.layout.bundled_path(&self.spec.file_name));

        for source in sources {
            match self.validate_blocking(source.clone()).await? {
                ArtifactValidation::Valid { size_bytes } => {
                    tracing::info!("Found model at {}", source.display());
                    self.check_storage(size_bytes)?;
                    self.stage(source, canonical.clone()).await?;
                    return match self.validate_blocking(canonical.clone()).await? {
                        ArtifactValidation::Valid { .. } => Ok(canonical),
                        ArtifactValidation::Invalid { issue } => {
                            Err(KatalisError::ArtifactInvalid {
                                path: canonical,
                                issue,
                            })
                        }
                    };
                }
                ArtifactValidation::Invalid { issue } => {
                    tracing::debug!("Skipping {}: {}", source.display(), issue);
                }
            }
        }

        Err(KatalisError::ArtifactNotFound {
            searched: self.search_paths(),
            requirements: self.spec.requirements(),
        })
    }

    /// SHA-256 of a file, computed on the blocking pool.
    pub async fn checksum(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || sha256_file(&path))
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))?
    }

    /// Compare a file against the configured SHA-256. `None` when no
    /// checksum is configured.
    pub async fn verify_checksum(&self, path: &Path) -> Result<Option<bool>> {
        let Some(expected) = self.spec.sha256.clone() else {
            return Ok(None);
        };
        let actual = self.checksum(path).await?;
        Ok(Some(actual.eq_ignore_ascii_case(expected.trim())))
    }

    fn check_memory(&self) -> Result<()> {
        match self.device.available_memory_bytes() {
            Ok(available) if available < self.spec.min_available_memory_bytes => {
                Err(KatalisError::InsufficientMemory {
                    available_bytes: available,
                    required_bytes: self.spec.min_available_memory_bytes,
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Could not read available memory, continuing: {}", e);
                Ok(())
            }
        }
    }

    fn check_storage(&self, required: u64) -> Result<()> {
        match self.device.available_storage_bytes(&self.layout.internal_dir) {
            Ok(available) if available < required => Err(KatalisError::InsufficientStorage {
                available_bytes: available,
                required_bytes: required,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Could not read available storage, continuing: {}", e);
                Ok(())
            }
        }
    }

    async fn validate_blocking(&self, path: PathBuf) -> Result<ArtifactValidation> {
        let spec = self.spec.clone();
        tokio::task::spawn_blocking(move || validate_artifact(&path, &spec))
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))
    }

    async fn stage(&self, source: PathBuf, dest: PathBuf) -> Result<u64> {
        tracing::info!(
            "Staging model from {} to {}",
            source.display(),
            dest.display()
        );
        let progress = self.progress.clone();
        tokio::task::spawn_blocking(move || stage_copy(&source, &dest, progress.as_deref()))
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))?
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::StaticDeviceInfo;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn spec() -> ArtifactSpec {
        ArtifactSpec {
            file_name: "model.task".to_string(),
            min_size_bytes: 1024,
            max_size_bytes: 4096,
            min_available_memory_bytes: GIB,
            ..ArtifactSpec::default()
        }
    }

    fn manager(root: &Path, device: StaticDeviceInfo) -> ArtifactManager {
        ArtifactManager::new(ArtifactLayout::rooted_at(root), spec(), Arc::new(device))
    }

    fn roomy() -> StaticDeviceInfo {
        StaticDeviceInfo::default()
            .with_available_memory(8 * GIB)
            .with_available_storage(64 * GIB)
    }

    fn place(path: &Path, size: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![7u8; size]).unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_memory_fails_before_filesystem_work() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy().with_available_memory(GIB / 2));
        place(&mgr.layout().external_candidates("model.task")[0], 2048);

        let err = mgr.ensure_available().await.unwrap_err();
        assert!(matches!(err, KatalisError::InsufficientMemory { .. }));
        assert!(!mgr.canonical_path().exists());
    }

    #[tokio::test]
    async fn test_insufficient_storage_blocks_staging() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy().with_available_storage(100));
        place(&mgr.layout().external_candidates("model.task")[1], 2048);

        let err = mgr.ensure_available().await.unwrap_err();
        match err {
            KatalisError::InsufficientStorage {
                available_bytes,
                required_bytes,
            } => {
                assert_eq!(available_bytes, 100);
                assert_eq!(required_bytes, 2048);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bundled_asset_is_last_resort() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy());
        place(&mgr.layout().bundled_path("model.task"), 3000);

        let path = mgr.ensure_available().await.unwrap();
        assert_eq!(path, mgr.canonical_path());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3000);
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy());
        let candidates = mgr.layout().external_candidates("model.task");
        place(&candidates[0], 10);
        place(&candidates[2], 2048);

        let path = mgr.ensure_available().await.unwrap();
        assert_eq!(path, mgr.canonical_path());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2048);
    }

    #[test]
    fn test_set_override_rejects_invalid_and_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy());
        let good = dir.path().join("good.task");
        let bad = dir.path().join("bad.task");
        place(&good, 2048);
        place(&bad, 8);

        assert!(matches!(
            mgr.set_manual_override(Some(good.clone())),
            OverrideOutcome::Set { size_bytes: 2048, .. }
        ));
        assert!(matches!(
            mgr.set_manual_override(Some(bad)),
            OverrideOutcome::Rejected { .. }
        ));
        assert_eq!(mgr.manual_override(), Some(good.clone()));
        assert_eq!(mgr.current_path(), Some(good));

        assert_eq!(mgr.set_manual_override(None), OverrideOutcome::Cleared);
        assert_eq!(mgr.manual_override(), None);
        assert_eq!(mgr.current_path(), None);
    }

    #[test]
    fn test_model_info_reports_canonical() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path(), roomy());
        let info = mgr.model_info();
        assert!(!info.model_found);
        assert!(!info.is_valid);
        assert_eq!(info.search_paths.len(), 5);

        place(&mgr.canonical_path(), 2048);
        let info = mgr.model_info();
        assert_eq!(info.active_path, Some(mgr.canonical_path()));
        assert!(info.model_found);
        assert!(info.is_valid);
    }

    #[tokio::test]
    async fn test_verify_checksum() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("abc.task");
        std::fs::write(&file, b"abc").unwrap();

        let mgr = manager(dir.path(), roomy());
        assert_eq!(mgr.verify_checksum(&file).await.unwrap(), None);

        let mut with_sum = spec();
        with_sum.sha256 =
            Some("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD".to_string());
        let mgr = ArtifactManager::new(
            ArtifactLayout::rooted_at(dir.path()),
            with_sum,
            Arc::new(roomy()),
        );
        assert_eq!(mgr.verify_checksum(&file).await.unwrap(), Some(true));
    }
}
