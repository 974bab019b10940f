// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Filesystem roots searched for the model artifact

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Explicit filesystem roots the artifact manager works against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Holds the canonical staged copy
    pub internal_dir: PathBuf,
    /// App-scoped external files; searched under `models/`
    pub external_files_dir: PathBuf,
    /// App-scoped external downloads
    pub external_downloads_dir: PathBuf,
    /// Legacy shared downloads folder
    pub public_downloads_dir: PathBuf,
    /// Bundled assets shipped with the application
    pub bundled_assets_dir: PathBuf,
}

impl ArtifactLayout {
    /// Default roots relative to the Katalis home directory.
    pub fn under_home(home: &Path) -> Self {
        Self {
            internal_dir: home.join("models"),
            external_files_dir: home.join("external"),
            external_downloads_dir: home.join("external").join("downloads"),
            public_downloads_dir: dirs::download_dir().unwrap_or_else(|| home.join("Downloads")),
            bundled_assets_dir: home.join("assets"),
        }
    }

    /// Every root under one directory; used by tests and sandboxes.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            internal_dir: root.join("internal"),
            external_files_dir: root.join("external"),
            external_downloads_dir: root.join("external").join("downloads"),
            public_downloads_dir: root.join("public").join("Download"),
            bundled_assets_dir: root.join("assets"),
        }
    }

    pub fn canonical_path(&self, file_name: &str) -> PathBuf {
        self.internal_dir.join(file_name)
    }

    /// External candidates in search order.
    pub fn external_candidates(&self, file_name: &str) -> Vec<PathBuf> {
        vec![
            self.external_files_dir.join("models").join(file_name),
            self.external_downloads_dir.join(file_name),
            self.public_downloads_dir.join(file_name),
        ]
    }

    pub fn bundled_path(&self, file_name: &str) -> PathBuf {
        self.bundled_assets_dir.join(file_name)
    }

    /// Canonical, external and bundled locations in resolution order.
    pub fn search_paths(&self, file_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.canonical_path(file_name)];
        paths.extend(self.external_candidates(file_name));
        paths.push(self.bundled_path(file_name));
        paths
    }
}
