// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Performance preferences
//!
//! Preferences are read fresh by the orchestrator before every
//! initialization and every inference call, so edits apply to the next call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::Result;
use crate::storage::JsonDocument;

/// User-selected performance mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceMode {
    #[default]
    Auto,
    Performance,
    BatterySaver,
    Manual,
}

impl PerformanceMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            PerformanceMode::Auto => "Smart",
            PerformanceMode::Performance => "Speed",
            PerformanceMode::BatterySaver => "Efficiency",
            PerformanceMode::Manual => "Manual",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PerformanceMode::Auto => "Automatic based on device and conditions",
            PerformanceMode::Performance => "Prefer GPU for fastest responses",
            PerformanceMode::BatterySaver => "CPU-only for longer battery life",
            PerformanceMode::Manual => "User controls acceleration per session",
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.display_name(), self.description())
    }
}

/// Performance preferences, read-only to the inference core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub performance_mode: PerformanceMode,
    pub allow_gpu_when_battery_low: bool,
    pub allow_gpu_when_hot: bool,
    pub show_performance_stats: bool,
    pub adaptive_mode: bool,
    /// Wall-clock budget for one inference call
    pub max_inference_time_ms: u64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            performance_mode: PerformanceMode::Auto,
            allow_gpu_when_battery_low: false,
            allow_gpu_when_hot: false,
            show_performance_stats: false,
            adaptive_mode: true,
            max_inference_time_ms: 10_000,
        }
    }
}

impl PerformanceSettings {
    /// Inference deadline; never zero.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.max_inference_time_ms.max(1))
    }
}

/// Observable, durable store for `PerformanceSettings`.
pub struct PreferenceStore {
    doc: JsonDocument<PerformanceSettings>,
    tx: watch::Sender<PerformanceSettings>,
}

impl PreferenceStore {
    /// File-backed store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let doc = JsonDocument::open(path);
        let initial = doc.peek().unwrap_or_default();
        let (tx, _rx) = watch::channel(initial);
        Self { doc, tx }
    }

    pub fn in_memory(initial: PerformanceSettings) -> Self {
        let (tx, _rx) = watch::channel(initial.clone());
        Self {
            doc: JsonDocument::in_memory(initial),
            tx,
        }
    }

    /// Latest value.
    pub fn current(&self) -> PerformanceSettings {
        self.tx.borrow().clone()
    }

    /// Stream of the latest value.
    pub fn subscribe(&self) -> watch::Receiver<PerformanceSettings> {
        self.tx.subscribe()
    }

    /// Atomically edit, persist and publish.
    pub async fn update<F>(&self, edit: F) -> Result<PerformanceSettings>
    where
        F: FnOnce(&mut PerformanceSettings),
    {
        let next = self.doc.update(edit).await?;
        self.tx.send_replace(next.clone());
        tracing::debug!(?next, "Performance preferences updated");
        Ok(next)
    }

    pub async fn set_performance_mode(&self, mode: PerformanceMode) -> Result<PerformanceSettings> {
        self.update(|s| s.performance_mode = mode).await
    }

    pub async fn set_max_inference_time_ms(&self, ms: u64) -> Result<PerformanceSettings> {
        self.update(|s| s.max_inference_time_ms = ms).await
    }

    pub async fn reset_to_defaults(&self) -> Result<PerformanceSettings> {
        self.update(|s| *s = PerformanceSettings::default()).await
    }
}
