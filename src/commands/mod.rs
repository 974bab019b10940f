// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Command handlers for the `katalis` binary
//!
//! Each subcommand builds only the components it needs from a shared
//! `CommandContext`.

pub mod ask;
pub mod model;
pub mod prefs;
pub mod probe;
pub mod stats;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::OutputFormat;
use crate::config::{PreferenceStore, Settings};
use crate::error::{KatalisError, Result};
use crate::hardware::{CapabilityProber, DeviceInfoProvider, HostDeviceInfo, StaticDeviceInfo};
use crate::models::{ArtifactManager, OverrideOutcome};
use crate::telemetry::TelemetryAggregator;

/// Everything a command needs to assemble its components
pub struct CommandContext {
    pub settings: Settings,
    pub device: Arc<dyn DeviceInfoProvider>,
    pub format: OutputFormat,
    pub model_path: Option<PathBuf>,
    preferences_path: PathBuf,
    stats_path: PathBuf,
}

impl CommandContext {
    /// Probe the host unless a fixed device profile is given.
    pub fn new(
        settings: Settings,
        device_profile: Option<&Path>,
        model_path: Option<PathBuf>,
        format: OutputFormat,
    ) -> Result<Self> {
        let device: Arc<dyn DeviceInfoProvider> = match device_profile {
            Some(path) => {
                tracing::debug!("Using device profile {}", path.display());
                Arc::new(StaticDeviceInfo::from_file(path)?)
            }
            None => Arc::new(HostDeviceInfo::new()),
        };
        Ok(Self {
            settings,
            device,
            format,
            model_path,
            preferences_path: Settings::preferences_path(),
            stats_path: Settings::stats_path(),
        })
    }

    /// Relocate the durable preference and statistics namespaces.
    pub fn with_state_dir(mut self, dir: &Path) -> Self {
        self.preferences_path = dir.join("preferences.json");
        self.stats_path = dir.join("performance_stats.json");
        self
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn prober(&self) -> CapabilityProber {
        CapabilityProber::new(
            self.device.clone(),
            self.settings.artifact_layout().internal_dir,
            self.settings.capability.clone(),
        )
    }

    /// Artifact manager with the `--model-path` override applied. An
    /// override that fails validation is an error rather than ignored.
    pub fn artifacts(&self) -> Result<ArtifactManager> {
        let manager = ArtifactManager::new(
            self.settings.artifact_layout(),
            self.settings.model.clone(),
            self.device.clone(),
        );
        if let Some(path) = &self.model_path {
            if let OverrideOutcome::Rejected { path, validation } =
                manager.set_manual_override(Some(path.clone()))
            {
                let issue = validation.issue().cloned().ok_or_else(|| {
                    KatalisError::Config(format!("override {} rejected", path.display()))
                })?;
                return Err(KatalisError::ArtifactInvalid { path, issue });
            }
        }
        Ok(manager)
    }

    pub fn preferences(&self) -> PreferenceStore {
        PreferenceStore::open(&self.preferences_path)
    }

    pub fn telemetry(&self) -> TelemetryAggregator {
        TelemetryAggregator::open(&self.stats_path, self.settings.insights.clone())
    }
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn mib(bytes: u64) -> u64 {
    bytes / 1_048_576
}
