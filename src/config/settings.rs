// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Katalis
//!
//! Handles loading and saving settings from ~/.katalis/settings.json. Every
//! policy threshold used by the prober, orchestrator and insights lives here.

use serde::{Deserialize, Serialize};

use crate::engine::OrchestratorPolicy;
use crate::hardware::CapabilityPolicy;
use crate::models::{ArtifactLayout, ArtifactSpec};
use crate::telemetry::InsightPolicy;

mod io;
mod migration;
mod validation;

/// Main settings structure, stored in ~/.katalis/settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Model artifact identity and acceptance rules
    #[serde(default)]
    pub model: ArtifactSpec,

    /// GPU recommendation thresholds
    #[serde(default)]
    pub capability: CapabilityPolicy,

    /// Inference orchestration policy
    #[serde(default)]
    pub orchestrator: OrchestratorPolicy,

    /// Performance advisor thresholds
    #[serde(default)]
    pub insights: InsightPolicy,

    /// Filesystem roots searched for the model (defaults under the home dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<ArtifactLayout>,
}

impl Settings {
    /// Effective artifact layout.
    pub fn artifact_layout(&self) -> ArtifactLayout {
        self.paths
            .clone()
            .unwrap_or_else(|| ArtifactLayout::under_home(&Self::katalis_home()))
    }
}
