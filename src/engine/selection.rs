// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Acceleration selection and adaptive switching policy

use serde::{Deserialize, Serialize};

use super::metrics::InferenceMetrics;
use crate::config::{PerformanceMode, PerformanceSettings};
use crate::hardware::{recommend, AccelerationMode, CapabilityPolicy, CapabilitySnapshot};

/// Orchestration policy constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorPolicy {
    /// Output token cap handed to the native engine
    pub max_output_tokens: u32,
    /// Conversation lines kept in the prompt
    pub history_turns: usize,
    /// In-memory metrics kept per process
    pub metrics_capacity: usize,
    /// Metrics averaged by `status()`
    pub status_window: usize,
    /// Fraction of the deadline above which a call counts as slow
    pub slow_fraction: f64,
    /// GPU calls slower than this demote to CPU
    pub gpu_slow_threshold_ms: u64,
    /// CPU calls slower than this promote to GPU when available
    pub cpu_slow_threshold_ms: u64,
    /// Slow samples needed within `slow_sample_window` to switch
    pub slow_samples_required: usize,
    pub slow_sample_window: usize,
    /// Run a short completion after construction to verify the handle
    pub warm_up: bool,
    pub warm_up_prompt: String,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            history_turns: 10,
            metrics_capacity: 50,
            status_window: 10,
            slow_fraction: 0.8,
            gpu_slow_threshold_ms: 8000,
            cpu_slow_threshold_ms: 6000,
            slow_samples_required: 1,
            slow_sample_window: 1,
            warm_up: true,
            warm_up_prompt: "Hello".to_string(),
        }
    }
}

/// Acceleration mode for the next initialization, keyed on the user's
/// performance mode and gated by the battery and thermal allowances.
pub fn select_acceleration(
    snapshot: &CapabilitySnapshot,
    settings: &PerformanceSettings,
    policy: &CapabilityPolicy,
) -> AccelerationMode {
    match settings.performance_mode {
        PerformanceMode::Auto => {
            if !snapshot.has_gpu {
                return AccelerationMode::CpuOnly;
            }
            if snapshot.low_power_mode && !settings.allow_gpu_when_battery_low {
                return AccelerationMode::CpuOnly;
            }
            if snapshot.thermal_level.is_hot() && !settings.allow_gpu_when_hot {
                return AccelerationMode::CpuOnly;
            }
            // Allowances lift the matching gate from the recommendation too.
            let mut relaxed = snapshot.clone();
            if settings.allow_gpu_when_battery_low {
                relaxed.low_power_mode = false;
            }
            if settings.allow_gpu_when_hot {
                relaxed.thermal_level = Default::default();
            }
            recommend(&relaxed, policy)
        }
        PerformanceMode::Performance if snapshot.has_gpu => AccelerationMode::GpuPreferred,
        PerformanceMode::Performance => AccelerationMode::CpuOnly,
        PerformanceMode::BatterySaver => AccelerationMode::CpuOnly,
        PerformanceMode::Manual => AccelerationMode::AutoAdaptive,
    }
}

/// Mode to switch to after `latest` finished, if any.
///
/// Only GPU_PREFERRED and CPU_ONLY are tuned, and only by a call that ran
/// in `active` mode and was itself slow. A call forced into another mode
/// says nothing about the active one. `recent` is ordered oldest first and
/// supplies the rest of the hysteresis window; `latest` may or may not
/// already be part of it.
pub fn adaptive_switch(
    active: AccelerationMode,
    has_gpu: bool,
    latest: &InferenceMetrics,
    recent: &[InferenceMetrics],
    policy: &OrchestratorPolicy,
) -> Option<AccelerationMode> {
    let (threshold, target) = match active {
        AccelerationMode::GpuPreferred => (policy.gpu_slow_threshold_ms, AccelerationMode::CpuOnly),
        AccelerationMode::CpuOnly if has_gpu => {
            (policy.cpu_slow_threshold_ms, AccelerationMode::GpuPreferred)
        }
        _ => return None,
    };

    if latest.mode != active || !latest.success || latest.duration_ms <= threshold {
        return None;
    }

    let earlier_slow = recent
        .iter()
        .rev()
        .filter(|m| m.request_id != latest.request_id && m.mode == active && m.success)
        .take(policy.slow_sample_window.max(1) - 1)
        .filter(|m| m.duration_ms > threshold)
        .count();

    (1 + earlier_slow >= policy.slow_samples_required.max(1)).then_some(target)
}

/// Diagnostic hint for an engine construction failure, from its message.
pub fn engine_failure_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if ["gpu", "opengl", "vulkan", "delegate"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some("GPU acceleration is unavailable or unstable on this device")
    } else if lower.contains("memory") {
        Some("the model may not fit in available memory")
    } else {
        None
    }
}
