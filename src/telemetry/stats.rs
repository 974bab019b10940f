// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable cross-session performance statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hardware::AccelerationMode;

/// Rolling inference statistics, split by CPU and GPU execution.
///
/// Averages are updated incrementally and truncated to whole milliseconds,
/// so they are an estimate that may drift slightly from the true mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceStats {
    pub total_inferences: u64,
    pub average_inference_time_ms: u64,
    pub gpu_inferences: u64,
    pub cpu_inferences: u64,
    pub gpu_average_time_ms: u64,
    pub cpu_average_time_ms: u64,
    pub successful_inferences: u64,
    pub failed_inferences: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            total_inferences: 0,
            average_inference_time_ms: 0,
            gpu_inferences: 0,
            cpu_inferences: 0,
            gpu_average_time_ms: 0,
            cpu_average_time_ms: 0,
            successful_inferences: 0,
            failed_inferences: 0,
            last_updated: Utc::now(),
        }
    }
}

/// `(average * count + sample) / (count + 1)` in integer milliseconds.
pub fn incremental_average(average: u64, count: u64, sample: u64) -> u64 {
    if count == 0 {
        return sample;
    }
    let total = (average as u128) * (count as u128) + sample as u128;
    (total / (count as u128 + 1)) as u64
}

impl PerformanceStats {
    /// Fold one attempt into the statistics. Every mode other than
    /// CPU_ONLY counts as GPU.
    pub fn record(&mut self, duration_ms: u64, mode: AccelerationMode, success: bool) {
        self.average_inference_time_ms =
            incremental_average(self.average_inference_time_ms, self.total_inferences, duration_ms);
        self.total_inferences += 1;

        if mode == AccelerationMode::CpuOnly {
            self.cpu_average_time_ms =
                incremental_average(self.cpu_average_time_ms, self.cpu_inferences, duration_ms);
            self.cpu_inferences += 1;
        } else {
            self.gpu_average_time_ms =
                incremental_average(self.gpu_average_time_ms, self.gpu_inferences, duration_ms);
            self.gpu_inferences += 1;
        }

        if success {
            self.successful_inferences += 1;
        } else {
            self.failed_inferences += 1;
        }
        self.last_updated = Utc::now();
    }

    /// Fraction of successful attempts; 1.0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.total_inferences == 0 {
            1.0
        } else {
            self.successful_inferences as f64 / self.total_inferences as f64
        }
    }

    pub fn has_both_modes(&self) -> bool {
        self.gpu_inferences > 0 && self.cpu_inferences > 0
    }

    /// Which execution path has served this device best so far.
    pub fn preferred_acceleration(&self) -> &'static str {
        if self.gpu_inferences == 0 && self.cpu_inferences > 0 {
            "CPU Only"
        } else if self.cpu_inferences == 0 && self.gpu_inferences > 0 {
            "GPU Only"
        } else if self.gpu_average_time_ms < self.cpu_average_time_ms {
            "GPU Preferred"
        } else if self.cpu_average_time_ms < self.gpu_average_time_ms {
            "CPU Preferred"
        } else {
            "Balanced"
        }
    }

    /// Multi-line human readable summary.
    pub fn summary(&self) -> String {
        let mut out = String::from("Performance Summary:\n");
        out.push_str(&format!("• Total questions: {}\n", self.total_inferences));
        out.push_str(&format!(
            "• Average response time: {:.1}s\n",
            self.average_inference_time_ms as f64 / 1000.0
        ));
        out.push_str(&format!(
            "• Success rate: {}%\n",
            (self.success_rate() * 100.0) as u32
        ));
        if self.has_both_modes() {
            out.push_str(&format!(
                "• GPU average: {:.1}s\n",
                self.gpu_average_time_ms as f64 / 1000.0
            ));
            out.push_str(&format!(
                "• CPU average: {:.1}s\n",
                self.cpu_average_time_ms as f64 / 1000.0
            ));
        }
        out.push_str(&format!("• Recommendation: {}", self.preferred_acceleration()));
        out
    }
}

/// Everything the aggregator persists in its namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    pub stats: PerformanceStats,
    pub session_count: u64,
    pub last_analysis_at: Option<DateTime<Utc>>,
}
