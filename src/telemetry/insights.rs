// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Rule-based performance advice

use serde::{Deserialize, Serialize};

use super::stats::PerformanceStats;
use crate::hardware::CapabilitySnapshot;

/// Thresholds for the insight rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightPolicy {
    /// Attempts needed before any mode advice is given
    pub min_samples: u64,
    /// GPU/CPU average gap that warrants a mode change
    pub significant_difference_ms: u64,
    /// GPU/CPU average gap considered a wash
    pub similar_difference_ms: u64,
    pub failure_rate_cutoff: f64,
    pub slow_average_ms: u64,
    pub low_ram_bytes: u64,
}

impl Default for InsightPolicy {
    fn default() -> Self {
        Self {
            min_samples: 5,
            significant_difference_ms: 3000,
            similar_difference_ms: 1000,
            failure_rate_cutoff: 0.8,
            slow_average_ms: 8000,
            low_ram_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// User-facing advice derived from the statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub recommendation: String,
    pub reasoning: String,
    pub tips: Vec<String>,
    pub summary: String,
}

/// Apply the insight rules. The first matching rule wins; device tips are
/// appended afterwards regardless of which rule fired.
pub fn generate_insights(
    stats: &PerformanceStats,
    snapshot: &CapabilitySnapshot,
    policy: &InsightPolicy,
) -> PerformanceInsights {
    let mut recommendation = "Continue current usage";
    let mut reasoning = "Performance is optimal for your device.".to_string();
    let mut tips: Vec<String> = Vec::new();

    if stats.total_inferences < policy.min_samples {
        recommendation = "Keep exploring";
        reasoning = "More usage data is needed for accurate recommendations.".to_string();
        tips.push("Ask a few more questions to get personalized performance insights".into());
    } else if stats.has_both_modes() {
        let gpu_faster = stats.gpu_average_time_ms < stats.cpu_average_time_ms;
        let difference = stats.gpu_average_time_ms.abs_diff(stats.cpu_average_time_ms);

        if difference > policy.significant_difference_ms && gpu_faster {
            recommendation = "Use Performance Mode";
            reasoning = format!(
                "GPU acceleration is significantly faster on your device ({}ms improvement).",
                difference
            );
            tips.push("Your device benefits greatly from GPU acceleration".into());
            tips.push("Consider enabling Performance mode in settings".into());
        } else if difference > policy.significant_difference_ms {
            recommendation = "Use Battery Saver Mode";
            reasoning =
                "CPU inference is faster on your device. The GPU may be thermal throttling."
                    .to_string();
            tips.push("Your device performs better with CPU-only inference".into());
            tips.push("GPU acceleration may be causing thermal throttling".into());
        } else if difference <= policy.similar_difference_ms {
            recommendation = "Use Auto Mode";
            reasoning = "The performance difference is minimal. Auto mode will balance battery and thermals."
                .to_string();
            tips.push("CPU and GPU perform similarly on your device".into());
            tips.push("Auto mode will balance performance with battery life".into());
        }
    } else if stats.success_rate() < policy.failure_rate_cutoff {
        recommendation = "Switch to Battery Saver Mode";
        reasoning = "A high failure rate suggests compatibility issues with the current acceleration."
            .to_string();
        tips.push("Try CPU-only mode for better stability".into());
        tips.push("Your device may have GPU compatibility issues".into());
    } else if stats.average_inference_time_ms > policy.slow_average_ms {
        recommendation = "Optimize performance";
        reasoning = "Responses are slower than optimal. Try adjusting settings or closing background apps."
            .to_string();
        tips.push("Close other apps to free up memory".into());
        tips.push("Make sure your device isn't in power saving mode".into());
        tips.push("Try shorter questions for faster responses".into());
    }

    if snapshot.total_ram_bytes < policy.low_ram_bytes {
        tips.push("Your device has limited RAM - CPU mode may be more stable".into());
    }
    if snapshot.low_power_mode {
        tips.push("Battery saver mode is active - performance may be reduced".into());
    }

    PerformanceInsights {
        recommendation: recommendation.to_string(),
        reasoning,
        tips,
        summary: stats.summary(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::AccelerationMode;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn roomy() -> CapabilitySnapshot {
        CapabilitySnapshot {
            total_ram_bytes: 8 * GIB,
            low_power_mode: false,
            ..CapabilitySnapshot::conservative()
        }
    }

    fn stats_with(gpu: &[u64], cpu: &[u64]) -> PerformanceStats {
        let mut stats = PerformanceStats::default();
        for d in gpu {
            stats.record(*d, AccelerationMode::GpuPreferred, true);
        }
        for d in cpu {
            stats.record(*d, AccelerationMode::CpuOnly, true);
        }
        stats
    }

    #[test]
    fn test_few_samples_keep_exploring() {
        let insights = generate_insights(&stats_with(&[100], &[]), &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Keep exploring");
        assert_eq!(insights.tips.len(), 1);
    }

    #[test]
    fn test_fast_gpu_recommends_performance_mode() {
        let stats = stats_with(&[1000, 1000, 1000], &[6000, 6000]);
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Use Performance Mode");
        assert!(insights.reasoning.contains("5000ms"));
    }

    #[test]
    fn test_fast_cpu_recommends_battery_saver() {
        let stats = stats_with(&[9000, 9000], &[2000, 2000, 2000]);
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Use Battery Saver Mode");
    }

    #[test]
    fn test_similar_modes_recommend_auto() {
        let stats = stats_with(&[2000, 2000, 2000], &[2500, 2500]);
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Use Auto Mode");
    }

    #[test]
    fn test_middle_gap_keeps_current_usage() {
        let stats = stats_with(&[2000, 2000, 2000], &[4000, 4000]);
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Continue current usage");
    }

    #[test]
    fn test_failures_recommend_battery_saver() {
        let mut stats = PerformanceStats::default();
        for i in 0..5 {
            stats.record(1000, AccelerationMode::GpuPreferred, i == 0);
        }
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Switch to Battery Saver Mode");
    }

    #[test]
    fn test_slow_average_suggests_optimizing() {
        let stats = stats_with(&[9000; 5], &[]);
        let insights = generate_insights(&stats, &roomy(), &InsightPolicy::default());
        assert_eq!(insights.recommendation, "Optimize performance");
        assert_eq!(insights.tips.len(), 3);
    }

    #[test]
    fn test_device_tips_are_appended() {
        let snapshot = CapabilitySnapshot {
            total_ram_bytes: 3 * GIB,
            low_power_mode: true,
            ..CapabilitySnapshot::conservative()
        };
        let insights = generate_insights(&stats_with(&[], &[]), &snapshot, &InsightPolicy::default());
        assert!(insights.tips.iter().any(|t| t.contains("limited RAM")));
        assert!(insights.tips.iter().any(|t| t.contains("Battery saver")));
        assert!(insights.summary.starts_with("Performance Summary:"));
    }
}
