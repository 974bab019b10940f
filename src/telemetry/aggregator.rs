// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Telemetry aggregator over a durable JSON namespace

use chrono::Utc;
use std::path::PathBuf;

use super::insights::{generate_insights, InsightPolicy, PerformanceInsights};
use super::stats::{PerformanceStats, TelemetryRecord};
use crate::engine::InferenceMetrics;
use crate::error::Result;
use crate::hardware::{AccelerationMode, CapabilitySnapshot};
use crate::storage::JsonDocument;

/// Cross-session performance statistics. Every write is an atomic
/// read-modify-write, so concurrent recorders never lose an update.
pub struct TelemetryAggregator {
    doc: JsonDocument<TelemetryRecord>,
    policy: InsightPolicy,
}

impl TelemetryAggregator {
    pub fn open(path: impl Into<PathBuf>, policy: InsightPolicy) -> Self {
        Self {
            doc: JsonDocument::open(path),
            policy,
        }
    }

    pub fn in_memory(policy: InsightPolicy) -> Self {
        Self {
            doc: JsonDocument::in_memory(TelemetryRecord::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &InsightPolicy {
        &self.policy
    }

    pub async fn stats(&self) -> PerformanceStats {
        self.doc.load().await.stats
    }

    pub async fn record_inference(
        &self,
        duration_ms: u64,
        mode: AccelerationMode,
        success: bool,
    ) -> Result<PerformanceStats> {
        let record = self
            .doc
            .update(|r| r.stats.record(duration_ms, mode, success))
            .await?;
        tracing::debug!(
            duration_ms,
            %mode,
            success,
            total = record.stats.total_inferences,
            "Recorded inference"
        );
        Ok(record.stats)
    }

    pub async fn record_metrics(&self, metrics: &InferenceMetrics) -> Result<PerformanceStats> {
        self.record_inference(metrics.duration_ms, metrics.mode, metrics.success)
            .await
    }

    /// Advice for `stats` on this device. Marks the analysis time.
    pub async fn generate_insights(
        &self,
        stats: &PerformanceStats,
        snapshot: &CapabilitySnapshot,
    ) -> PerformanceInsights {
        if let Err(e) = self
            .doc
            .update(|r| r.last_analysis_at = Some(Utc::now()))
            .await
        {
            tracing::warn!("Failed to record analysis time: {}", e);
        }
        generate_insights(stats, snapshot, &self.policy)
    }

    /// Reset the counters. The session count survives.
    pub async fn clear_stats(&self) -> Result<()> {
        self.doc
            .update(|r| {
                r.stats = PerformanceStats::default();
                r.last_analysis_at = None;
            })
            .await?;
        tracing::info!("Performance statistics cleared");
        Ok(())
    }

    pub async fn increment_session_count(&self) -> Result<u64> {
        let record = self.doc.update(|r| r.session_count += 1).await?;
        Ok(record.session_count)
    }

    pub async fn session_count(&self) -> u64 {
        self.doc.load().await.session_count
    }
}
