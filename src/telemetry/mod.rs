// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable performance telemetry
//!
//! Separate from the orchestrator's in-memory metrics: these counters
//! survive restarts and feed the user-facing performance advice.

pub mod aggregator;
pub mod insights;
pub mod stats;

pub use aggregator::TelemetryAggregator;
pub use insights::{generate_insights, InsightPolicy, PerformanceInsights};
pub use stats::{incremental_average, PerformanceStats, TelemetryRecord};
