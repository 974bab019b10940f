// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-process inference metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::hardware::AccelerationMode;

/// Error marker recorded for calls that exceeded their deadline.
pub const TIMEOUT_MARKER: &str = "Timeout";

/// One completed or failed inference attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceMetrics {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub mode: AccelerationMode,
    pub success: bool,
    pub error: Option<String>,
}

impl InferenceMetrics {
    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_MARKER)
    }
}

/// Fixed-capacity ring of the most recent metrics; oldest evicted first.
#[derive(Debug, Clone)]
pub struct MetricsRing {
    entries: VecDeque<InferenceMetrics>,
    capacity: usize,
}

impl MetricsRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, metrics: InferenceMetrics) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<InferenceMetrics> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<&InferenceMetrics> {
        self.entries.back()
    }

    /// Mean duration over the last `window` entries; 0 when empty.
    pub fn average_latency_ms(&self, window: usize) -> u64 {
        let recent = self.recent(window);
        if recent.is_empty() {
            return 0;
        }
        recent.iter().map(|m| m.duration_ms).sum::<u64>() / recent.len() as u64
    }

    /// Success share over the last `window` entries; 1.0 when empty.
    pub fn success_rate(&self, window: usize) -> f64 {
        let recent = self.recent(window);
        if recent.is_empty() {
            return 1.0;
        }
        recent.iter().filter(|m| m.success).count() as f64 / recent.len() as f64
    }
}
