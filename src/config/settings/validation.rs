// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{KatalisError, Result};

use super::Settings;

impl Settings {
    /// Reject configurations the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.file_name.trim().is_empty() {
            return Err(KatalisError::Config("model.file_name is empty".into()));
        }
        if model.extension.trim().is_empty() {
            return Err(KatalisError::Config("model.extension is empty".into()));
        }
        if model.min_size_bytes > model.max_size_bytes {
            return Err(KatalisError::Config(format!(
                "model.min_size_bytes ({}) exceeds model.max_size_bytes ({})",
                model.min_size_bytes, model.max_size_bytes
            )));
        }

        let orch = &self.orchestrator;
        if orch.metrics_capacity == 0 || orch.status_window == 0 {
            return Err(KatalisError::Config(
                "orchestrator.metrics_capacity and status_window must be positive".into(),
            ));
        }
        if orch.status_window > orch.metrics_capacity {
            return Err(KatalisError::Config(
                "orchestrator.status_window cannot exceed metrics_capacity".into(),
            ));
        }
        if !(orch.slow_fraction > 0.0 && orch.slow_fraction <= 1.0) {
            return Err(KatalisError::Config(format!(
                "orchestrator.slow_fraction must be in (0, 1], got {}",
                orch.slow_fraction
            )));
        }
        if orch.slow_samples_required == 0
            || orch.slow_samples_required > orch.slow_sample_window
            || orch.slow_sample_window > orch.metrics_capacity
        {
            return Err(KatalisError::Config(
                "orchestrator.slow_samples_required must be between 1 and slow_sample_window, \
                 and slow_sample_window cannot exceed metrics_capacity"
                    .into(),
            ));
        }

        let rate = self.insights.failure_rate_cutoff;
        if !(0.0..=1.0).contains(&rate) {
            return Err(KatalisError::Config(format!(
                "insights.failure_rate_cutoff must be in [0, 1], got {}",
                rate
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_status_window_bounded_by_capacity() {
        let mut s = Settings::default();
        s.orchestrator.status_window = s.orchestrator.metrics_capacity + 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_hysteresis_window() {
        let mut s = Settings::default();
        s.orchestrator.slow_samples_required = 2;
        s.orchestrator.slow_sample_window = 3;
        assert!(s.validate().is_ok());

        s.orchestrator.slow_samples_required = 4;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_slow_fraction_range() {
        let mut s = Settings::default();
        s.orchestrator.slow_fraction = 0.0;
        assert!(s.validate().is_err());
        s.orchestrator.slow_fraction = 1.5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_failure_rate_range() {
        let mut s = Settings::default();
        s.insights.failure_rate_cutoff = 1.2;
        assert!(s.validate().is_err());
    }
}
