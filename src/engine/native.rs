// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Native inference engine boundary
//!
//! Both construction and completion are long, blocking calls. The
//! orchestrator always runs them on the blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::hardware::AccelerationMode;

/// Options bundle used to construct an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub model_path: PathBuf,
    pub max_tokens: u32,
    pub acceleration: AccelerationMode,
}

/// Per-call cancellation signal. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A loaded model that completes one prompt at a time.
pub trait NativeEngine: Send + Sync {
    /// Complete a fully formed prompt. `acceleration` is a hint; engines
    /// that fix their backend at construction may ignore it. Engines should
    /// poll `cancel` and return early once it is set.
    fn complete(
        &self,
        prompt: &str,
        acceleration: AccelerationMode,
        cancel: &CancelFlag,
    ) -> Result<String>;

    /// Release native resources. Must tolerate repeated calls.
    fn close(&self);
}

/// Builds native engines.
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    /// File extension of the models this factory loads, when it only
    /// understands one format.
    fn model_format(&self) -> Option<&str> {
        None
    }

    fn create(&self, options: &EngineOptions) -> Result<Arc<dyn NativeEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let seen_by_engine = flag.clone();
        assert!(!seen_by_engine.is_cancelled());
        flag.cancel();
        assert!(seen_by_engine.is_cancelled());
        assert!(!CancelFlag::new().is_cancelled());
    }
}
