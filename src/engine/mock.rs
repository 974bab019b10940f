// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock native engine for testing
//!
//! Scriptable stand-in for the native library: queued responses, per-mode
//! construction failures, artificial latency, and a releasable hang used to
//! exercise deadlines. The hang honors the per-call cancel flag; latency
//! does not, standing in for a native call that cannot be interrupted.
//! Clones share state, so a test can keep a handle to inspect counters
//! after handing the factory to an orchestrator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::native::{CancelFlag, EngineFactory, EngineOptions, NativeEngine};
use crate::error::{KatalisError, Result};
use crate::hardware::AccelerationMode;

/// Upper bound on a simulated hang, so an unreleased gate cannot wedge
/// runtime shutdown forever.
const MAX_HANG: Duration = Duration::from_secs(30);

/// How often a hanging call checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock engine lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

struct MockState {
    responses: Mutex<VecDeque<String>>,
    default_response: Mutex<String>,
    failing_modes: Mutex<Vec<AccelerationMode>>,
    failure_message: Mutex<String>,
    create_delay: Mutex<Duration>,
    latencies: Mutex<Vec<(AccelerationMode, Duration)>>,
    call_error: Mutex<Option<String>>,
    hanging: Mutex<bool>,
    hang_released: Condvar,
    create_count: AtomicUsize,
    call_count: AtomicUsize,
    close_count: AtomicUsize,
    cancelled_count: AtomicUsize,
    active_calls: AtomicUsize,
    max_concurrent_calls: AtomicUsize,
    created_modes: Mutex<Vec<AccelerationMode>>,
    prompts: Mutex<Vec<(String, AccelerationMode)>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: Mutex::new("This is a mock tutor response.".to_string()),
            failing_modes: Mutex::new(Vec::new()),
            failure_message: Mutex::new("GPU delegate initialization failed".to_string()),
            create_delay: Mutex::new(Duration::ZERO),
            latencies: Mutex::new(Vec::new()),
            call_error: Mutex::new(None),
            hanging: Mutex::new(false),
            hang_released: Condvar::new(),
            create_count: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            cancelled_count: AtomicUsize::new(0),
            active_calls: AtomicUsize::new(0),
            max_concurrent_calls: AtomicUsize::new(0),
            created_modes: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

/// A scriptable engine factory for tests and demos
#[derive(Clone, Default)]
pub struct MockEngineFactory {
    state: Arc<MockState>,
    model_format: Option<String>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned once the queue is empty
    pub fn with_response(self, text: impl Into<String>) -> Self {
        *lock(&self.state.default_response) = text.into();
        self
    }

    /// Queue responses returned in order
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        lock(&self.state.responses).extend(texts);
        self
    }

    /// Construction in `mode` fails with the configured failure message
    pub fn failing_for(self, mode: AccelerationMode) -> Self {
        lock(&self.state.failing_modes).push(mode);
        self
    }

    pub fn with_failure_message(self, message: impl Into<String>) -> Self {
        *lock(&self.state.failure_message) = message.into();
        self
    }

    /// Report `extension` as the only model format this factory loads
    pub fn with_model_format(mut self, extension: impl Into<String>) -> Self {
        self.model_format = Some(extension.into());
        self
    }

    /// Simulated model load time
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.set_create_delay(delay);
        self
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *lock(&self.state.create_delay) = delay;
    }

    /// Completion latency for engines constructed in `mode`
    pub fn with_latency(self, mode: AccelerationMode, latency: Duration) -> Self {
        self.set_latency(mode, latency);
        self
    }

    pub fn set_latency(&self, mode: AccelerationMode, latency: Duration) {
        let mut latencies = lock(&self.state.latencies);
        latencies.retain(|(m, _)| *m != mode);
        latencies.push((mode, latency));
    }

    /// Every completion fails with `message`
    pub fn set_call_error(&self, message: Option<String>) {
        *lock(&self.state.call_error) = message;
    }

    /// Completions block until `release_hang` (or a 30s safety cap)
    pub fn set_hang(&self, hang: bool) {
        *lock(&self.state.hanging) = hang;
        if !hang {
            self.state.hang_released.notify_all();
        }
    }

    pub fn release_hang(&self) {
        self.set_hang(false);
    }

    pub fn create_count(&self) -> usize {
        self.state.create_count.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.state.call_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// Completions that returned early because their cancel flag was set
    pub fn cancelled_count(&self) -> usize {
        self.state.cancelled_count.load(Ordering::SeqCst)
    }

    /// Highest number of completions ever running at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.state.max_concurrent_calls.load(Ordering::SeqCst)
    }

    /// Modes passed to every construction attempt, in order
    pub fn created_modes(&self) -> Vec<AccelerationMode> {
        lock(&self.state.created_modes).clone()
    }

    /// Prompts and acceleration hints of every completion, in order
    pub fn prompts(&self) -> Vec<(String, AccelerationMode)> {
        lock(&self.state.prompts).clone()
    }
}

impl EngineFactory for MockEngineFactory {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_format(&self) -> Option<&str> {
        self.model_format.as_deref()
    }

    fn create(&self, options: &EngineOptions) -> Result<Arc<dyn NativeEngine>> {
        self.state.create_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.created_modes).push(options.acceleration);

        let delay = *lock(&self.state.create_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if lock(&self.state.failing_modes).contains(&options.acceleration) {
            let message = lock(&self.state.failure_message).clone();
            return Err(KatalisError::EngineInit(format!(
                "{} ({})",
                message, options.acceleration
            )));
        }

        Ok(Arc::new(MockEngine {
            mode: options.acceleration,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Engine handle produced by `MockEngineFactory`
pub struct MockEngine {
    mode: AccelerationMode,
    state: Arc<MockState>,
    closed: AtomicBool,
}

impl MockEngine {
    /// Block while the hang gate is closed. Returns false when the call was
    /// cancelled first.
    fn wait_while_hanging(&self, cancel: &CancelFlag) -> bool {
        let started = std::time::Instant::now();
        let mut guard = lock(&self.state.hanging);
        while *guard && started.elapsed() < MAX_HANG {
            if cancel.is_cancelled() {
                return false;
            }
            guard = match self.state.hang_released.wait_timeout(guard, CANCEL_POLL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => {
                    tracing::warn!("Mock engine hang gate was poisoned");
                    poisoned.into_inner().0
                }
            };
        }
        true
    }

    fn run(&self, cancel: &CancelFlag) -> Result<String> {
        let latency = lock(&self.state.latencies)
            .iter()
            .find(|(m, _)| *m == self.mode)
            .map(|(_, d)| *d);
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        if !self.wait_while_hanging(cancel) {
            self.state.cancelled_count.fetch_add(1, Ordering::SeqCst);
            return Err(KatalisError::Inference("generation cancelled".to_string()));
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(KatalisError::Inference("engine already closed".to_string()));
        }
        if let Some(message) = lock(&self.state.call_error).clone() {
            return Err(KatalisError::Inference(message));
        }

        let queued = lock(&self.state.responses).pop_front();
        Ok(queued.unwrap_or_else(|| lock(&self.state.default_response).clone()))
    }
}

impl NativeEngine for MockEngine {
    fn complete(
        &self,
        prompt: &str,
        acceleration: AccelerationMode,
        cancel: &CancelFlag,
    ) -> Result<String> {
        self.state.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.prompts).push((prompt.to_string(), acceleration));

        let running = self.state.active_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_concurrent_calls
            .fetch_max(running, Ordering::SeqCst);
        let result = self.run(cancel);
        self.state.active_calls.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(mode: AccelerationMode) -> EngineOptions {
        EngineOptions {
            model_path: PathBuf::from("/models/m.task"),
            max_tokens: 16,
            acceleration: mode,
        }
    }

    #[test]
    fn test_queued_then_default_responses() {
        let factory = MockEngineFactory::new()
            .with_response("fallback")
            .with_responses(vec!["one".into(), "two".into()]);
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();

        let cpu = AccelerationMode::CpuOnly;
        let cancel = CancelFlag::new();
        assert_eq!(engine.complete("a", cpu, &cancel).unwrap(), "one");
        assert_eq!(engine.complete("b", cpu, &cancel).unwrap(), "two");
        assert_eq!(engine.complete("c", cpu, &cancel).unwrap(), "fallback");
        assert_eq!(factory.call_count(), 3);
    }

    #[test]
    fn test_failing_mode() {
        let factory = MockEngineFactory::new().failing_for(AccelerationMode::GpuPreferred);
        let err = factory
            .create(&options(AccelerationMode::GpuPreferred))
            .err()
            .unwrap();
        assert!(err.to_string().contains("GPU delegate"));
        assert!(factory.create(&options(AccelerationMode::CpuOnly)).is_ok());
        assert_eq!(
            factory.created_modes(),
            vec![AccelerationMode::GpuPreferred, AccelerationMode::CpuOnly]
        );
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_calls() {
        let factory = MockEngineFactory::new();
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();
        engine.close();
        engine.close();
        assert_eq!(factory.close_count(), 1);
        assert!(engine
            .complete("x", AccelerationMode::CpuOnly, &CancelFlag::new())
            .is_err());
    }

    #[test]
    fn test_hang_is_released() {
        let factory = MockEngineFactory::new();
        factory.set_hang(true);
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();

        let worker = std::thread::spawn(move || {
            engine.complete("x", AccelerationMode::CpuOnly, &CancelFlag::new())
        });
        std::thread::sleep(Duration::from_millis(50));
        factory.release_hang();

        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn test_records_acceleration_hint() {
        let factory = MockEngineFactory::new();
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();
        engine
            .complete("hint", AccelerationMode::GpuPreferred, &CancelFlag::new())
            .unwrap();
        assert_eq!(
            factory.prompts(),
            vec![("hint".to_string(), AccelerationMode::GpuPreferred)]
        );
    }

    #[test]
    fn test_cancel_ends_a_hang() {
        let factory = MockEngineFactory::new();
        factory.set_hang(true);
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();
        let cancel = CancelFlag::new();

        let flag = cancel.clone();
        let worker =
            std::thread::spawn(move || engine.complete("x", AccelerationMode::CpuOnly, &flag));
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        let err = worker.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert_eq!(factory.cancelled_count(), 1);
        factory.release_hang();
    }

    #[test]
    fn test_tracks_concurrent_calls() {
        let factory = MockEngineFactory::new().with_latency(
            AccelerationMode::CpuOnly,
            Duration::from_millis(50),
        );
        let engine = factory.create(&options(AccelerationMode::CpuOnly)).unwrap();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    engine.complete("x", AccelerationMode::CpuOnly, &CancelFlag::new())
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().unwrap();
        }
        assert_eq!(factory.max_concurrent_calls(), 2);
    }

    #[test]
    fn test_model_format_is_optional() {
        assert_eq!(MockEngineFactory::new().model_format(), None);
        assert_eq!(
            MockEngineFactory::new().with_model_format("gguf").model_format(),
            Some("gguf")
        );
    }
}
