// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Inference orchestrator
//!
//! Owns the single native engine handle behind an explicit state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                               -> Failed -> (initialize again)
//! ```
//!
//! One async mutex guards the state, so initialization, inference and
//! background re-tuning are single-flight per orchestrator. A separate
//! short-lived status cell answers `status()` without waiting on a call
//! that is in flight.
//!
//! A request's deadline covers the whole call, including the wait for the
//! engine lock, so a request queued behind a background re-tune times out
//! instead of waiting for the model to reload.
//!
//! Native calls cannot be preempted. When one overruns its deadline the
//! caller stops waiting and the call's `CancelFlag` is set; the engine
//! returns at its next cancellation check. Until then the call is parked,
//! and the next request waits for it (within its own deadline) before
//! touching the handle, so the engine never runs two completions at once.
//! Such abandoned calls are counted in `EngineStatus::abandoned_calls`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::metrics::{InferenceMetrics, MetricsRing, TIMEOUT_MARKER};
use super::native::{CancelFlag, EngineFactory, EngineOptions, NativeEngine};
use super::prompt::PromptBuilder;
use super::selection::{adaptive_switch, engine_failure_hint, select_acceleration, OrchestratorPolicy};
use crate::config::PreferenceStore;
use crate::error::{KatalisError, Result};
use crate::hardware::{AccelerationMode, CapabilityProber, CapabilitySnapshot};
use crate::models::ArtifactManager;

/// Prefix added to prompts that arrive with an image attached.
pub const IMAGE_PROMPT_PREFIX: &str = "Based on the provided image and this question: ";

/// Outcome of one generation request
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult {
    Success {
        text: String,
        metrics: InferenceMetrics,
    },
    /// Failure with a remediation hint. `metrics` is present when an
    /// inference attempt was actually made.
    Error {
        message: String,
        metrics: Option<InferenceMetrics>,
    },
    /// An initialization is in progress; try again shortly.
    Loading,
}

impl EngineResult {
    fn failure(err: &KatalisError, metrics: Option<InferenceMetrics>) -> Self {
        EngineResult::Error {
            message: format!("{}\n{}", err, err.remediation()),
            metrics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EngineResult::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            EngineResult::Success { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn metrics(&self) -> Option<&InferenceMetrics> {
        match self {
            EngineResult::Success { metrics, .. } => Some(metrics),
            EngineResult::Error { metrics, .. } => metrics.as_ref(),
            EngineResult::Loading => None,
        }
    }
}

/// Lifecycle phase as seen by status readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Point-in-time engine status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub is_ready: bool,
    pub phase: EnginePhase,
    pub active_mode: Option<AccelerationMode>,
    pub average_latency_ms: u64,
    pub success_rate: f64,
    pub device_description: String,
    pub last_error: Option<String>,
    pub abandoned_calls: usize,
}

/// Image attached to a multimodal request. Only a textual hint reaches the
/// engine; the bytes are not embedded in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone)]
struct ActiveEngine {
    handle: Arc<dyn NativeEngine>,
    mode: AccelerationMode,
    model_path: PathBuf,
}

enum EngineState {
    Uninitialized,
    Initializing,
    Ready(ActiveEngine),
    Failed(String),
}

struct StatusCell {
    phase: EnginePhase,
    active_mode: Option<AccelerationMode>,
    capabilities: Option<CapabilitySnapshot>,
    metrics: MetricsRing,
    last_error: Option<String>,
    abandoned_calls: usize,
}

struct Inner {
    prober: Arc<CapabilityProber>,
    artifacts: Arc<ArtifactManager>,
    preferences: Arc<PreferenceStore>,
    factory: Arc<dyn EngineFactory>,
    policy: OrchestratorPolicy,
    prompts: PromptBuilder,
    engine: Arc<Mutex<EngineState>>,
    status: StdMutex<StatusCell>,
    retune: StdMutex<Option<JoinHandle<()>>>,
    abandoned: StdMutex<Option<JoinHandle<Result<String>>>>,
}

/// Drives the native engine: acceleration choice, lifecycle, deadlines,
/// fallback and adaptive re-tuning. Cheap to clone.
#[derive(Clone)]
pub struct InferenceOrchestrator {
    inner: Arc<Inner>,
}

fn recover<'a, T>(result: std::sync::LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Orchestrator status lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl InferenceOrchestrator {
    pub fn new(
        prober: CapabilityProber,
        artifacts: Arc<ArtifactManager>,
        preferences: Arc<PreferenceStore>,
        factory: Arc<dyn EngineFactory>,
        policy: OrchestratorPolicy,
    ) -> Self {
        let prompts = PromptBuilder::new(policy.history_turns);
        let status = StatusCell {
            phase: EnginePhase::Uninitialized,
            active_mode: None,
            capabilities: None,
            metrics: MetricsRing::new(policy.metrics_capacity),
            last_error: None,
            abandoned_calls: 0,
        };
        Self {
            inner: Arc::new(Inner {
                prober: Arc::new(prober),
                artifacts,
                preferences,
                factory,
                policy,
                prompts,
                engine: Arc::new(Mutex::new(EngineState::Uninitialized)),
                status: StdMutex::new(status),
                retune: StdMutex::new(None),
                abandoned: StdMutex::new(None),
            }),
        }
    }

    pub fn artifacts(&self) -> &Arc<ArtifactManager> {
        &self.inner.artifacts
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.inner.preferences
    }

    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.inner.policy
    }

    fn status_cell(&self) -> MutexGuard<'_, StatusCell> {
        recover(self.inner.status.lock())
    }

    fn retune_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        recover(self.inner.retune.lock())
    }

    fn abandoned_slot(&self) -> MutexGuard<'_, Option<JoinHandle<Result<String>>>> {
        recover(self.inner.abandoned.lock())
    }

    pub fn phase(&self) -> EnginePhase {
        self.status_cell().phase
    }

    pub fn active_mode(&self) -> Option<AccelerationMode> {
        self.status_cell().active_mode
    }

    /// Recorded metrics, oldest first.
    pub fn recent_metrics(&self) -> Vec<InferenceMetrics> {
        let cell = self.status_cell();
        cell.metrics.recent(cell.metrics.capacity())
    }

    /// Capability snapshot, probed once per orchestrator lifetime.
    pub async fn capabilities(&self) -> CapabilitySnapshot {
        let cached = self.status_cell().capabilities.clone();
        if let Some(snapshot) = cached {
            return snapshot;
        }

        let prober = self.inner.prober.clone();
        let snapshot = tokio::task::spawn_blocking(move || prober.analyze())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Capability probe task failed: {}", e);
                CapabilitySnapshot::conservative()
            });

        self.status_cell()
            .capabilities
            .get_or_insert(snapshot)
            .clone()
    }

    /// Bring the engine to `Ready`. A no-op when already ready; concurrent
    /// callers wait for the one in-flight attempt. The attempt runs on its
    /// own task, so dropping the caller does not strand the state machine.
    pub async fn initialize(&self) -> Result<AccelerationMode> {
        let mut state = self.inner.engine.clone().lock_owned().await;
        if let EngineState::Ready(active) = &*state {
            return Ok(active.mode);
        }

        let this = self.clone();
        let attempt = tokio::spawn(async move {
            *state = EngineState::Initializing;
            this.update_status(|s| {
                s.phase = EnginePhase::Initializing;
                s.last_error = None;
            });

            match this.build_engine().await {
                Ok(active) => {
                    let mode = active.mode;
                    tracing::info!(
                        "Engine ready with {} using {}",
                        mode,
                        active.model_path.display()
                    );
                    *state = EngineState::Ready(active);
                    this.update_status(|s| {
                        s.phase = EnginePhase::Ready;
                        s.active_mode = Some(mode);
                    });
                    Ok(mode)
                }
                Err(e) => {
                    tracing::error!("Engine initialization failed: {}", e);
                    *state = EngineState::Failed(e.to_string());
                    this.update_status(|s| {
                        s.phase = EnginePhase::Failed;
                        s.active_mode = None;
                        s.last_error = Some(e.to_string());
                    });
                    Err(e)
                }
            }
        });

        attempt
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))?
    }

    async fn build_engine(&self) -> Result<ActiveEngine> {
        let snapshot = self.capabilities().await;
        let settings = self.inner.preferences.current();
        let target = select_acceleration(&snapshot, &settings, self.inner.prober.policy());
        tracing::info!(
            mode = %target,
            performance_mode = ?settings.performance_mode,
            "Selected acceleration"
        );

        let model_path = self.inner.artifacts.ensure_available().await?;

        match self.construct(&model_path, target).await {
            Ok(handle) => Ok(ActiveEngine {
                handle,
                mode: target,
                model_path,
            }),
            Err(e) if target != AccelerationMode::CpuOnly => {
                match engine_failure_hint(&e.to_string()) {
                    Some(hint) => tracing::warn!(
                        "{} initialization failed ({}): {}; retrying on CPU",
                        target,
                        hint,
                        e
                    ),
                    None => tracing::warn!("{} initialization failed: {}; retrying on CPU", target, e),
                }
                let handle = self
                    .construct(&model_path, AccelerationMode::CpuOnly)
                    .await
                    .map_err(|cpu_err| {
                        KatalisError::EngineInit(format!(
                            "{} failed ({}); CPU fallback failed ({})",
                            target, e, cpu_err
                        ))
                    })?;
                Ok(ActiveEngine {
                    handle,
                    mode: AccelerationMode::CpuOnly,
                    model_path,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn construct(
        &self,
        model_path: &Path,
        mode: AccelerationMode,
    ) -> Result<Arc<dyn NativeEngine>> {
        let options = EngineOptions {
            model_path: model_path.to_path_buf(),
            max_tokens: self.inner.policy.max_output_tokens,
            acceleration: mode,
        };
        let factory = self.inner.factory.clone();
        tracing::debug!("Constructing {} engine in {}", factory.name(), mode);

        let handle = tokio::task::spawn_blocking(move || factory.create(&options))
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))??;

        if self.inner.policy.warm_up {
            let warm_handle = handle.clone();
            let prompt = self.inner.policy.warm_up_prompt.clone();
            let warm = tokio::task::spawn_blocking(move || {
                warm_handle.complete(&prompt, mode, &CancelFlag::new())
            })
            .await
            .map_err(|e| KatalisError::Task(e.to_string()))?;
            if let Err(e) = warm {
                close_handle(handle).await;
                return Err(KatalisError::EngineInit(format!("warm-up failed: {}", e)));
            }
        }

        Ok(handle)
    }

    /// Complete `prompt` with the last history lines under the current
    /// deadline. Requires `Ready`; never initializes on its own.
    pub async fn generate_text_response(
        &self,
        prompt: &str,
        history: &[String],
        mode_override: Option<AccelerationMode>,
    ) -> EngineResult {
        if self.phase() == EnginePhase::Initializing {
            return EngineResult::Loading;
        }

        let settings = self.inner.preferences.current();
        let deadline = settings.deadline();
        let request_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let state = match tokio::time::timeout(deadline, self.inner.engine.lock()).await {
            Ok(state) => state,
            Err(_) => {
                let mode = mode_override
                    .or_else(|| self.active_mode())
                    .unwrap_or(AccelerationMode::CpuOnly);
                return self.queued_too_long(request_id, started_at, clock, mode, deadline);
            }
        };
        let active = match &*state {
            EngineState::Ready(active) => active.clone(),
            EngineState::Initializing => return EngineResult::Loading,
            EngineState::Uninitialized | EngineState::Failed(_) => {
                tracing::warn!("Generation requested before the engine is ready");
                return EngineResult::failure(&KatalisError::EngineNotInitialized, None);
            }
        };
        let mode = mode_override.unwrap_or(active.mode);

        if !self.drain_abandoned(deadline.saturating_sub(clock.elapsed())).await {
            drop(state);
            return self.queued_too_long(request_id, started_at, clock, mode, deadline);
        }

        let full_prompt = self.inner.prompts.build(prompt, history);
        tracing::debug!(
            %request_id,
            %mode,
            prompt_chars = full_prompt.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Generating response"
        );

        let call_clock = Instant::now();
        let handle = active.handle.clone();
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let mut call = tokio::task::spawn_blocking(move || handle.complete(&full_prompt, mode, &flag));
        let outcome =
            tokio::time::timeout(deadline.saturating_sub(clock.elapsed()), &mut call).await;
        let duration_ms = call_clock.elapsed().as_millis() as u64;
        if outcome.is_err() {
            cancel.cancel();
            *self.abandoned_slot() = Some(call);
        }
        drop(state);

        let mut metrics = InferenceMetrics {
            request_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            mode,
            success: false,
            error: None,
        };

        let result = match outcome {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join)) => Err(KatalisError::Task(join.to_string())),
            Err(_) => Err(KatalisError::Timeout {
                after_ms: deadline.as_millis() as u64,
            }),
        };

        match result {
            Ok(text) => {
                metrics.success = true;
                self.record(metrics.clone());
                let slow_after = settings.max_inference_time_ms as f64 * self.inner.policy.slow_fraction;
                if settings.adaptive_mode && duration_ms as f64 > slow_after {
                    self.consider_switch(active.mode, &metrics);
                }
                EngineResult::Success { text, metrics }
            }
            Err(e) => {
                if matches!(e, KatalisError::Timeout { .. }) {
                    metrics.error = Some(TIMEOUT_MARKER.to_string());
                    self.update_status(|s| s.abandoned_calls += 1);
                    tracing::warn!(
                        %request_id,
                        "Response generation timed out after {}ms; the native call was cancelled and may still be winding down",
                        deadline.as_millis()
                    );
                } else {
                    metrics.error = Some(e.to_string());
                    tracing::error!(%request_id, "Generation failed: {}", e);
                }
                self.record(metrics.clone());
                EngineResult::failure(&e, Some(metrics))
            }
        }
    }

    /// Multimodal entry point. An attached image adds a textual hint to the
    /// prompt; image content is not forwarded to the engine. Requests prefer
    /// the GPU unless the engine is running CPU-only.
    pub async fn generate_multimodal_response(
        &self,
        prompt: &str,
        image: Option<&ImageInput>,
        history: &[String],
        mode_override: Option<AccelerationMode>,
    ) -> EngineResult {
        let mode = mode_override.or_else(|| match self.active_mode() {
            Some(AccelerationMode::CpuOnly) => Some(AccelerationMode::CpuOnly),
            Some(_) => Some(AccelerationMode::GpuPreferred),
            None => None,
        });

        let prompt = match image {
            Some(image) => {
                tracing::debug!(
                    bytes = image.bytes.len(),
                    mime = %image.mime_type,
                    "Image attached; only a textual hint is sent to the engine"
                );
                format!("{}{}", IMAGE_PROMPT_PREFIX, prompt)
            }
            None => prompt.to_string(),
        };

        self.generate_text_response(&prompt, history, mode).await
    }

    /// The engine stayed busy (a re-tune, another request, or a call still
    /// winding down) for the whole deadline; no native call was made.
    fn queued_too_long(
        &self,
        request_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        mode: AccelerationMode,
        deadline: Duration,
    ) -> EngineResult {
        let err = KatalisError::Timeout {
            after_ms: deadline.as_millis() as u64,
        };
        let metrics = InferenceMetrics {
            request_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
            mode,
            success: false,
            error: Some(TIMEOUT_MARKER.to_string()),
        };
        tracing::warn!(
            %request_id,
            "Engine stayed busy past the {}ms deadline; request not started",
            deadline.as_millis()
        );
        self.record(metrics.clone());
        EngineResult::failure(&err, Some(metrics))
    }

    /// Wait up to `budget` for a call abandoned by an earlier timeout.
    /// Returns false if it is still running; it stays parked for the next
    /// caller. Call with the engine lock held.
    async fn drain_abandoned(&self, budget: Duration) -> bool {
        let pending = self.abandoned_slot().take();
        let Some(mut task) = pending else {
            return true;
        };
        match tokio::time::timeout(budget, &mut task).await {
            Ok(finished) => {
                tracing::debug!(ok = matches!(finished, Ok(Ok(_))), "Abandoned call finished");
                true
            }
            Err(_) => {
                *self.abandoned_slot() = Some(task);
                false
            }
        }
    }

    /// Wait for an abandoned call with no time limit. Call with the engine
    /// lock held, after the handle has been closed.
    async fn finish_abandoned(&self) {
        let pending = self.abandoned_slot().take();
        if let Some(task) = pending {
            if let Err(e) = task.await {
                tracing::warn!("Abandoned call task failed: {}", e);
            }
        }
    }

    fn record(&self, metrics: InferenceMetrics) {
        self.update_status(|s| s.metrics.push(metrics));
    }

    fn update_status<F: FnOnce(&mut StatusCell)>(&self, edit: F) {
        let mut cell = self.status_cell();
        edit(&mut cell);
    }

    fn consider_switch(&self, active_mode: AccelerationMode, latest: &InferenceMetrics) {
        let (has_gpu, recent) = {
            let cell = self.status_cell();
            (
                cell.capabilities.as_ref().is_some_and(|c| c.has_gpu),
                cell.metrics.recent(cell.metrics.capacity()),
            )
        };
        let Some(target) =
            adaptive_switch(active_mode, has_gpu, latest, &recent, &self.inner.policy)
        else {
            return;
        };

        let mut slot = self.retune_slot();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Re-tune already pending, skipping");
            return;
        }

        tracing::warn!(
            "Slow inference in {}; switching to {} for subsequent requests",
            active_mode,
            target
        );
        let this = self.clone();
        *slot = Some(tokio::spawn(async move { this.retune(target).await }));
    }

    /// Rebuild the engine in `target`. Failures fall back to the previous
    /// mode and are only logged.
    async fn retune(&self, target: AccelerationMode) {
        let mut state = self.inner.engine.lock().await;
        let previous = match &*state {
            EngineState::Ready(active) if active.mode != target => active.clone(),
            _ => return,
        };

        close_handle(previous.handle.clone()).await;
        self.finish_abandoned().await;

        match self.construct(&previous.model_path, target).await {
            Ok(handle) => {
                *state = EngineState::Ready(ActiveEngine {
                    handle,
                    mode: target,
                    model_path: previous.model_path.clone(),
                });
                self.update_status(|s| s.active_mode = Some(target));
                tracing::info!("Switched acceleration from {} to {}", previous.mode, target);
            }
            Err(e) => {
                tracing::warn!(
                    "Adaptive switch to {} failed: {}; restoring {}",
                    target,
                    e,
                    previous.mode
                );
                match self.construct(&previous.model_path, previous.mode).await {
                    Ok(handle) => {
                        *state = EngineState::Ready(ActiveEngine {
                            handle,
                            mode: previous.mode,
                            model_path: previous.model_path.clone(),
                        });
                    }
                    Err(restore_err) => {
                        tracing::error!(
                            "Could not restore {} after failed switch: {}",
                            previous.mode,
                            restore_err
                        );
                        *state = EngineState::Failed(restore_err.to_string());
                        self.update_status(|s| {
                            s.phase = EnginePhase::Failed;
                            s.active_mode = None;
                            s.last_error = Some(restore_err.to_string());
                        });
                    }
                }
            }
        }
    }

    /// Wait for a pending background re-tune, if any.
    pub async fn settle(&self) {
        let pending = self.retune_slot().take();
        if let Some(handle) = pending {
            if let Err(e) = handle.await {
                tracing::warn!("Background re-tune task failed: {}", e);
            }
        }
    }

    /// Current status. Never waits on an in-flight call and performs no I/O.
    pub fn status(&self) -> EngineStatus {
        let window = self.inner.policy.status_window;
        let cell = self.status_cell();
        EngineStatus {
            is_ready: cell.phase == EnginePhase::Ready,
            phase: cell.phase,
            active_mode: cell.active_mode,
            average_latency_ms: cell.metrics.average_latency_ms(window),
            success_rate: cell.metrics.success_rate(window),
            device_description: cell
                .capabilities
                .as_ref()
                .map(|c| c.description())
                .unwrap_or_else(|| "Device capabilities not analyzed yet".to_string()),
            last_error: cell.last_error.clone(),
            abandoned_calls: cell.abandoned_calls,
        }
    }

    /// Release the engine, clear metrics and return to `Uninitialized`.
    /// Safe to call repeatedly and from any state.
    pub async fn cleanup(&self) {
        self.settle().await;

        let mut state = self.inner.engine.lock().await;
        if let EngineState::Ready(active) =
            std::mem::replace(&mut *state, EngineState::Uninitialized)
        {
            close_handle(active.handle).await;
            tracing::info!("Engine released");
        }
        self.finish_abandoned().await;

        self.update_status(|s| {
            s.phase = EnginePhase::Uninitialized;
            s.active_mode = None;
            s.metrics.clear();
            s.last_error = None;
        });
    }
}

async fn close_handle(handle: Arc<dyn NativeEngine>) {
    if let Err(e) = tokio::task::spawn_blocking(move || handle.close()).await {
        tracing::warn!("Engine close task failed: {}", e);
    }
}
