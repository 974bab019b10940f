// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Inference engine orchestration
//!
//! The native engine sits behind the `EngineFactory` / `NativeEngine`
//! traits. `InferenceOrchestrator` owns the single live handle and decides
//! which acceleration mode it runs in.
//!
//! ```rust,ignore
//! use katalis::engine::{InferenceOrchestrator, MockEngineFactory, OrchestratorPolicy};
//!
//! let orchestrator = InferenceOrchestrator::new(
//!     prober,
//!     artifacts,
//!     preferences,
//!     Arc::new(MockEngineFactory::new()),
//!     OrchestratorPolicy::default(),
//! );
//! orchestrator.initialize().await?;
//! let reply = orchestrator.generate_text_response("What is a vector?", &[], None).await;
//! ```

#[cfg(feature = "llama-cpp")]
pub mod llama_cpp;
pub mod metrics;
pub mod mock;
pub mod native;
pub mod orchestrator;
pub mod prompt;
pub mod selection;

#[cfg(feature = "llama-cpp")]
pub use llama_cpp::LlamaCppEngineFactory;
pub use metrics::{InferenceMetrics, MetricsRing, TIMEOUT_MARKER};
pub use mock::MockEngineFactory;
pub use native::{CancelFlag, EngineFactory, EngineOptions, NativeEngine};
pub use orchestrator::{
    EnginePhase, EngineResult, EngineStatus, ImageInput, InferenceOrchestrator,
    IMAGE_PROMPT_PREFIX,
};
pub use prompt::{PromptBuilder, TUTOR_PERSONA};
pub use selection::{adaptive_switch, engine_failure_hint, select_acceleration, OrchestratorPolicy};
