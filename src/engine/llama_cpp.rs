// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! llama.cpp native engine
//!
//! Loads GGUF models through `llama-cpp-2`. GPU acceleration modes offload
//! every layer; CPU_ONLY offloads none. The acceleration is fixed when the
//! model is loaded, so the per-call hint is ignored.
//!
//! Only GGUF files load. The default model settings describe a `.task`
//! bundle, so set `model.file_name`, `model.extension` and the size bounds
//! in settings.json (or pass `--model-path`) before using this backend.
//!
//! ```rust,ignore
//! use katalis::engine::LlamaCppEngineFactory;
//!
//! let factory = LlamaCppEngineFactory::new()?;
//! ```

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::data_array::LlamaTokenDataArray;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::native::{CancelFlag, EngineFactory, EngineOptions, NativeEngine};
use crate::error::{KatalisError, Result};
use crate::hardware::AccelerationMode;

/// Default context size in tokens
const DEFAULT_CONTEXT_SIZE: u32 = 4096;

/// Model file extension understood by llama.cpp
pub const GGUF_EXTENSION: &str = "gguf";

/// Layers offloaded in GPU modes (llama.cpp clamps to the model's depth)
const ALL_LAYERS: u32 = 999;

/// Factory holding the process-wide llama.cpp backend
pub struct LlamaCppEngineFactory {
    backend: Arc<LlamaBackend>,
    context_size: u32,
}

impl LlamaCppEngineFactory {
    /// Initialize the llama.cpp backend. Call once per process.
    pub fn new() -> Result<Self> {
        let backend = LlamaBackend::init().map_err(|e| {
            KatalisError::EngineInit(format!("Failed to initialize llama.cpp backend: {}", e))
        })?;
        Ok(Self {
            backend: Arc::new(backend),
            context_size: DEFAULT_CONTEXT_SIZE,
        })
    }

    pub fn with_context_size(mut self, size: u32) -> Self {
        self.context_size = size;
        self
    }
}

fn gpu_layers_for(mode: AccelerationMode) -> u32 {
    if mode.uses_gpu() {
        ALL_LAYERS
    } else {
        0
    }
}

impl EngineFactory for LlamaCppEngineFactory {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    fn model_format(&self) -> Option<&str> {
        Some(GGUF_EXTENSION)
    }

    fn create(&self, options: &EngineOptions) -> Result<Arc<dyn NativeEngine>> {
        let model_params =
            LlamaModelParams::default().with_n_gpu_layers(gpu_layers_for(options.acceleration));

        let model = LlamaModel::load_from_file(&self.backend, &options.model_path, &model_params)
            .map_err(|e| KatalisError::EngineInit(format!("Failed to load model: {}", e)))?;

        tracing::info!(
            "Loaded {} with {} ({} GPU layers)",
            options.model_path.display(),
            options.acceleration,
            gpu_layers_for(options.acceleration)
        );

        Ok(Arc::new(LlamaCppEngine {
            backend: self.backend.clone(),
            model,
            context_size: self.context_size,
            max_tokens: options.max_tokens,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A loaded llama.cpp model
pub struct LlamaCppEngine {
    backend: Arc<LlamaBackend>,
    model: LlamaModel,
    context_size: u32,
    max_tokens: u32,
    closed: AtomicBool,
}

impl LlamaCppEngine {
    fn generate(&self, prompt: &str, cancel: &CancelFlag) -> Result<String> {
        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(self.context_size));
        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| KatalisError::Inference(format!("Failed to create context: {}", e)))?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| KatalisError::Inference(format!("Failed to tokenize prompt: {}", e)))?;
        if tokens.is_empty() {
            return Ok(String::new());
        }

        let mut batch = LlamaBatch::new(self.context_size as usize, 1);
        let last = tokens.len() - 1;
        for (i, token) in tokens.iter().enumerate() {
            batch
                .add(*token, i as i32, &[0], i == last)
                .map_err(|e| KatalisError::Inference(format!("Prompt exceeds context: {}", e)))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| KatalisError::Inference(format!("Failed to decode prompt: {}", e)))?;

        let mut output = String::new();
        let mut n_cur = tokens.len();

        for _ in 0..self.max_tokens {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            if cancel.is_cancelled() {
                return Err(KatalisError::Inference("generation cancelled".to_string()));
            }

            let candidates = ctx.candidates_ith(batch.n_tokens() - 1);
            let mut data = candidates
                .iter()
                .map(|c| llama_cpp_2::token::data::LlamaTokenData::new(c.id(), c.logit(), 0.0))
                .collect::<Vec<_>>();
            let mut array = LlamaTokenDataArray::from_iter(data.iter_mut(), false);
            let next = array.sample_token(&mut ctx);

            if self.model.is_eog_token(next) {
                break;
            }

            let piece = self
                .model
                .token_to_str(next, Special::Tokenize)
                .map_err(|e| KatalisError::Inference(format!("Failed to decode token: {}", e)))?;
            output.push_str(&piece);

            batch.clear();
            batch
                .add(next, n_cur as i32, &[0], true)
                .map_err(|e| KatalisError::Inference(format!("Context exhausted: {}", e)))?;
            ctx.decode(&mut batch)
                .map_err(|e| KatalisError::Inference(format!("Failed to decode: {}", e)))?;
            n_cur += 1;
        }

        Ok(output.trim_end().to_string())
    }
}

impl NativeEngine for LlamaCppEngine {
    fn complete(
        &self,
        prompt: &str,
        _acceleration: AccelerationMode,
        cancel: &CancelFlag,
    ) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KatalisError::Inference("engine already closed".to_string()));
        }
        self.generate(prompt, cancel)
    }

    /// Stops in-flight generation at the next token; the model itself is
    /// freed when the last handle drops.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layers_for_mode() {
        assert_eq!(gpu_layers_for(AccelerationMode::CpuOnly), 0);
        assert_eq!(gpu_layers_for(AccelerationMode::GpuPreferred), ALL_LAYERS);
        assert_eq!(gpu_layers_for(AccelerationMode::AutoAdaptive), ALL_LAYERS);
    }
}
