// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Single-question tutor command

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{print_json, CommandContext};
use crate::cli::AskArgs;
use crate::engine::{EngineFactory, EngineStatus, ImageInput, InferenceOrchestrator};
use crate::error::{KatalisError, Result};
use crate::hardware::AccelerationMode;
use crate::models::ArtifactSpec;
use crate::tutor::{ContentRepository, InMemoryContentRepository, TutorReply, TutorService};

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AskOutput {
    Success {
        text: String,
        sources: Vec<String>,
        engine: EngineStatus,
    },
    Error {
        message: String,
        engine: EngineStatus,
    },
    Loading,
}

#[cfg(feature = "llama-cpp")]
fn native_factory() -> Result<Arc<dyn EngineFactory>> {
    Ok(Arc::new(crate::engine::LlamaCppEngineFactory::new()?))
}

#[cfg(not(feature = "llama-cpp"))]
fn native_factory() -> Result<Arc<dyn EngineFactory>> {
    Err(KatalisError::EngineInit(
        "this build has no native inference engine. Rebuild with `cargo build --features llama-cpp` \
         and point --model-path at a compatible model file"
            .to_string(),
    ))
}

/// Execute the ask command with the native engine
pub async fn execute(args: &AskArgs, ctx: &CommandContext) -> Result<()> {
    let factory = native_factory()?;
    run_with_factory(args, ctx, factory).await
}

/// Fail early when the configured model format is one `factory` cannot load.
fn check_model_format(factory: &dyn EngineFactory, spec: &ArtifactSpec) -> Result<()> {
    let Some(format) = factory.model_format() else {
        return Ok(());
    };
    if spec.extension.eq_ignore_ascii_case(format) {
        return Ok(());
    }
    Err(KatalisError::Config(format!(
        "the {} engine loads .{} models, but the model settings expect .{} ({}). \
         Set model.file_name, model.extension, model.min_size_bytes and model.max_size_bytes \
         in settings.json to describe your .{} file",
        factory.name(),
        format,
        spec.extension,
        spec.file_name,
        format
    )))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Run one question through a freshly wired tutor using `factory`.
pub async fn run_with_factory(
    args: &AskArgs,
    ctx: &CommandContext,
    factory: Arc<dyn EngineFactory>,
) -> Result<()> {
    check_model_format(factory.as_ref(), &ctx.settings.model)?;

    let content: Arc<dyn ContentRepository> = match &args.content {
        Some(path) => Arc::new(InMemoryContentRepository::from_file(path)?),
        None => Arc::new(InMemoryContentRepository::default()),
    };
    let image = match &args.image {
        Some(path) => Some(ImageInput {
            bytes: tokio::fs::read(path).await?,
            mime_type: mime_for(path).to_string(),
        }),
        None => None,
    };

    let preferences = Arc::new(ctx.preferences());
    let telemetry = Arc::new(ctx.telemetry());
    telemetry.increment_session_count().await?;

    let orchestrator = InferenceOrchestrator::new(
        ctx.prober(),
        Arc::new(ctx.artifacts()?),
        preferences.clone(),
        factory,
        ctx.settings.orchestrator.clone(),
    );

    let mode = orchestrator.initialize().await;
    let mode = match mode {
        Ok(mode) => mode,
        Err(e) => {
            orchestrator.cleanup().await;
            return Err(e);
        }
    };
    tracing::info!("Engine initialized in {}", mode);

    let tutor = TutorService::new(orchestrator.clone(), telemetry, content);
    let reply = tutor
        .respond_in_mode(
            &args.prompt_text(),
            image.as_ref(),
            &[],
            args.acceleration.map(AccelerationMode::from),
        )
        .await;

    orchestrator.settle().await;
    let status = orchestrator.status();
    let show_stats = preferences.current().show_performance_stats;
    orchestrator.cleanup().await;

    if ctx.is_json() {
        let output = match reply {
            TutorReply::Success { text, sources } => AskOutput::Success {
                text,
                sources,
                engine: status,
            },
            TutorReply::Error { message } => AskOutput::Error {
                message,
                engine: status,
            },
            TutorReply::Loading => AskOutput::Loading,
        };
        return print_json(&output);
    }

    match reply {
        TutorReply::Success { text, sources } => {
            println!("{}", text);
            if !sources.is_empty() {
                println!("\nSources: {}", sources.join(", "));
            }
        }
        TutorReply::Error { message } => {
            eprintln!("✗ {}", message);
        }
        TutorReply::Loading => {
            eprintln!("The engine is still loading, try again shortly");
        }
    }

    if show_stats {
        println!(
            "\n[{} | {}ms avg | {:.0}% success]",
            status
                .active_mode
                .map(|m| m.description())
                .unwrap_or("not ready"),
            status.average_latency_ms,
            status.success_rate * 100.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extensions() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn test_model_format_must_match_settings() {
        use crate::engine::MockEngineFactory;

        let gguf_only = MockEngineFactory::new().with_model_format("gguf");
        let err = check_model_format(&gguf_only, &ArtifactSpec::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(".gguf"));
        assert!(message.contains("model.extension"));

        let gguf = ArtifactSpec {
            file_name: "tutor.gguf".to_string(),
            extension: "GGUF".to_string(),
            ..ArtifactSpec::default()
        };
        assert!(check_model_format(&gguf_only, &gguf).is_ok());
        assert!(check_model_format(&MockEngineFactory::new(), &ArtifactSpec::default()).is_ok());
    }

    #[cfg(not(feature = "llama-cpp"))]
    #[test]
    fn test_without_native_engine_explains_feature() {
        let err = native_factory().err().unwrap();
        assert!(err.to_string().contains("--features llama-cpp"));
    }
}
