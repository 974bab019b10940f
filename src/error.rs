// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Katalis
//!
//! Every variant carries enough detail (paths, expected vs. actual sizes,
//! required vs. available bytes) for an operator to act on it without
//! reading logs.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ValidationIssue;

/// Main error type for Katalis operations
#[derive(Error, Debug)]
pub enum KatalisError {
    /// Not enough free memory to safely stage or load the model
    #[error(
        "Insufficient memory for the model. Available: {}MB, required: ~{}MB. Close other apps and retry.",
        available_bytes / 1_048_576,
        required_bytes / 1_048_576
    )]
    InsufficientMemory {
        available_bytes: u64,
        required_bytes: u64,
    },

    /// Not enough free storage to stage the model
    #[error(
        "Insufficient storage to stage the model. Available: {}MB, required: {}MB. Free up space and retry.",
        available_bytes / 1_048_576,
        required_bytes / 1_048_576
    )]
    InsufficientStorage {
        available_bytes: u64,
        required_bytes: u64,
    },

    /// Model artifact was not found at any candidate location
    #[error("{}", render_not_found(searched, requirements))]
    ArtifactNotFound {
        searched: Vec<PathBuf>,
        requirements: String,
    },

    /// A specific artifact file failed validation
    #[error("Model validation failed for {}: {issue}", path.display())]
    ArtifactInvalid { path: PathBuf, issue: ValidationIssue },

    /// Staged copy does not match its source
    #[error(
        "Copy failed: size mismatch after transfer to {} (expected {expected_bytes} bytes, got {actual_bytes} bytes)",
        path.display()
    )]
    CopyMismatch {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    /// Native engine construction failed
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// Inference requested before a successful initialize()
    #[error("Engine not initialized")]
    EngineNotInitialized,

    /// Native completion call failed
    #[error("Generation failed: {0}")]
    Inference(String),

    /// Deadline elapsed before the native call returned
    #[error("Response generation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failed to complete (panic or cancellation)
    #[error("Task error: {0}")]
    Task(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KatalisError {
    /// Short remediation hint shown next to user-facing failures.
    pub fn remediation(&self) -> &'static str {
        match self {
            KatalisError::InsufficientMemory { .. } => {
                "Close background apps to free memory, then try again."
            }
            KatalisError::InsufficientStorage { .. } => {
                "Free up internal storage so the model can be copied."
            }
            KatalisError::ArtifactNotFound { .. } | KatalisError::ArtifactInvalid { .. } => {
                "Place a valid model file in one of the listed locations or set a manual model path."
            }
            KatalisError::CopyMismatch { .. } => {
                "Re-copy the model file; the transfer was incomplete."
            }
            KatalisError::EngineInit(_) => {
                "Switch to Battery Saver mode to force CPU inference, or re-download the model."
            }
            KatalisError::EngineNotInitialized => "Initialize the engine before asking questions.",
            KatalisError::Timeout { .. } => {
                "Increase the maximum inference time in performance settings or ask a shorter question."
            }
            KatalisError::Inference(_) => "Try again; switch to Battery Saver mode if it keeps failing.",
            KatalisError::Config(_) => "Check settings.json for invalid values.",
            KatalisError::Task(_) | KatalisError::Io(_) | KatalisError::Json(_) => {
                "Retry the operation; restart the app if the problem persists."
            }
        }
    }
}

fn render_not_found(searched: &[PathBuf], requirements: &str) -> String {
    let mut out = String::from("Model file not found. Place it in one of these locations:\n");
    for path in searched {
        out.push_str("   • ");
        out.push_str(&path.display().to_string());
        out.push('\n');
    }
    out.push_str("Requirements:\n");
    out.push_str(requirements);
    out
}

/// Result type alias for Katalis operations
pub type Result<T> = std::result::Result<T, KatalisError>;
