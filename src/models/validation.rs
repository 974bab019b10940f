// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Artifact spec and the cheap per-file validation rule

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Bytes read from the head of a candidate as a corruption check.
const HEADER_PROBE_BYTES: usize = 1024;

/// Identity and acceptance rules for the model artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSpec {
    pub file_name: String,
    /// Expected extension, without the dot
    pub extension: String,
    /// Inclusive lower bound on file size
    pub min_size_bytes: u64,
    /// Inclusive upper bound on file size
    pub max_size_bytes: u64,
    /// Available system memory required before staging or loading
    pub min_available_memory_bytes: u64,
    /// Optional SHA-256 (lowercase hex) for explicit verification
    pub sha256: Option<String>,
}

impl Default for ArtifactSpec {
    fn default() -> Self {
        Self {
            file_name: "gemma-3n-E2B-it-int4.task".to_string(),
            extension: "task".to_string(),
            min_size_bytes: 2_900_000_000,
            max_size_bytes: 3_200_000_000,
            min_available_memory_bytes: 3_000_000_000,
            sha256: None,
        }
    }
}

impl ArtifactSpec {
    /// Whether `size` is within the accepted range.
    pub fn accepts_size(&self, size: u64) -> bool {
        (self.min_size_bytes..=self.max_size_bytes).contains(&size)
    }

    /// Operator-facing requirements, one bullet per rule.
    pub fn requirements(&self) -> String {
        format!(
            "   • File name: {}\n   • Format: .{}\n   • File size: {}-{} bytes ({:.1}-{:.1}GB)\n   • Free memory: at least {}MB",
            self.file_name,
            self.extension,
            self.min_size_bytes,
            self.max_size_bytes,
            self.min_size_bytes as f64 / 1e9,
            self.max_size_bytes as f64 / 1e9,
            self.min_available_memory_bytes / 1_048_576,
        )
    }
}

/// Why a candidate file was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    NotFound,
    NotAFile,
    Unreadable { reason: String },
    WrongExtension { expected: String, actual: String },
    SizeOutOfRange { actual: u64, min: u64, max: u64 },
    Corrupted { reason: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NotFound => write!(f, "file does not exist"),
            ValidationIssue::NotAFile => write!(f, "path is not a regular file"),
            ValidationIssue::Unreadable { reason } => write!(f, "file is not readable: {}", reason),
            ValidationIssue::WrongExtension { expected, actual } => {
                write!(f, "invalid format: expected .{}, found '{}'", expected, actual)
            }
            ValidationIssue::SizeOutOfRange { actual, min, max } => write!(
                f,
                "invalid size: {} bytes (expected {}-{} bytes)",
                actual, min, max
            ),
            ValidationIssue::Corrupted { reason } => {
                write!(f, "file appears corrupted: {}", reason)
            }
        }
    }
}

/// Outcome of validating one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactValidation {
    Valid { size_bytes: u64 },
    Invalid { issue: ValidationIssue },
}

impl ArtifactValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, ArtifactValidation::Valid { .. })
    }

    pub fn issue(&self) -> Option<&ValidationIssue> {
        match self {
            ArtifactValidation::Valid { .. } => None,
            ArtifactValidation::Invalid { issue } => Some(issue),
        }
    }

    fn invalid(issue: ValidationIssue) -> Self {
        ArtifactValidation::Invalid { issue }
    }
}

/// Validate a candidate artifact: exists, readable, expected extension,
/// size in range, and the first kilobyte readable. Reads at most 1 KiB.
pub fn validate_artifact(path: &Path, spec: &ArtifactSpec) -> ArtifactValidation {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return ArtifactValidation::invalid(ValidationIssue::NotFound)
        }
        Err(e) => {
            return ArtifactValidation::invalid(ValidationIssue::Unreadable {
                reason: e.to_string(),
            })
        }
    };

    if !metadata.is_file() {
        return ArtifactValidation::invalid(ValidationIssue::NotAFile);
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            return ArtifactValidation::invalid(ValidationIssue::Unreadable {
                reason: e.to_string(),
            })
        }
    };

    let actual_ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    if !actual_ext.eq_ignore_ascii_case(&spec.extension) {
        return ArtifactValidation::invalid(ValidationIssue::WrongExtension {
            expected: spec.extension.clone(),
            actual: actual_ext,
        });
    }

    let size = metadata.len();
    if !spec.accepts_size(size) {
        tracing::debug!(
            "Rejecting {}: {} bytes outside {}-{}",
            path.display(),
            size,
            spec.min_size_bytes,
            spec.max_size_bytes
        );
        return ArtifactValidation::invalid(ValidationIssue::SizeOutOfRange {
            actual: size,
            min: spec.min_size_bytes,
            max: spec.max_size_bytes,
        });
    }

    let mut header = [0u8; HEADER_PROBE_BYTES];
    let want = HEADER_PROBE_BYTES.min(size as usize);
    let mut read = 0;
    while read < want {
        match file.read(&mut header[read..want]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return ArtifactValidation::invalid(ValidationIssue::Corrupted {
                    reason: e.to_string(),
                })
            }
        }
    }
    if read < want {
        return ArtifactValidation::invalid(ValidationIssue::Corrupted {
            reason: format!("header truncated after {} bytes", read),
        });
    }

    ArtifactValidation::Valid { size_bytes: size }
}
