// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model artifact management
//!
//! The model is a single multi-gigabyte file. It is resolved from (in order)
//! a manual override, the canonical internal copy, external candidate
//! folders and finally the bundled assets, then staged into the canonical
//! location with a bounded-memory copy.
//!
//! ```rust,ignore
//! use katalis::models::{ArtifactLayout, ArtifactManager, ArtifactSpec};
//!
//! let manager = ArtifactManager::new(layout, ArtifactSpec::default(), device);
//! let path = manager.ensure_available().await?;
//! ```

pub mod artifact;
pub mod layout;
pub mod staging;
pub mod validation;

pub use artifact::{ArtifactManager, ModelInfo, OverrideOutcome};
pub use layout::ArtifactLayout;
pub use staging::{sha256_file, stage_copy, ProgressFn, STAGING_BUFFER_BYTES};
pub use validation::{validate_artifact, ArtifactSpec, ArtifactValidation, ValidationIssue};
