// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module for Katalis
//!
//! Handles loading, saving, and managing settings and performance preferences.

pub mod preferences;
pub mod settings;

pub use preferences::*;
pub use settings::*;
