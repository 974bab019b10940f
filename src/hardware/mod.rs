// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Device capability probing
//!
//! Inspects RAM, CPU, GPU signals, storage, power and thermal state and turns
//! them into a `CapabilitySnapshot` with a recommended acceleration mode.

pub mod capability;
pub mod detector;
pub mod thermal;
pub mod vendor;

pub use capability::*;
pub use detector::*;
pub use thermal::*;
pub use vendor::*;
