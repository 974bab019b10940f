// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Katalis - device-adaptive on-device inference for a tutoring app.
//!
//! This crate exposes the runtime used by the `katalis` CLI (`src/main.rs`)
//! and by any host application embedding the tutor.
//!
//! Architecture highlights:
//! - `hardware`: capability probing and the acceleration recommendation
//! - `models`: locating, validating and staging the model artifact
//! - `engine`: native engine boundary and the inference orchestrator
//! - `telemetry`: durable cross-session performance statistics and advice
//! - `config`, `storage`: settings, performance preferences, JSON namespaces
//! - `tutor`: retrieval-grounded tutoring on top of the orchestrator

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod models;
pub mod storage;
pub mod telemetry;
pub mod tutor;

pub use error::{KatalisError, Result};
