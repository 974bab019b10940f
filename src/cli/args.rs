// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for Katalis.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::PerformanceMode;
use crate::hardware::AccelerationMode;

/// Katalis - on-device tutor inference tooling
#[derive(Parser, Debug)]
#[command(name = "katalis")]
#[command(version, about = "Device-adaptive on-device inference for the Katalis tutor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Use a fixed device profile (JSON) instead of probing this host
    #[arg(long, global = true)]
    pub device_profile: Option<PathBuf>,

    /// Manual model path override
    #[arg(long, global = true)]
    pub model_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show device capabilities and the recommended acceleration
    #[command(alias = "hw")]
    Probe,

    /// Model artifact management
    Model(ModelArgs),

    /// Ask the tutor a single question
    Ask(AskArgs),

    /// Durable performance statistics
    Stats(StatsArgs),

    /// Performance preferences
    #[command(alias = "preferences")]
    Prefs(PrefsArgs),
}

/// Arguments for the model subcommand
#[derive(clap::Args, Debug)]
pub struct ModelArgs {
    #[command(subcommand)]
    pub command: ModelCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Show the active model and its validation state
    Info,

    /// List every location searched for the model
    Paths,

    /// Validate a candidate model file
    Validate {
        /// File to check
        path: PathBuf,
    },

    /// Locate the model and stage it into the canonical location
    Stage,

    /// Compute the SHA-256 of a model file
    Checksum {
        /// File to hash
        path: PathBuf,

        /// Expected digest (lowercase hex); defaults to the configured one
        #[arg(long)]
        expected: Option<String>,
    },
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question
    #[arg(required = true)]
    pub prompt: Vec<String>,

    /// Attach an image to the question
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Force an acceleration mode for this request
    #[arg(long)]
    pub acceleration: Option<AccelerationArg>,

    /// Reference articles (JSON array) used to ground the answer
    #[arg(long)]
    pub content: Option<PathBuf>,
}

impl AskArgs {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Arguments for the stats subcommand
#[derive(clap::Args, Debug)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub command: StatsCommand,
}

#[derive(Subcommand, Debug)]
pub enum StatsCommand {
    /// Show the statistics summary
    Show,

    /// Show recommendations derived from the statistics
    Insights,

    /// Reset all statistics
    Clear,
}

/// Arguments for the prefs subcommand
#[derive(clap::Args, Debug)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: PrefsCommand,
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    /// Show current preferences
    Show,

    /// Change one or more preferences
    Set(PrefsSetArgs),

    /// Restore defaults
    Reset,
}

#[derive(clap::Args, Debug, Default)]
pub struct PrefsSetArgs {
    /// Performance mode
    #[arg(long)]
    pub mode: Option<PerformanceModeArg>,

    /// Allow GPU use while in power-saving mode
    #[arg(long)]
    pub allow_gpu_battery_low: Option<bool>,

    /// Allow GPU use while the device is hot
    #[arg(long)]
    pub allow_gpu_hot: Option<bool>,

    /// Show performance statistics after each answer
    #[arg(long)]
    pub show_stats: Option<bool>,

    /// Switch acceleration automatically after slow responses
    #[arg(long)]
    pub adaptive: Option<bool>,

    /// Deadline for one response, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl PrefsSetArgs {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.allow_gpu_battery_low.is_none()
            && self.allow_gpu_hot.is_none()
            && self.show_stats.is_none()
            && self.adaptive.is_none()
            && self.timeout_ms.is_none()
    }
}

/// Performance mode as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerformanceModeArg {
    Auto,
    Performance,
    BatterySaver,
    Manual,
}

impl From<PerformanceModeArg> for PerformanceMode {
    fn from(arg: PerformanceModeArg) -> Self {
        match arg {
            PerformanceModeArg::Auto => PerformanceMode::Auto,
            PerformanceModeArg::Performance => PerformanceMode::Performance,
            PerformanceModeArg::BatterySaver => PerformanceMode::BatterySaver,
            PerformanceModeArg::Manual => PerformanceMode::Manual,
        }
    }
}

/// Acceleration override as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelerationArg {
    Cpu,
    Gpu,
    GpuFallback,
    Adaptive,
}

impl From<AccelerationArg> for AccelerationMode {
    fn from(arg: AccelerationArg) -> Self {
        match arg {
            AccelerationArg::Cpu => AccelerationMode::CpuOnly,
            AccelerationArg::Gpu => AccelerationMode::GpuPreferred,
            AccelerationArg::GpuFallback => AccelerationMode::GpuWithCpuFallback,
            AccelerationArg::Adaptive => AccelerationMode::AutoAdaptive,
        }
    }
}

/// Output format for responses
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Text,

    /// JSON output
    Json,
}
