// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Katalis - on-device tutor inference tooling
//!
//! Entry point for the `katalis` CLI.

use anyhow::Context;
use clap::Parser;

use katalis::cli::{Cli, Commands};
use katalis::commands::{self, CommandContext};
use katalis::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing. `RUST_LOG` still takes precedence over `-v`.
    let mut env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        if let Ok(parsed) = format!("katalis={}", level).parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load().context("failed to load settings")?,
    };
    settings
        .ensure_directories()
        .context("failed to create the katalis home directory")?;

    let ctx = CommandContext::new(
        settings,
        cli.device_profile.as_deref(),
        cli.model_path.clone(),
        cli.format.clone(),
    )
    .context("failed to read the device profile")?;

    let result = match &cli.command {
        Commands::Probe => commands::probe::execute(&ctx).await,
        Commands::Model(args) => commands::model::execute(&args.command, &ctx).await,
        Commands::Ask(args) => commands::ask::execute(args, &ctx).await,
        Commands::Stats(args) => commands::stats::execute(&args.command, &ctx).await,
        Commands::Prefs(args) => commands::prefs::execute(&args.command, &ctx).await,
    };

    if let Err(e) = &result {
        eprintln!("{}", e.remediation());
    }
    Ok(result?)
}
