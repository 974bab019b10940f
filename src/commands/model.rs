// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model artifact commands

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{print_json, CommandContext};
use crate::cli::ModelCommand;
use crate::error::Result;
use crate::models::ProgressFn;

#[derive(Serialize)]
struct SearchPath {
    path: PathBuf,
    exists: bool,
    valid: bool,
}

#[derive(Serialize)]
struct ChecksumReport {
    path: PathBuf,
    sha256: String,
    expected: Option<String>,
    matches: Option<bool>,
}

/// Execute a model subcommand
pub async fn execute(command: &ModelCommand, ctx: &CommandContext) -> Result<()> {
    match command {
        ModelCommand::Info => info(ctx),
        ModelCommand::Paths => paths(ctx),
        ModelCommand::Validate { path } => validate(ctx, path),
        ModelCommand::Stage => stage(ctx).await,
        ModelCommand::Checksum { path, expected } => checksum(ctx, path, expected.clone()).await,
    }
}

fn info(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.artifacts()?;
    let info = manager.model_info();
    if ctx.is_json() {
        return print_json(&info);
    }

    println!("\n=== Model ===\n");
    println!("File: {}", manager.spec().file_name);
    match &info.active_path {
        Some(path) => println!("Active: {}", path.display()),
        None => println!("Active: none (run `katalis model stage`)"),
    }
    if let Some(path) = &info.manual_override {
        println!("Manual override: {}", path.display());
    }
    println!("Found: {}", if info.model_found { "yes" } else { "no" });
    println!("Valid: {}", if info.is_valid { "yes" } else { "no" });
    println!("\nRequirements:\n{}", manager.spec().requirements());
    Ok(())
}

fn paths(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.artifacts()?;
    let entries: Vec<SearchPath> = manager
        .search_paths()
        .into_iter()
        .map(|path| SearchPath {
            exists: path.exists(),
            valid: manager.validate(&path).is_valid(),
            path,
        })
        .collect();

    if ctx.is_json() {
        return print_json(&entries);
    }

    println!("\n=== Model Search Paths ===\n");
    for (i, entry) in entries.iter().enumerate() {
        let mark = match (entry.exists, entry.valid) {
            (true, true) => "✓",
            (true, false) => "✗",
            _ => " ",
        };
        println!("  {} {}. {}", mark, i + 1, entry.path.display());
    }
    Ok(())
}

fn validate(ctx: &CommandContext, path: &Path) -> Result<()> {
    let manager = ctx.artifacts()?;
    let validation = manager.validate(path);
    if ctx.is_json() {
        return print_json(&validation);
    }

    match validation.issue() {
        None => println!("✓ {} is a valid model file", path.display()),
        Some(issue) => {
            println!("✗ {}: {}", path.display(), issue);
            println!("\nRequirements:\n{}", manager.spec().requirements());
        }
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        Ok(style) => bar.set_style(style.progress_chars("#>-")),
        Err(e) => tracing::debug!("Progress template rejected: {}", e),
    }
    bar
}

async fn stage(ctx: &CommandContext) -> Result<()> {
    let bar = progress_bar();
    let report = bar.clone();
    let progress: Arc<ProgressFn> = Arc::new(move |copied, total| {
        report.set_length(total);
        report.set_position(copied);
    });

    let manager = ctx.artifacts()?.with_progress(progress);
    let result = manager.ensure_available().await;
    bar.finish_and_clear();
    let path = result?;

    if ctx.is_json() {
        return print_json(&manager.model_info());
    }
    println!("✓ Model ready at {}", path.display());
    Ok(())
}

async fn checksum(ctx: &CommandContext, path: &Path, expected: Option<String>) -> Result<()> {
    let manager = ctx.artifacts()?;
    let sha256 = manager.checksum(path).await?;
    let expected = expected.or_else(|| manager.spec().sha256.clone());
    let matches = expected
        .as_ref()
        .map(|e| e.trim().eq_ignore_ascii_case(&sha256));

    if ctx.is_json() {
        return print_json(&ChecksumReport {
            path: path.to_path_buf(),
            sha256,
            expected,
            matches,
        });
    }

    println!("{}  {}", sha256, path.display());
    match matches {
        Some(true) => println!("✓ Checksum matches"),
        Some(false) => println!("✗ Checksum does not match the expected digest"),
        None => {}
    }
    Ok(())
}
