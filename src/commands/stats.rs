// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Performance statistics commands

use serde::Serialize;

use super::{print_json, CommandContext};
use crate::cli::StatsCommand;
use crate::error::Result;
use crate::telemetry::PerformanceStats;

#[derive(Serialize)]
struct StatsReport {
    stats: PerformanceStats,
    success_rate: f64,
    preferred_acceleration: &'static str,
    session_count: u64,
}

/// Execute a stats subcommand
pub async fn execute(command: &StatsCommand, ctx: &CommandContext) -> Result<()> {
    let telemetry = ctx.telemetry();
    match command {
        StatsCommand::Show => {
            let stats = telemetry.stats().await;
            let session_count = telemetry.session_count().await;
            if ctx.is_json() {
                return print_json(&StatsReport {
                    success_rate: stats.success_rate(),
                    preferred_acceleration: stats.preferred_acceleration(),
                    session_count,
                    stats,
                });
            }
            println!("{}", stats.summary());
            println!("• Sessions: {}", session_count);
            println!(
                "• Last updated: {}",
                stats.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        StatsCommand::Insights => {
            let stats = telemetry.stats().await;
            let prober = ctx.prober();
            let snapshot = tokio::task::spawn_blocking(move || prober.analyze())
                .await
                .map_err(|e| crate::error::KatalisError::Task(e.to_string()))?;
            let insights = telemetry.generate_insights(&stats, &snapshot).await;
            if ctx.is_json() {
                return print_json(&insights);
            }
            println!("\n=== {} ===\n", insights.recommendation);
            println!("{}", insights.reasoning);
            if !insights.tips.is_empty() {
                println!();
                for tip in &insights.tips {
                    println!("  • {}", tip);
                }
            }
            println!("\n{}", insights.summary);
        }
        StatsCommand::Clear => {
            telemetry.clear_stats().await?;
            if ctx.is_json() {
                return print_json(&serde_json::json!({ "cleared": true }));
            }
            println!("✓ Performance statistics cleared");
        }
    }
    Ok(())
}
