// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Device capability probe command

use serde::Serialize;

use super::{mib, print_json, CommandContext};
use crate::engine::select_acceleration;
use crate::error::Result;
use crate::hardware::{AccelerationMode, CapabilitySnapshot};

#[derive(Serialize)]
struct ProbeReport {
    capabilities: CapabilitySnapshot,
    selected_mode: AccelerationMode,
    performance_mode: String,
    description: String,
}

/// Execute the probe command
pub async fn execute(ctx: &CommandContext) -> Result<()> {
    let prober = ctx.prober();
    let snapshot = tokio::task::spawn_blocking(move || prober.analyze())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Capability probe task failed: {}", e);
            CapabilitySnapshot::conservative()
        });
    let settings = ctx.preferences().current();
    let selected = select_acceleration(&snapshot, &settings, &ctx.settings.capability);

    if ctx.is_json() {
        return print_json(&ProbeReport {
            description: snapshot.description(),
            capabilities: snapshot,
            selected_mode: selected,
            performance_mode: settings.performance_mode.display_name().to_string(),
        });
    }

    println!("\n=== Katalis Device Profile ===\n");
    println!("{}", snapshot.description());
    println!("\n=== Acceleration ===");
    println!("Recommended by device: {}", snapshot.recommended_mode.description());
    println!(
        "Selected for {} mode: {}",
        settings.performance_mode.display_name(),
        selected.description()
    );
    if snapshot.has_gpu {
        println!("Estimated VRAM: {}MB", mib(snapshot.estimated_vram_bytes));
    }
    if snapshot.low_power_mode && !settings.allow_gpu_when_battery_low {
        println!("  ✗ Power saving is on; GPU use is blocked until it is off");
    }
    if snapshot.thermal_level.is_hot() && !settings.allow_gpu_when_hot {
        println!("  ✗ Device is {}; GPU use is blocked until it cools", snapshot.thermal_level);
    }
    Ok(())
}
