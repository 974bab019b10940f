// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Performance preference commands

use super::{print_json, CommandContext};
use crate::cli::{PrefsCommand, PrefsSetArgs};
use crate::config::{PerformanceMode, PerformanceSettings};
use crate::error::{KatalisError, Result};

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_settings(settings: &PerformanceSettings) {
    println!("\n=== Performance Preferences ===\n");
    println!("Mode: {}", settings.performance_mode);
    println!(
        "GPU in power saving: {}",
        yes_no(settings.allow_gpu_when_battery_low)
    );
    println!("GPU when hot: {}", yes_no(settings.allow_gpu_when_hot));
    println!("Show stats: {}", yes_no(settings.show_performance_stats));
    println!("Adaptive switching: {}", yes_no(settings.adaptive_mode));
    println!("Max response time: {}ms", settings.max_inference_time_ms);
}

/// Fold the given flags into `settings`.
fn apply(args: &PrefsSetArgs, settings: &mut PerformanceSettings) {
    if let Some(mode) = args.mode {
        settings.performance_mode = PerformanceMode::from(mode);
    }
    if let Some(v) = args.allow_gpu_battery_low {
        settings.allow_gpu_when_battery_low = v;
    }
    if let Some(v) = args.allow_gpu_hot {
        settings.allow_gpu_when_hot = v;
    }
    if let Some(v) = args.show_stats {
        settings.show_performance_stats = v;
    }
    if let Some(v) = args.adaptive {
        settings.adaptive_mode = v;
    }
    if let Some(ms) = args.timeout_ms {
        settings.max_inference_time_ms = ms;
    }
}

/// Execute a prefs subcommand
pub async fn execute(command: &PrefsCommand, ctx: &CommandContext) -> Result<()> {
    let store = ctx.preferences();
    let settings = match command {
        PrefsCommand::Show => store.current(),
        PrefsCommand::Set(args) => {
            if args.is_empty() {
                return Err(KatalisError::Config(
                    "nothing to change; pass at least one preference flag".to_string(),
                ));
            }
            if args.timeout_ms == Some(0) {
                return Err(KatalisError::Config(
                    "--timeout-ms must be greater than zero".to_string(),
                ));
            }
            store.update(|s| apply(args, s)).await?
        }
        PrefsCommand::Reset => store.reset_to_defaults().await?,
    };

    if ctx.is_json() {
        return print_json(&settings);
    }
    print_settings(&settings);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PerformanceModeArg;

    #[test]
    fn test_apply_only_touches_given_flags() {
        let mut settings = PerformanceSettings::default();
        let args = PrefsSetArgs {
            mode: Some(PerformanceModeArg::Performance),
            timeout_ms: Some(4000),
            ..Default::default()
        };
        apply(&args, &mut settings);

        assert_eq!(settings.performance_mode, PerformanceMode::Performance);
        assert_eq!(settings.max_inference_time_ms, 4000);
        assert!(settings.adaptive_mode);
        assert!(!settings.allow_gpu_when_hot);
    }
}
