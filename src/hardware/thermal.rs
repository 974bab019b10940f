// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Thermal state levels and host readers.

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "macos")]
use std::process::Command;

/// Ordinal thermal state, mirroring the platform power-manager scale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThermalLevel {
    #[default]
    None,
    Light,
    Moderate,
    Severe,
    Critical,
    Emergency,
    Shutdown,
}

impl ThermalLevel {
    /// Map a platform thermal status code (0..=6) onto a level.
    /// Unknown codes are treated as the most severe level.
    pub fn from_status_code(code: i32) -> Self {
        match code {
            i32::MIN..=0 => ThermalLevel::None,
            1 => ThermalLevel::Light,
            2 => ThermalLevel::Moderate,
            3 => ThermalLevel::Severe,
            4 => ThermalLevel::Critical,
            5 => ThermalLevel::Emergency,
            _ => ThermalLevel::Shutdown,
        }
    }

    /// Whether the device is warm enough that GPU work should be avoided.
    pub fn is_hot(&self) -> bool {
        *self >= ThermalLevel::Moderate
    }

    pub fn description(&self) -> &'static str {
        match self {
            ThermalLevel::None => "Cool",
            ThermalLevel::Light => "Slightly Warm",
            ThermalLevel::Moderate => "Warm",
            ThermalLevel::Severe => "Hot",
            ThermalLevel::Critical => "Very Hot",
            ThermalLevel::Emergency => "Emergency",
            ThermalLevel::Shutdown => "Shutdown Risk",
        }
    }
}

impl fmt::Display for ThermalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg_attr(not(any(test, target_os = "linux")), allow(dead_code))]
pub(crate) fn classify_temperature_c(temp: f32) -> ThermalLevel {
    if temp >= 95.0 {
        ThermalLevel::Shutdown
    } else if temp >= 90.0 {
        ThermalLevel::Emergency
    } else if temp >= 85.0 {
        ThermalLevel::Critical
    } else if temp >= 80.0 {
        ThermalLevel::Severe
    } else if temp >= 70.0 {
        ThermalLevel::Moderate
    } else if temp >= 60.0 {
        ThermalLevel::Light
    } else {
        ThermalLevel::None
    }
}

#[cfg_attr(not(any(test, target_os = "linux")), allow(dead_code))]
pub(crate) fn parse_linux_thermal_zone_temp(raw: &str) -> Option<f32> {
    let value: f32 = raw.trim().parse().ok()?;
    if value > 1000.0 {
        Some(value / 1000.0)
    } else {
        Some(value)
    }
}

/// Hottest sysfs thermal zone, if any zone is readable.
#[cfg(target_os = "linux")]
pub(crate) fn read_linux_thermal_level() -> Option<ThermalLevel> {
    let entries = fs::read_dir("/sys/class/thermal").ok()?;
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("thermal_zone"))
        .filter_map(|e| fs::read_to_string(e.path().join("temp")).ok())
        .filter_map(|raw| parse_linux_thermal_zone_temp(&raw))
        .map(classify_temperature_c)
        .max()
}

#[cfg(target_os = "macos")]
pub(crate) fn read_macos_thermal_level() -> Option<ThermalLevel> {
    let output = Command::new("pmset").args(["-g", "therm"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let speed_limit = parse_macos_cpu_speed_limit(&stdout)?;
    Some(level_from_speed_limit(speed_limit))
}

#[cfg_attr(not(any(test, target_os = "macos")), allow(dead_code))]
fn level_from_speed_limit(speed_limit: u8) -> ThermalLevel {
    match speed_limit {
        0..=49 => ThermalLevel::Critical,
        50..=69 => ThermalLevel::Severe,
        70..=84 => ThermalLevel::Moderate,
        85..=99 => ThermalLevel::Light,
        _ => ThermalLevel::None,
    }
}

#[cfg_attr(not(any(test, target_os = "macos")), allow(dead_code))]
fn parse_macos_cpu_speed_limit(output: &str) -> Option<u8> {
    output.lines().find_map(|line| {
        if !line.contains("CPU_Speed_Limit") {
            return None;
        }
        let value = line.split('=').nth(1)?.trim();
        value.parse::<u8>().ok()
    })
}
