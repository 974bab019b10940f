// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Device information sources
//!
//! `DeviceInfoProvider` is the seam between the capability prober and the
//! host. `HostDeviceInfo` reads the running machine; `StaticDeviceInfo` is a
//! fixed, serde-loadable profile used for simulation and tests.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use sysinfo::{Disks, System};

use super::thermal::ThermalLevel;
use super::vendor::HardwareIdentifiers;
use crate::error::{KatalisError, Result};

/// Packed OpenGL ES 3.0 version (`major << 16 | minor`).
pub const GL_ES_VERSION_3_0: u32 = 0x30000;

/// Read-only view of the device's static configuration and power state.
///
/// Every method may fail; callers substitute a conservative default for the
/// failing field. Implementations must never touch a graphics API.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceInfoProvider: Send + Sync {
    fn total_memory_bytes(&self) -> Result<u64>;

    fn available_memory_bytes(&self) -> Result<u64>;

    fn cpu_cores(&self) -> Result<usize>;

    /// Declared OpenGL ES version, packed as `major << 16 | minor`.
    fn gl_es_version(&self) -> Result<u32>;

    /// Whether the platform declares Vulkan support.
    fn has_vulkan_feature(&self) -> Result<bool>;

    fn hardware_identifiers(&self) -> Result<HardwareIdentifiers>;

    /// Free bytes on the volume holding `path`.
    fn available_storage_bytes(&self, path: &Path) -> Result<u64>;

    fn is_power_save_mode(&self) -> Result<bool>;

    fn thermal_level(&self) -> Result<ThermalLevel>;
}

/// Device information read from the running host.
#[derive(Debug, Clone, Default)]
pub struct HostDeviceInfo;

impl HostDeviceInfo {
    pub fn new() -> Self {
        Self
    }

    /// Android system property, if `getprop` is available and the value is set.
    fn system_property(name: &str) -> Option<String> {
        let output = Command::new("getprop").arg(name).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
            .filter(|s| !s.is_empty())
    }

    fn has_vulkan_icd() -> bool {
        ["/usr/share/vulkan/icd.d", "/etc/vulkan/icd.d"]
            .iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flat_map(|entries| entries.flatten())
            .any(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
    }

    #[cfg(target_os = "linux")]
    fn linux_power_save() -> bool {
        if let Some(profile) = Self::read_trimmed("/sys/firmware/acpi/platform_profile") {
            if profile == "low-power" {
                return true;
            }
        }

        let Ok(entries) = std::fs::read_dir("/sys/class/power_supply") else {
            return false;
        };
        entries.flatten().any(|entry| {
            let dir = entry.path();
            let is_battery = Self::read_trimmed(dir.join("type")).as_deref() == Some("Battery");
            let discharging =
                Self::read_trimmed(dir.join("status")).as_deref() == Some("Discharging");
            let capacity = Self::read_trimmed(dir.join("capacity"))
                .and_then(|c| c.parse::<u8>().ok())
                .unwrap_or(100);
            is_battery && discharging && capacity <= 15
        })
    }

    #[cfg(target_os = "macos")]
    fn macos_power_save() -> bool {
        Command::new("pmset")
            .arg("-g")
            .output()
            .ok()
            .map(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .any(|line| line.contains("lowpowermode") && line.trim_end().ends_with('1'))
            })
            .unwrap_or(false)
    }
}

/// Nearest existing ancestor of `path`, canonicalized.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}

impl DeviceInfoProvider for HostDeviceInfo {
    fn total_memory_bytes(&self) -> Result<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        match sys.total_memory() {
            0 => Err(KatalisError::Config("total memory not reported".to_string())),
            bytes => Ok(bytes),
        }
    }

    fn available_memory_bytes(&self) -> Result<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        Ok(sys.available_memory())
    }

    fn cpu_cores(&self) -> Result<usize> {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        match sys.cpus().len() {
            0 => Ok(std::thread::available_parallelism()?.get()),
            n => Ok(n),
        }
    }

    fn gl_es_version(&self) -> Result<u32> {
        Self::system_property("ro.opengles.version")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| KatalisError::Config("OpenGL ES version not declared".to_string()))
    }

    fn has_vulkan_feature(&self) -> Result<bool> {
        if Self::system_property("ro.hardware.vulkan").is_some() {
            return Ok(true);
        }
        Ok(Self::has_vulkan_icd())
    }

    fn hardware_identifiers(&self) -> Result<HardwareIdentifiers> {
        if let Some(hardware) = Self::system_property("ro.hardware") {
            return Ok(HardwareIdentifiers {
                board: Self::system_property("ro.product.board").unwrap_or_default(),
                device: Self::system_property("ro.product.device").unwrap_or_default(),
                hardware,
            });
        }

        let board = Self::read_trimmed("/sys/devices/virtual/dmi/id/board_name")
            .or_else(|| Self::read_trimmed("/proc/device-tree/model"))
            .unwrap_or_default();
        let device = Self::read_trimmed("/proc/device-tree/compatible")
            .map(|s| s.replace('\0', ","))
            .unwrap_or_default();

        let mut sys = System::new();
        sys.refresh_cpu_all();
        let hardware = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_default();

        Ok(HardwareIdentifiers {
            board,
            device,
            hardware,
        })
    }

    fn available_storage_bytes(&self, path: &Path) -> Result<u64> {
        let target = existing_ancestor(path).ok_or_else(|| {
            KatalisError::Config(format!("no existing ancestor for {}", path.display()))
        })?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                KatalisError::Config(format!("no mounted volume holds {}", target.display()))
            })
    }

    fn is_power_save_mode(&self) -> Result<bool> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::linux_power_save())
        }
        #[cfg(target_os = "macos")]
        {
            Ok(Self::macos_power_save())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Ok(false)
        }
    }

    fn thermal_level(&self) -> Result<ThermalLevel> {
        if let Some(status) =
            Self::system_property("debug.thermal.status").and_then(|s| s.parse::<i32>().ok())
        {
            return Ok(ThermalLevel::from_status_code(status));
        }

        #[cfg(target_os = "linux")]
        {
            Ok(super::thermal::read_linux_thermal_level().unwrap_or_default())
        }
        #[cfg(target_os = "macos")]
        {
            Ok(super::thermal::read_macos_thermal_level().unwrap_or_default())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Ok(ThermalLevel::None)
        }
    }
}

/// A fixed device profile, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDeviceInfo {
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub cpu_cores: usize,
    pub gl_es_version: u32,
    pub vulkan: bool,
    pub identifiers: HardwareIdentifiers,
    pub available_storage_bytes: u64,
    pub power_save_mode: bool,
    pub thermal_level: ThermalLevel,
}

const GIB: u64 = 1024 * 1024 * 1024;

impl Default for StaticDeviceInfo {
    /// A mid-range phone with no GPU declared.
    fn default() -> Self {
        Self {
            total_memory_bytes: 8 * GIB,
            available_memory_bytes: 4 * GIB,
            cpu_cores: 8,
            gl_es_version: 0,
            vulkan: false,
            identifiers: HardwareIdentifiers::default(),
            available_storage_bytes: 32 * GIB,
            power_save_mode: false,
            thermal_level: ThermalLevel::None,
        }
    }
}

impl StaticDeviceInfo {
    /// Load a profile from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Device without any GPU signal.
    pub fn cpu_only(total_memory_bytes: u64) -> Self {
        Self {
            total_memory_bytes,
            ..Self::default()
        }
    }

    /// Device declaring GL ES 3.2 and Vulkan with the given identifiers.
    pub fn with_gpu(total_memory_bytes: u64, identifiers: HardwareIdentifiers) -> Self {
        Self {
            total_memory_bytes,
            gl_es_version: 0x30002,
            vulkan: true,
            identifiers,
            ..Self::default()
        }
    }

    pub fn with_available_memory(mut self, bytes: u64) -> Self {
        self.available_memory_bytes = bytes;
        self
    }

    pub fn with_available_storage(mut self, bytes: u64) -> Self {
        self.available_storage_bytes = bytes;
        self
    }

    pub fn with_power_save(mut self, enabled: bool) -> Self {
        self.power_save_mode = enabled;
        self
    }

    pub fn with_thermal(mut self, level: ThermalLevel) -> Self {
        self.thermal_level = level;
        self
    }
}

impl DeviceInfoProvider for StaticDeviceInfo {
    fn total_memory_bytes(&self) -> Result<u64> {
        Ok(self.total_memory_bytes)
    }

    fn available_memory_bytes(&self) -> Result<u64> {
        Ok(self.available_memory_bytes)
    }

    fn cpu_cores(&self) -> Result<usize> {
        Ok(self.cpu_cores)
    }

    fn gl_es_version(&self) -> Result<u32> {
        Ok(self.gl_es_version)
    }

    fn has_vulkan_feature(&self) -> Result<bool> {
        Ok(self.vulkan)
    }

    fn hardware_identifiers(&self) -> Result<HardwareIdentifiers> {
        Ok(self.identifiers.clone())
    }

    fn available_storage_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(self.available_storage_bytes)
    }

    fn is_power_save_mode(&self) -> Result<bool> {
        Ok(self.power_save_mode)
    }

    fn thermal_level(&self) -> Result<ThermalLevel> {
        Ok(self.thermal_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_host_memory_is_reported() {
        let host = HostDeviceInfo::new();
        assert!(host.total_memory_bytes().unwrap() > 0);
        assert!(host.cpu_cores().unwrap() > 0);
    }

    #[test]
    fn test_host_probes_do_not_panic() {
        let host = HostDeviceInfo::new();
        let _ = host.gl_es_version();
        let _ = host.has_vulkan_feature();
        let _ = host.hardware_identifiers();
        let _ = host.is_power_save_mode();
        let _ = host.thermal_level();
    }

    #[test]
    fn test_host_storage_for_missing_child_uses_ancestor() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not").join("yet").join("created");
        let host = HostDeviceInfo::new();
        // A tmpfs or overlay mount may not be listed; only the ancestor lookup is asserted.
        assert_eq!(
            existing_ancestor(&missing),
            Some(dir.path().canonicalize().unwrap())
        );
        let _ = host.available_storage_bytes(&missing);
    }

    #[test]
    fn test_static_profile_defaults() {
        let info = StaticDeviceInfo::default();
        assert_eq!(info.gl_es_version().unwrap(), 0);
        assert!(!info.has_vulkan_feature().unwrap());
        assert_eq!(info.thermal_level().unwrap(), ThermalLevel::None);
    }

    #[test]
    fn test_static_profile_builders() {
        let info = StaticDeviceInfo::with_gpu(12 * GIB, HardwareIdentifiers::new("kalama", "", "qcom"))
            .with_power_save(true)
            .with_thermal(ThermalLevel::Severe)
            .with_available_memory(GIB);
        assert!(info.gl_es_version().unwrap() >= GL_ES_VERSION_3_0);
        assert!(info.is_power_save_mode().unwrap());
        assert_eq!(info.thermal_level().unwrap(), ThermalLevel::Severe);
        assert_eq!(info.available_memory_bytes().unwrap(), GIB);
    }

    #[test]
    fn test_static_profile_from_partial_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(
            &path,
            r#"{"total_memory_bytes": 4294967296, "vulkan": true, "thermal_level": "moderate"}"#,
        )
        .unwrap();

        let info = StaticDeviceInfo::from_file(&path).unwrap();
        assert_eq!(info.total_memory_bytes, 4 * GIB);
        assert!(info.vulkan);
        assert_eq!(info.thermal_level, ThermalLevel::Moderate);
        assert_eq!(info.cpu_cores, 8);
    }
}
