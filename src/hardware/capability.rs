// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Capability snapshot and acceleration recommendation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::detector::{DeviceInfoProvider, GL_ES_VERSION_3_0};
use super::thermal::ThermalLevel;
use super::vendor::{classify_gpu, HardwareIdentifiers, VendorTier};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Hardware execution path for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccelerationMode {
    CpuOnly,
    GpuPreferred,
    GpuWithCpuFallback,
    AutoAdaptive,
}

impl AccelerationMode {
    /// Whether this mode runs (or may run) on the GPU.
    pub fn uses_gpu(&self) -> bool {
        !matches!(self, AccelerationMode::CpuOnly)
    }

    pub fn description(&self) -> &'static str {
        match self {
            AccelerationMode::CpuOnly => "CPU only",
            AccelerationMode::GpuPreferred => "GPU preferred",
            AccelerationMode::GpuWithCpuFallback => "GPU with CPU fallback",
            AccelerationMode::AutoAdaptive => "Auto adaptive",
        }
    }
}

impl fmt::Display for AccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelerationMode::CpuOnly => write!(f, "CPU_ONLY"),
            AccelerationMode::GpuPreferred => write!(f, "GPU_PREFERRED"),
            AccelerationMode::GpuWithCpuFallback => write!(f, "GPU_WITH_CPU_FALLBACK"),
            AccelerationMode::AutoAdaptive => write!(f, "AUTO_ADAPTIVE"),
        }
    }
}

/// Thresholds for the GPU recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPolicy {
    /// Below this much total RAM the GPU is never recommended
    pub min_total_ram_bytes: u64,
    /// Below this estimated VRAM the GPU is never recommended
    pub min_vram_bytes: u64,
    /// Unclassified chipsets with at least this much RAM get GPU with fallback
    pub high_ram_bytes: u64,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            min_total_ram_bytes: 6 * GIB,
            min_vram_bytes: 512 * MIB,
            high_ram_bytes: 8 * GIB,
        }
    }
}

/// Point-in-time summary of device hardware, power and thermal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub has_gpu: bool,
    pub estimated_vram_bytes: u64,
    pub cpu_cores: usize,
    pub total_ram_bytes: u64,
    pub available_storage_bytes: u64,
    pub gpu_vendor: String,
    pub vendor_tier: VendorTier,
    pub low_power_mode: bool,
    pub thermal_level: ThermalLevel,
    pub recommended_mode: AccelerationMode,
}

impl CapabilitySnapshot {
    /// Snapshot used when probing is impossible: no GPU, nothing known.
    pub fn conservative() -> Self {
        Self {
            has_gpu: false,
            estimated_vram_bytes: 0,
            cpu_cores: 1,
            total_ram_bytes: 0,
            available_storage_bytes: 0,
            gpu_vendor: "Unknown".to_string(),
            vendor_tier: VendorTier::Unknown,
            low_power_mode: false,
            thermal_level: ThermalLevel::None,
            recommended_mode: AccelerationMode::CpuOnly,
        }
    }

    /// Human-readable multi-line summary.
    pub fn description(&self) -> String {
        let gpu = if self.has_gpu {
            format!("{} (Available)", self.gpu_vendor)
        } else {
            "Not available".to_string()
        };
        format!(
            "Device Capabilities:\n\
             • RAM: {}GB\n\
             • CPU Cores: {}\n\
             • GPU: {}\n\
             • Estimated VRAM: {}MB\n\
             • Available Storage: {}GB\n\
             • Power Save Mode: {}\n\
             • Thermal State: {}\n\
             • Recommended: {}",
            self.total_ram_bytes / GIB,
            self.cpu_cores,
            gpu,
            self.estimated_vram_bytes / MIB,
            self.available_storage_bytes / GIB,
            if self.low_power_mode { "On" } else { "Off" },
            self.thermal_level,
            self.recommended_mode.description(),
        )
    }
}

/// Estimate GPU-usable memory from the RAM bucket and chipset tier.
pub fn estimate_vram(total_ram_bytes: u64, tier: VendorTier) -> u64 {
    let base = match total_ram_bytes {
        r if r >= 12 * GIB => 2 * GIB,
        r if r >= 8 * GIB => GIB,
        r if r >= 6 * GIB => 512 * MIB,
        r if r >= 4 * GIB => 256 * MIB,
        _ => 128 * MIB,
    };
    (base as f64 * tier.vram_multiplier()) as u64
}

/// Recommended acceleration for a snapshot. Reads every field except
/// `recommended_mode`, so identical inputs give identical output.
pub fn recommend(snapshot: &CapabilitySnapshot, policy: &CapabilityPolicy) -> AccelerationMode {
    if !snapshot.has_gpu
        || snapshot.low_power_mode
        || snapshot.thermal_level.is_hot()
        || snapshot.total_ram_bytes < policy.min_total_ram_bytes
        || snapshot.estimated_vram_bytes < policy.min_vram_bytes
    {
        return AccelerationMode::CpuOnly;
    }

    match snapshot.vendor_tier {
        VendorTier::Flagship => AccelerationMode::GpuPreferred,
        VendorTier::MidRange => AccelerationMode::GpuWithCpuFallback,
        VendorTier::Budget | VendorTier::Unknown
            if snapshot.total_ram_bytes >= policy.high_ram_bytes =>
        {
            AccelerationMode::GpuWithCpuFallback
        }
        VendorTier::Budget | VendorTier::Unknown => AccelerationMode::AutoAdaptive,
    }
}

/// Produces capability snapshots from a device information source.
pub struct CapabilityProber {
    provider: Arc<dyn DeviceInfoProvider>,
    storage_root: PathBuf,
    policy: CapabilityPolicy,
}

impl CapabilityProber {
    pub fn new(
        provider: Arc<dyn DeviceInfoProvider>,
        storage_root: impl Into<PathBuf>,
        policy: CapabilityPolicy,
    ) -> Self {
        Self {
            provider,
            storage_root: storage_root.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    /// Probe the device. Never fails: each failing sub-probe is replaced by
    /// the safest value for that field.
    pub fn analyze(&self) -> CapabilitySnapshot {
        let p = &self.provider;

        let total_ram_bytes = p.total_memory_bytes().unwrap_or_else(|e| {
            tracing::warn!("RAM probe failed, assuming none: {}", e);
            0
        });
        let cpu_cores = p.cpu_cores().unwrap_or_else(|e| {
            tracing::warn!("CPU probe failed, assuming one core: {}", e);
            1
        });
        let gl_es = p.gl_es_version().unwrap_or_else(|e| {
            tracing::debug!("GL ES version unavailable: {}", e);
            0
        });
        let vulkan = p.has_vulkan_feature().unwrap_or_else(|e| {
            tracing::debug!("Vulkan feature flag unavailable: {}", e);
            false
        });
        let has_gpu = gl_es >= GL_ES_VERSION_3_0 || vulkan;

        let identifiers = p.hardware_identifiers().unwrap_or_else(|e| {
            tracing::debug!("Hardware identifiers unavailable: {}", e);
            HardwareIdentifiers::default()
        });
        let class = classify_gpu(&identifiers);
        let gpu_vendor = class.vendor.label(&identifiers.hardware);

        let available_storage_bytes = p
            .available_storage_bytes(&self.storage_root)
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Storage probe failed for {}: {}",
                    self.storage_root.display(),
                    e
                );
                0
            });
        let low_power_mode = p.is_power_save_mode().unwrap_or_else(|e| {
            tracing::debug!("Power save state unavailable: {}", e);
            false
        });
        let thermal_level = p.thermal_level().unwrap_or_else(|e| {
            tracing::debug!("Thermal state unavailable: {}", e);
            ThermalLevel::None
        });

        let mut snapshot = CapabilitySnapshot {
            has_gpu,
            estimated_vram_bytes: if has_gpu {
                estimate_vram(total_ram_bytes, class.tier)
            } else {
                0
            },
            cpu_cores,
            total_ram_bytes,
            available_storage_bytes,
            gpu_vendor,
            vendor_tier: class.tier,
            low_power_mode,
            thermal_level,
            recommended_mode: AccelerationMode::CpuOnly,
        };
        snapshot.recommended_mode = recommend(&snapshot, &self.policy);

        tracing::debug!(
            has_gpu,
            vendor = %snapshot.gpu_vendor,
            tier = %snapshot.vendor_tier,
            ram_gb = total_ram_bytes / GIB,
            thermal = %thermal_level,
            recommended = %snapshot.recommended_mode,
            "Device capability analyzed"
        );
        snapshot
    }
}
