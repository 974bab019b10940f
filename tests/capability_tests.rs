// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::sync::Arc;

use katalis::hardware::{
    recommend, AccelerationMode, CapabilityPolicy, CapabilityProber, CapabilitySnapshot,
    DeviceInfoProvider, HardwareIdentifiers, StaticDeviceInfo, ThermalLevel, VendorTier,
};
use katalis::{KatalisError, Result};
use proptest::prelude::*;

const GIB: u64 = 1024 * 1024 * 1024;

fn prober(device: StaticDeviceInfo) -> CapabilityProber {
    CapabilityProber::new(Arc::new(device), "/tmp", CapabilityPolicy::default())
}

/// Every probe fails.
struct BrokenDevice;

impl DeviceInfoProvider for BrokenDevice {
    fn total_memory_bytes(&self) -> Result<u64> {
        Err(KatalisError::Config("no meminfo".into()))
    }
    fn available_memory_bytes(&self) -> Result<u64> {
        Err(KatalisError::Config("no meminfo".into()))
    }
    fn cpu_cores(&self) -> Result<usize> {
        Err(KatalisError::Config("no cpuinfo".into()))
    }
    fn gl_es_version(&self) -> Result<u32> {
        Err(KatalisError::Config("no property service".into()))
    }
    fn has_vulkan_feature(&self) -> Result<bool> {
        Err(KatalisError::Config("no feature list".into()))
    }
    fn hardware_identifiers(&self) -> Result<HardwareIdentifiers> {
        Err(KatalisError::Config("no build info".into()))
    }
    fn available_storage_bytes(&self, _path: &Path) -> Result<u64> {
        Err(KatalisError::Config("no statfs".into()))
    }
    fn is_power_save_mode(&self) -> Result<bool> {
        Err(KatalisError::Config("no power service".into()))
    }
    fn thermal_level(&self) -> Result<ThermalLevel> {
        Err(KatalisError::Config("no thermal service".into()))
    }
}

#[test]
fn test_broken_device_degrades_to_conservative_snapshot() {
    let snapshot = CapabilityProber::new(Arc::new(BrokenDevice), "/tmp", CapabilityPolicy::default())
        .analyze();

    assert!(!snapshot.has_gpu);
    assert_eq!(snapshot.gpu_vendor, "Unknown GPU");
    assert_eq!(snapshot.recommended_mode, AccelerationMode::CpuOnly);
    assert_eq!(snapshot.thermal_level, ThermalLevel::None);
    assert_eq!(snapshot.cpu_cores, 1);
}

#[test]
fn test_gpu_detected_from_vulkan_flag_alone() {
    let device = StaticDeviceInfo {
        vulkan: true,
        gl_es_version: 0x20000,
        total_memory_bytes: 12 * GIB,
        identifiers: HardwareIdentifiers::new("kalama", "", "qcom"),
        ..StaticDeviceInfo::default()
    };
    let snapshot = prober(device).analyze();
    assert!(snapshot.has_gpu);
    assert_eq!(snapshot.recommended_mode, AccelerationMode::GpuPreferred);
}

#[test]
fn test_gl_es_below_three_without_vulkan_is_no_gpu() {
    let device = StaticDeviceInfo {
        gl_es_version: 0x20000,
        total_memory_bytes: 12 * GIB,
        ..StaticDeviceInfo::default()
    };
    assert!(!prober(device).analyze().has_gpu);
}

#[test]
fn test_cpu_gates() {
    let flagship = || {
        StaticDeviceInfo::with_gpu(12 * GIB, HardwareIdentifiers::new("kalama", "", "qcom"))
    };

    let hot = prober(flagship().with_thermal(ThermalLevel::Moderate)).analyze();
    assert_eq!(hot.recommended_mode, AccelerationMode::CpuOnly);

    let warm = prober(flagship().with_thermal(ThermalLevel::Light)).analyze();
    assert_eq!(warm.recommended_mode, AccelerationMode::GpuPreferred);

    let saving = prober(flagship().with_power_save(true)).analyze();
    assert_eq!(saving.recommended_mode, AccelerationMode::CpuOnly);

    let small = prober(StaticDeviceInfo::with_gpu(
        4 * GIB,
        HardwareIdentifiers::new("kalama", "", "qcom"),
    ))
    .analyze();
    assert_eq!(small.recommended_mode, AccelerationMode::CpuOnly);
}

#[test]
fn test_tier_classification() {
    let mid = prober(StaticDeviceInfo::with_gpu(
        8 * GIB,
        HardwareIdentifiers::new("sm7325", "", "qcom"),
    ))
    .analyze();
    assert_eq!(mid.vendor_tier, VendorTier::MidRange);
    assert_eq!(mid.recommended_mode, AccelerationMode::GpuWithCpuFallback);

    let unknown = prober(StaticDeviceInfo::with_gpu(
        6 * GIB,
        HardwareIdentifiers::new("mystery", "", "zz9"),
    ))
    .analyze();
    assert_eq!(unknown.vendor_tier, VendorTier::Unknown);
    assert_eq!(unknown.gpu_vendor, "Unknown GPU (zz9)");
    assert_eq!(unknown.recommended_mode, AccelerationMode::AutoAdaptive);
}

#[test]
fn test_description_mentions_recommendation() {
    let snapshot = prober(StaticDeviceInfo::cpu_only(8 * GIB)).analyze();
    let description = snapshot.description();
    assert!(description.starts_with("Device Capabilities:"));
    assert!(description.contains("RAM: 8GB"));
}

fn thermal_strategy() -> impl Strategy<Value = ThermalLevel> {
    prop_oneof![
        Just(ThermalLevel::None),
        Just(ThermalLevel::Light),
        Just(ThermalLevel::Moderate),
        Just(ThermalLevel::Severe),
        Just(ThermalLevel::Critical),
        Just(ThermalLevel::Emergency),
        Just(ThermalLevel::Shutdown),
    ]
}

fn identifiers_strategy() -> impl Strategy<Value = HardwareIdentifiers> {
    prop_oneof![
        Just(HardwareIdentifiers::new("kalama", "", "qcom")),
        Just(HardwareIdentifiers::new("sm7325", "", "qcom")),
        Just(HardwareIdentifiers::new("msm8953", "", "qcom")),
        Just(HardwareIdentifiers::new("universal2100", "", "exynos2100")),
        Just(HardwareIdentifiers::new("mt6765", "", "mt6765")),
        Just(HardwareIdentifiers::new("", "", "")),
        "[a-z0-9]{0,8}".prop_map(|h| HardwareIdentifiers::new("", "", h)),
    ]
}

prop_compose! {
    fn device_strategy()(
        ram_gib in 1u64..16,
        gl in prop_oneof![Just(0u32), Just(0x20000u32), Just(0x30000u32), Just(0x30002u32)],
        vulkan in any::<bool>(),
        power_save in any::<bool>(),
        thermal in thermal_strategy(),
        identifiers in identifiers_strategy(),
    ) -> StaticDeviceInfo {
        StaticDeviceInfo {
            total_memory_bytes: ram_gib * GIB,
            gl_es_version: gl,
            vulkan,
            power_save_mode: power_save,
            thermal_level: thermal,
            identifiers,
            ..StaticDeviceInfo::default()
        }
    }
}

proptest! {
    #[test]
    fn prop_analyze_is_deterministic(device in device_strategy()) {
        let prober = prober(device);
        let first = prober.analyze();
        let second = prober.analyze();
        prop_assert_eq!(first.recommended_mode, second.recommended_mode);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_cpu_gates_always_win(device in device_strategy()) {
        let snapshot = prober(device).analyze();
        if !snapshot.has_gpu || snapshot.low_power_mode || snapshot.thermal_level.is_hot() {
            prop_assert_eq!(snapshot.recommended_mode, AccelerationMode::CpuOnly);
        }
    }

    #[test]
    fn prop_unknown_hardware_never_gpu_preferred(device in device_strategy()) {
        let snapshot = prober(device).analyze();
        if snapshot.vendor_tier == VendorTier::Unknown {
            prop_assert_ne!(snapshot.recommended_mode, AccelerationMode::GpuPreferred);
        }
    }

    #[test]
    fn prop_recommend_matches_stored_recommendation(device in device_strategy()) {
        let snapshot: CapabilitySnapshot = prober(device).analyze();
        prop_assert_eq!(recommend(&snapshot, &CapabilityPolicy::default()), snapshot.recommended_mode);
    }
}
