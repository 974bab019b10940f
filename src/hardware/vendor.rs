// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! GPU vendor classification from hardware identifier strings
//!
//! There is no safe way to query the GPU directly without a rendering
//! surface, so the vendor and chipset tier are inferred from board, device
//! and hardware identifiers. The mapping is a small closed table with an
//! explicit unknown fallthrough.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw identifiers reported by the host (board, device, hardware).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIdentifiers {
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub hardware: String,
}

impl HardwareIdentifiers {
    pub fn new(
        board: impl Into<String>,
        device: impl Into<String>,
        hardware: impl Into<String>,
    ) -> Self {
        Self {
            board: board.into(),
            device: device.into(),
            hardware: hardware.into(),
        }
    }

    fn contains_any(&self, markers: &[&str]) -> bool {
        let fields = [
            self.board.to_lowercase(),
            self.device.to_lowercase(),
            self.hardware.to_lowercase(),
        ];
        markers
            .iter()
            .any(|marker| fields.iter().any(|f| f.contains(marker)))
    }
}

/// GPU vendor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuVendor {
    QualcommAdreno,
    ExynosMali,
    NvidiaTegra,
    MediaTekMali,
    KirinMali,
    Unknown,
}

/// Coarse chipset performance tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorTier {
    Flagship,
    MidRange,
    Budget,
    Unknown,
}

/// Vendor plus tier, as classified from identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuClass {
    pub vendor: GpuVendor,
    pub tier: VendorTier,
}

const VENDOR_MARKERS: &[(&str, GpuVendor)] = &[
    ("qcom", GpuVendor::QualcommAdreno),
    ("msm", GpuVendor::QualcommAdreno),
    ("sdm", GpuVendor::QualcommAdreno),
    ("kalama", GpuVendor::QualcommAdreno),
    ("taro", GpuVendor::QualcommAdreno),
    ("lahaina", GpuVendor::QualcommAdreno),
    ("pineapple", GpuVendor::QualcommAdreno),
    ("exynos", GpuVendor::ExynosMali),
    ("tegra", GpuVendor::NvidiaTegra),
    ("mtk", GpuVendor::MediaTekMali),
    ("mt6", GpuVendor::MediaTekMali),
    ("kirin", GpuVendor::KirinMali),
];

const FLAGSHIP_MARKERS: &[&str] = &[
    "sm8", "kalama", "taro", "lahaina", "pineapple", "exynos2", "mt699", "kirin9",
];

const BUDGET_MARKERS: &[&str] = &["msm89", "sdm4", "sm4", "mt67", "exynos7", "kirin6"];

impl GpuVendor {
    /// Human-readable vendor label; unknown vendors carry the raw hardware id.
    pub fn label(&self, hardware: &str) -> String {
        match self {
            GpuVendor::QualcommAdreno => "Qualcomm Adreno".to_string(),
            GpuVendor::ExynosMali => "ARM Mali (Exynos)".to_string(),
            GpuVendor::NvidiaTegra => "NVIDIA Tegra".to_string(),
            GpuVendor::MediaTekMali => "ARM Mali (MediaTek)".to_string(),
            GpuVendor::KirinMali => "ARM Mali (Kirin)".to_string(),
            GpuVendor::Unknown if hardware.trim().is_empty() => "Unknown GPU".to_string(),
            GpuVendor::Unknown => format!("Unknown GPU ({})", hardware.trim()),
        }
    }
}

impl VendorTier {
    /// Multiplier applied to the RAM-bucket VRAM estimate.
    pub fn vram_multiplier(&self) -> f64 {
        match self {
            VendorTier::Flagship => 1.5,
            VendorTier::Budget => 0.8,
            VendorTier::MidRange | VendorTier::Unknown => 1.0,
        }
    }
}

impl fmt::Display for VendorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorTier::Flagship => write!(f, "Flagship"),
            VendorTier::MidRange => write!(f, "Mid-range"),
            VendorTier::Budget => write!(f, "Budget"),
            VendorTier::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Classify identifiers into a vendor and tier. Pure.
pub fn classify_gpu(ids: &HardwareIdentifiers) -> GpuClass {
    let vendor = VENDOR_MARKERS
        .iter()
        .find(|(marker, _)| ids.contains_any(&[*marker]))
        .map(|(_, vendor)| *vendor)
        .unwrap_or(GpuVendor::Unknown);

    let tier = if vendor == GpuVendor::Unknown {
        VendorTier::Unknown
    } else if ids.contains_any(FLAGSHIP_MARKERS) {
        VendorTier::Flagship
    } else if ids.contains_any(BUDGET_MARKERS) {
        VendorTier::Budget
    } else {
        VendorTier::MidRange
    };

    GpuClass { vendor, tier }
}
