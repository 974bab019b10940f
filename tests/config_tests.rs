// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::PathBuf;

use katalis::config::{PerformanceMode, PerformanceSettings, PreferenceStore, Settings};
use katalis::models::ArtifactLayout;
use tempfile::TempDir;

#[test]
fn test_missing_settings_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_settings_round_trip_keeps_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"future_section": {"enabled": true}}"#).unwrap();

    let mut settings = Settings::load_from(&path).unwrap();
    settings.orchestrator.gpu_slow_threshold_ms = 4_000;
    settings.paths = Some(ArtifactLayout::rooted_at(dir.path()));
    settings.save_to(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["future_section"]["enabled"], true);

    let reloaded = Settings::load_from(&path).unwrap();
    assert_eq!(reloaded.orchestrator.gpu_slow_threshold_ms, 4_000);
    assert_eq!(
        reloaded.artifact_layout().canonical_path("m.task"),
        dir.path().join("internal").join("m.task")
    );
}

#[test]
fn test_legacy_keys_are_migrated_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"model_file_name": "tutor.task", "model_min_size_bytes": 10, "model_max_size_bytes": 20}"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.model.file_name, "tutor.task");
    assert_eq!(settings.model.min_size_bytes, 10);
    assert_eq!(settings.model.max_size_bytes, 20);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"model": {"min_size_bytes": 50, "max_size_bytes": 10}}"#,
    )
    .unwrap();

    let err = Settings::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("min_size_bytes"));
}

#[tokio::test]
async fn test_preferences_persist_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preferences.json");

    {
        let store = PreferenceStore::open(&path);
        assert_eq!(store.current(), PerformanceSettings::default());
        store
            .set_performance_mode(PerformanceMode::BatterySaver)
            .await
            .unwrap();
        store
            .update(|s| {
                s.allow_gpu_when_hot = true;
                s.show_performance_stats = true;
            })
            .await
            .unwrap();
    }

    let reopened = PreferenceStore::open(&path);
    let current = reopened.current();
    assert_eq!(current.performance_mode, PerformanceMode::BatterySaver);
    assert!(current.allow_gpu_when_hot);
    assert!(current.show_performance_stats);
    assert!(!current.allow_gpu_when_battery_low);
}

#[tokio::test]
async fn test_preference_changes_are_observable() {
    let store = PreferenceStore::in_memory(PerformanceSettings::default());
    let mut rx = store.subscribe();

    store.set_max_inference_time_ms(2_500).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().max_inference_time_ms, 2_500);
    assert_eq!(store.current().deadline().as_millis(), 2_500);

    store.reset_to_defaults().await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), PerformanceSettings::default());
}

#[test]
fn test_corrupt_preferences_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preferences.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = PreferenceStore::open(&path);
    assert_eq!(store.current(), PerformanceSettings::default());
}

#[test]
fn test_partial_preferences_fill_defaults() {
    let settings: PerformanceSettings =
        serde_json::from_str(r#"{"performance_mode": "PERFORMANCE"}"#).unwrap();
    assert_eq!(settings.performance_mode, PerformanceMode::Performance);
    assert!(settings.adaptive_mode);
    assert_eq!(settings.max_inference_time_ms, 10_000);
}
