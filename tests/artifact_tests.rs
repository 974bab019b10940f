// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::sync::Arc;

use katalis::hardware::StaticDeviceInfo;
use katalis::models::{
    validate_artifact, ArtifactLayout, ArtifactManager, ArtifactSpec, ArtifactValidation,
    OverrideOutcome, ValidationIssue,
};
use katalis::KatalisError;
use proptest::prelude::*;
use tempfile::TempDir;

const GIB: u64 = 1024 * 1024 * 1024;

fn spec() -> ArtifactSpec {
    ArtifactSpec {
        file_name: "model.task".to_string(),
        min_size_bytes: 1024,
        max_size_bytes: 4096,
        min_available_memory_bytes: GIB,
        ..ArtifactSpec::default()
    }
}

fn manager(root: &Path) -> ArtifactManager {
    let device = StaticDeviceInfo::default()
        .with_available_memory(8 * GIB)
        .with_available_storage(64 * GIB);
    ArtifactManager::new(ArtifactLayout::rooted_at(root), spec(), Arc::new(device))
}

fn place(path: &Path, size: usize, byte: u8) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![byte; size]).unwrap();
}

#[test]
fn test_size_bounds_are_inclusive() {
    let dir = TempDir::new().unwrap();
    let spec = spec();
    let cases = [
        (1023usize, false),
        (1024, true),
        (1025, true),
        (4095, true),
        (4096, true),
        (4097, false),
    ];
    for (size, expected) in cases {
        let path = dir.path().join(format!("m{}.task", size));
        place(&path, size, 1);
        assert_eq!(
            validate_artifact(&path, &spec).is_valid(),
            expected,
            "size {}",
            size
        );
    }
}

#[test]
fn test_out_of_range_reports_bounds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("small.task");
    place(&path, 10, 1);
    assert_eq!(
        validate_artifact(&path, &spec()),
        ArtifactValidation::Invalid {
            issue: ValidationIssue::SizeOutOfRange {
                actual: 10,
                min: 1024,
                max: 4096
            }
        }
    );
}

#[tokio::test]
async fn test_external_download_is_staged_once() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let source = mgr.layout().external_candidates("model.task")[1].clone();
    place(&source, 2048, 9);

    let staged = mgr.ensure_available().await.unwrap();
    assert_eq!(staged, mgr.canonical_path());
    assert_eq!(std::fs::read(&staged).unwrap(), vec![9u8; 2048]);

    // The canonical copy now satisfies resolution on its own.
    std::fs::remove_file(&source).unwrap();
    assert_eq!(mgr.ensure_available().await.unwrap(), staged);
    assert!(!katalis::models::staging::partial_path(&staged).exists());
}

#[tokio::test]
async fn test_external_search_order() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let candidates = mgr.layout().external_candidates("model.task");
    place(&candidates[1], 2048, 2);
    place(&candidates[2], 2048, 3);

    let staged = mgr.ensure_available().await.unwrap();
    assert_eq!(std::fs::read(staged).unwrap()[0], 2);
}

#[tokio::test]
async fn test_invalid_canonical_is_replaced() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    place(&mgr.canonical_path(), 100, 0);
    place(&mgr.layout().external_candidates("model.task")[0], 3000, 5);

    let staged = mgr.ensure_available().await.unwrap();
    assert_eq!(std::fs::metadata(staged).unwrap().len(), 3000);
}

#[tokio::test]
async fn test_override_that_goes_bad_does_not_fall_through() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let custom = dir.path().join("sdcard").join("model.task");
    place(&custom, 2048, 1);
    place(&mgr.layout().external_candidates("model.task")[1], 2048, 2);

    assert!(matches!(
        mgr.set_manual_override(Some(custom.clone())),
        OverrideOutcome::Set { size_bytes: 2048, .. }
    ));
    assert_eq!(mgr.ensure_available().await.unwrap(), custom);

    std::fs::write(&custom, vec![1u8; 10]).unwrap();
    match mgr.ensure_available().await {
        Err(KatalisError::ArtifactInvalid { path, issue }) => {
            assert_eq!(path, custom);
            assert!(matches!(issue, ValidationIssue::SizeOutOfRange { actual: 10, .. }));
        }
        other => panic!("expected ArtifactInvalid, got {:?}", other),
    }
    assert!(!mgr.canonical_path().exists());

    std::fs::remove_file(&custom).unwrap();
    assert!(matches!(
        mgr.ensure_available().await,
        Err(KatalisError::ArtifactInvalid {
            issue: ValidationIssue::NotFound,
            ..
        })
    ));

    // Clearing the override restores normal resolution.
    assert_eq!(mgr.set_manual_override(None), OverrideOutcome::Cleared);
    assert_eq!(mgr.ensure_available().await.unwrap(), mgr.canonical_path());
}

#[tokio::test]
async fn test_not_found_lists_every_location() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());

    let err = mgr.ensure_available().await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Model file not found."));
    for path in mgr.search_paths() {
        assert!(message.contains(&path.display().to_string()));
    }
    assert!(message.contains("File name: model.task"));
    assert_eq!(mgr.search_paths().len(), 5);
}

#[tokio::test]
async fn test_concurrent_callers_stage_one_copy() {
    let dir = TempDir::new().unwrap();
    let mgr = Arc::new(manager(dir.path()));
    place(&mgr.layout().bundled_path("model.task"), 4096, 4);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let mgr = Arc::clone(&mgr);
        tasks.push(tokio::spawn(async move { mgr.ensure_available().await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), mgr.canonical_path());
    }
    assert_eq!(std::fs::metadata(mgr.canonical_path()).unwrap().len(), 4096);
}

#[test]
fn test_model_info_with_override() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let custom = dir.path().join("custom.task");
    place(&custom, 1500, 1);
    mgr.set_manual_override(Some(custom.clone()));

    let info = mgr.model_info();
    assert_eq!(info.active_path.as_deref(), Some(custom.as_path()));
    assert_eq!(info.manual_override.as_deref(), Some(custom.as_path()));
    assert!(info.model_found);
    assert!(info.is_valid);
}

proptest! {
    #[test]
    fn prop_validation_is_stable(size in 0usize..6000, ext in prop_oneof![Just("task"), Just("bin"), Just("TASK")]) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("candidate.{}", ext));
        place(&path, size, 3);

        let first = validate_artifact(&path, &spec());
        let second = validate_artifact(&path, &spec());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(
            first.is_valid(),
            ext.eq_ignore_ascii_case("task") && (1024..=4096).contains(&size)
        );
    }
}
