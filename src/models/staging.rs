// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bounded-memory copy of the artifact into its canonical location

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{KatalisError, Result};

/// Fixed copy buffer; peak memory during staging stays at this size.
pub const STAGING_BUFFER_BYTES: usize = 64 * 1024;

const PROGRESS_LOG_INTERVAL: u64 = 256 * 1024 * 1024;

/// Progress callback receiving `(copied_bytes, total_bytes)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Sibling path used while a copy is in flight.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Copy `source` to `dest` through a fixed buffer, verify the copied size
/// and rename into place. Blocking; run it on the blocking pool.
///
/// The destination is only replaced once the full copy has been verified,
/// so a failed or interrupted staging never leaves a truncated canonical file.
pub fn stage_copy(source: &Path, dest: &Path, progress: Option<&ProgressFn>) -> Result<u64> {
    let total = fs::metadata(source)?.len();
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = partial_path(dest);
    let copied = match copy_through_buffer(source, &temp, total, progress) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
    };

    let actual = fs::metadata(&temp)?.len();
    if copied != total || actual != total {
        let _ = fs::remove_file(&temp);
        return Err(KatalisError::CopyMismatch {
            path: dest.to_path_buf(),
            expected_bytes: total,
            actual_bytes: actual,
        });
    }

    fs::rename(&temp, dest)?;
    tracing::info!(
        "Staged model to {} ({} bytes)",
        dest.display(),
        total
    );
    Ok(total)
}

fn copy_through_buffer(
    source: &Path,
    temp: &Path,
    total: u64,
    progress: Option<&ProgressFn>,
) -> Result<u64> {
    let mut input = File::open(source)?;
    let mut output = File::create(temp)?;
    let mut buffer = vec![0u8; STAGING_BUFFER_BYTES];
    let mut copied = 0u64;

    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        output.write_all(&buffer[..n])?;
        copied += n as u64;

        if let Some(cb) = progress {
            cb(copied, total);
        }
        if copied % PROGRESS_LOG_INTERVAL < n as u64 {
            tracing::info!(
                "Staging progress: {}%",
                (copied as f64 / total.max(1) as f64 * 100.0) as u8
            );
        }
    }

    output.flush()?;
    output.sync_all()?;
    Ok(copied)
}

/// Streamed SHA-256 of a file, lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; STAGING_BUFFER_BYTES];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
