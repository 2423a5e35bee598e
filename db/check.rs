// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand logic for verifying the catalog against the storage
//! directory: catalog rows whose files are gone, files the catalog has
//! never heard of, and completed rows whose recorded size disagrees with
//! the bytes on disk.
//!
//! This is an offline audit; it never mutates anything unless asked to
//! reconcile sizes.

use crate::db::Database;
use base::clock::Clocks;
use base::time::Time;
use base::{ErrorKind, ResultExt as _};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, warn};

/// What a check pass found.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CheckSummary {
    /// Catalog rows whose file is missing on disk.
    pub rows_missing_file: Vec<i64>,

    /// On-disk segment files with no catalog row (orphans).
    pub orphan_files: Vec<String>,

    /// Completed rows whose stored size disagrees with the file.
    pub size_mismatches: Vec<i64>,

    /// Sizes reconciled (only with `fix_sizes`).
    pub fixed: usize,
}

impl CheckSummary {
    pub fn is_clean(&self) -> bool {
        self.rows_missing_file.is_empty()
            && self.orphan_files.is_empty()
            && self.size_mismatches.is_empty()
    }
}

/// Audits every catalog row and every `.seg` file under `storage_dir`.
/// With `fix_sizes`, completed rows with a disagreeing size are updated to
/// match the file (the file is the source of truth).
pub fn run<C: Clocks + Clone>(
    db: &Database<C>,
    storage_dir: &Path,
    fix_sizes: bool,
) -> Result<CheckSummary, base::Error> {
    let mut summary = CheckSummary::default();

    let rows = {
        let l = db.lock();
        let mut rows = Vec::new();
        l.list_recordings_by_time(None, Time::MIN..Time::MAX, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        rows
    };

    let mut cataloged = BTreeSet::new();
    for row in &rows {
        cataloged.insert(row.path.clone());
        let meta = match std::fs::metadata(&row.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(id = row.id, path = %row.path, "catalog row has no file");
                summary.rows_missing_file.push(row.id);
                continue;
            }
            Err(e) => {
                return Err(e).err_kind(ErrorKind::Internal);
            }
        };
        // Incomplete rows and rows pending size-sync legitimately disagree.
        if row.is_complete && row.size_bytes != 0 && row.size_bytes != meta.len() as i64 {
            warn!(
                id = row.id,
                cataloged = row.size_bytes,
                on_disk = meta.len(),
                path = %row.path,
                "size mismatch"
            );
            summary.size_mismatches.push(row.id);
            if fix_sizes {
                db.lock().set_recording_size(row.id, meta.len() as i64)?;
                summary.fixed += 1;
            }
        }
    }

    scan_dir(storage_dir, &cataloged, &mut summary)?;

    info!(
        rows = rows.len(),
        missing = summary.rows_missing_file.len(),
        orphans = summary.orphan_files.len(),
        mismatched = summary.size_mismatches.len(),
        fixed = summary.fixed,
        "check finished"
    );
    Ok(summary)
}

/// Recursively collects `.seg` files that the catalog doesn't know about.
fn scan_dir(
    dir: &Path,
    cataloged: &BTreeSet<String>,
    summary: &mut CheckSummary,
) -> Result<(), base::Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).err_kind(ErrorKind::Internal),
    };
    for entry in entries {
        let entry = entry.err_kind(ErrorKind::Internal)?;
        let path = entry.path();
        let file_type = entry.file_type().err_kind(ErrorKind::Internal)?;
        if file_type.is_dir() {
            scan_dir(&path, cataloged, summary)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("seg") {
            continue;
        }
        let Some(p) = path.to_str() else {
            continue;
        };
        if !cataloged.contains(p) {
            warn!(path = %p, "file has no catalog row");
            summary.orphan_files.push(p.to_owned());
        }
    }
    Ok(())
}
