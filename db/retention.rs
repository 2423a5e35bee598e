// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Deleting old recordings: age policy, per-stream quotas, and live disk
//! pressure.
//!
//! Deletion is always file first: the catalog row is removed only after the
//! file is gone, so a failed unlink leaves the row for the next pass (and
//! an externally-vanished file reads as success). Background scans never
//! propagate errors; they log and try again next tick.

use crate::db::{Database, RecordingRow, RetentionTier};
use crate::json::StreamConfig;
use base::clock::Clocks;
use base::shutdown::Receiver;
use base::time::{Duration, Time};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Batch size for catalog queries within one scan pass.
const SCAN_BATCH: i64 = 1000;

/// Free-space classification driving the deletion policy.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PressureLevel {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

/// Pure, stateless classifier over the free-space percentage. Thresholds
/// are strict: 20.0 is Normal, 10.0 is Warning, 5.0 is Critical. Values
/// outside [0, 100] are accepted; negatives collapse to Emergency and
/// anything above 100 is Normal.
pub fn evaluate_disk_pressure_level(free_pct: f64) -> PressureLevel {
    if free_pct < 5.0 {
        PressureLevel::Emergency
    } else if free_pct < 10.0 {
        PressureLevel::Critical
    } else if free_pct < 20.0 {
        PressureLevel::Warning
    } else {
        PressureLevel::Normal
    }
}

/// `effective_days = floor(base_days × multiplier)`.
pub fn effective_days(base_days: i64, multiplier: f64) -> i64 {
    (base_days as f64 * multiplier).floor() as i64
}

/// The multiplier a stream applies to the given tier. Standard is pinned
/// at 1.0.
fn tier_multiplier(config: &StreamConfig, tier: RetentionTier) -> f64 {
    match tier {
        RetentionTier::Critical => config.critical_multiplier,
        RetentionTier::Important => config.important_multiplier,
        RetentionTier::Standard => 1.0,
        RetentionTier::Ephemeral => config.ephemeral_multiplier,
    }
}

/// Percentage of the filesystem holding `path` that is free, per statvfs.
pub fn disk_free_pct(path: &Path) -> Result<f64, base::Error> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| {
        base::format_err_t!(Internal, "statvfs {:?} failed: {}", path, e)
    })?;
    let blocks = stat.blocks() as f64;
    if blocks == 0.0 {
        return Ok(0.0);
    }
    Ok(stat.blocks_available() as f64 / blocks * 100.0)
}

/// What one scan pass did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScanSummary {
    pub age_deleted: usize,
    pub quota_deleted: usize,
    pub pressure_deleted: usize,

    /// Rows kept because their file couldn't be unlinked.
    pub failed: usize,
}

impl ScanSummary {
    pub fn total_deleted(&self) -> usize {
        self.age_deleted + self.quota_deleted + self.pressure_deleted
    }
}

/// Policy-driven deletion over the catalog.
pub struct RetentionEngine<C: Clocks + Clone> {
    db: Arc<Database<C>>,
    storage_path: PathBuf,
}

impl<C: Clocks + Clone> RetentionEngine<C> {
    pub fn new(db: Arc<Database<C>>, storage_path: PathBuf) -> Self {
        RetentionEngine { db, storage_path }
    }

    /// One full pass using the live filesystem numbers.
    pub fn scan(&self) -> Result<ScanSummary, base::Error> {
        let path = self.storage_path.clone();
        self.scan_with_free_pct(&mut || disk_free_pct(&path))
    }

    /// One full pass with an injected free-space reading, re-sampled after
    /// every pressure deletion.
    pub fn scan_with_free_pct(
        &self,
        free_pct: &mut dyn FnMut() -> Result<f64, base::Error>,
    ) -> Result<ScanSummary, base::Error> {
        let mut summary = ScanSummary::default();
        let now = Time::new(self.db.clocks().realtime());
        let level = evaluate_disk_pressure_level(free_pct()?);
        debug!(?level, "retention scan starting");

        let streams: Vec<(String, StreamConfig)> = {
            let l = self.db.lock();
            l.streams_by_name()
                .values()
                .map(|s| (s.name.clone(), s.config.clone()))
                .collect()
        };

        for (name, config) in &streams {
            self.enforce_age(name, config, now, level, &mut summary);
            self.enforce_quota(name, config, &mut summary);
        }

        if level >= PressureLevel::Critical {
            self.enforce_pressure(free_pct, &mut summary)?;
        }

        if summary.total_deleted() > 0 || summary.failed > 0 {
            info!(
                age = summary.age_deleted,
                quota = summary.quota_deleted,
                pressure = summary.pressure_deleted,
                failed = summary.failed,
                "retention scan deleted recordings"
            );
        }
        Ok(summary)
    }

    /// Age policy: rows past their per-trigger base days are candidates;
    /// each is kept until past `floor(base × tier multiplier)` days, with
    /// Emergency temporarily halving multipliers.
    fn enforce_age(
        &self,
        stream: &str,
        config: &StreamConfig,
        now: Time,
        level: PressureLevel,
        summary: &mut ScanSummary,
    ) {
        if config.retention_days <= 0 && config.detection_retention_days <= 0 {
            return;
        }
        // Candidate queries must reach at least as far back as the smallest
        // effective retention any tier can produce, or sub-1.0 multipliers
        // (Ephemeral, or Emergency halving) would hide expired rows.
        let min_multiplier = config
            .critical_multiplier
            .min(config.important_multiplier)
            .min(config.ephemeral_multiplier)
            .min(1.0)
            .max(0.0)
            * if level == PressureLevel::Emergency {
                0.5
            } else {
                1.0
            };
        loop {
            let batch = match self.db.lock().list_recordings_for_retention(
                stream,
                effective_days(config.retention_days, min_multiplier),
                effective_days(config.detection_retention_days, min_multiplier),
                SCAN_BATCH,
                now,
            ) {
                Ok(b) => b,
                Err(err) => {
                    warn!(%err, stream, "age-policy query failed; continuing");
                    return;
                }
            };
            let n = batch.len();
            let mut deleted_any = false;
            for row in batch {
                let base_days =
                    row.base_retention_days(config.retention_days, config.detection_retention_days);
                let mut multiplier = tier_multiplier(config, row.retention_tier);
                if level == PressureLevel::Emergency {
                    multiplier /= 2.0;
                }
                let cutoff = now - Duration::days(effective_days(base_days, multiplier));
                if row.start >= cutoff {
                    continue;
                }
                match self.delete_recording_and_file(&row) {
                    Ok(()) => {
                        deleted_any = true;
                        summary.age_deleted += 1;
                    }
                    Err(()) => summary.failed += 1,
                }
            }
            if n < SCAN_BATCH as usize || !deleted_any {
                return;
            }
        }
    }

    /// Quota policy: delete oldest-first until the stream fits its byte
    /// quota.
    fn enforce_quota(&self, stream: &str, config: &StreamConfig, summary: &mut ScanSummary) {
        let Some(max_bytes) = config.max_bytes else {
            return;
        };
        loop {
            let used = match self.db.lock().stream_storage_bytes(stream) {
                Ok(b) => b,
                Err(err) => {
                    warn!(%err, stream, "quota query failed; continuing");
                    return;
                }
            };
            if used <= max_bytes {
                return;
            }
            let batch = match self.db.lock().list_recordings_for_quota(stream, SCAN_BATCH) {
                Ok(b) => b,
                Err(err) => {
                    warn!(%err, stream, "quota candidate query failed; continuing");
                    return;
                }
            };
            if batch.is_empty() {
                debug!(
                    stream,
                    used = %base::strutil::encode_size(used),
                    quota = %base::strutil::encode_size(max_bytes),
                    "over quota with no deletable rows"
                );
                return;
            }
            let mut freed = 0;
            let mut progress = false;
            for row in batch {
                if used - freed <= max_bytes {
                    break;
                }
                let size = row.size_bytes;
                match self.delete_recording_and_file(&row) {
                    Ok(()) => {
                        freed += size;
                        progress = true;
                        summary.quota_deleted += 1;
                    }
                    Err(()) => summary.failed += 1,
                }
            }
            if !progress {
                return;
            }
        }
    }

    /// Pressure policy: at Critical and above, delete the oldest
    /// non-protected, pressure-eligible rows (ignoring tier) until the
    /// filesystem recovers to Normal or candidates run out.
    fn enforce_pressure(
        &self,
        free_pct: &mut dyn FnMut() -> Result<f64, base::Error>,
        summary: &mut ScanSummary,
    ) -> Result<(), base::Error> {
        loop {
            if evaluate_disk_pressure_level(free_pct()?) < PressureLevel::Warning {
                return Ok(());
            }
            let batch = self.db.lock().list_pressure_candidates(SCAN_BATCH)?;
            if batch.is_empty() {
                warn!("disk pressure persists but no eligible recordings remain");
                return Ok(());
            }
            let mut progress = false;
            for row in batch {
                if evaluate_disk_pressure_level(free_pct()?) < PressureLevel::Warning {
                    return Ok(());
                }
                match self.delete_recording_and_file(&row) {
                    Ok(()) => {
                        progress = true;
                        summary.pressure_deleted += 1;
                    }
                    Err(()) => summary.failed += 1,
                }
            }
            if !progress {
                return Ok(());
            }
        }
    }

    /// File first, then row. An already-missing file counts as deleted; any
    /// other unlink failure keeps the row for a later pass.
    fn delete_recording_and_file(&self, row: &RecordingRow) -> Result<(), ()> {
        match std::fs::remove_file(&row.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %row.path, "file already gone; removing row");
            }
            Err(e) => {
                warn!(err = %e, path = %row.path, "unable to delete recording file; keeping row");
                return Err(());
            }
        }
        if let Err(err) = self.db.lock().delete_recording(row.id) {
            warn!(%err, id = row.id, "file deleted but row removal failed");
            return Err(());
        }
        Ok(())
    }

    /// Runs scans every `interval` until shutdown. Never propagates errors.
    pub fn run(&self, shutdown_rx: Receiver, interval: StdDuration) {
        info!("retention thread starting");
        loop {
            if shutdown_rx.wait_for(interval).is_err() {
                break;
            }
            if let Err(err) = self.scan() {
                warn!(%err, "retention scan failed; will retry next tick");
            }
        }
        info!("retention thread ending");
    }
}

/// Spawns the retention thread.
pub fn start<C: Clocks + Clone>(
    engine: Arc<RetentionEngine<C>>,
    shutdown_rx: Receiver,
    interval: StdDuration,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("retention".to_owned())
        .spawn(move || engine.run(shutdown_rx, interval))
        .expect("spawning retention thread never fails")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{RecordingToInsert, Trigger};
    use crate::testutil;
    use base::clock::SimulatedClocks;

    const DAY: i64 = 86400;

    struct Fixture {
        db: testutil::TestDb<SimulatedClocks>,
        engine: RetentionEngine<SimulatedClocks>,
        dir: tempfile::TempDir,
        now: Time,
    }

    impl Fixture {
        fn new() -> Self {
            testutil::init();
            let now = Time(1000 * DAY);
            let db = testutil::TestDb::new(SimulatedClocks::new(time::Timespec::new(now.0, 0)));
            let dir = tempfile::tempdir().unwrap();
            let engine = RetentionEngine::new(db.db.clone(), dir.path().to_owned());
            Fixture {
                db,
                engine,
                dir,
                now,
            }
        }

        fn config(&self) -> StreamConfig {
            self.db
                .db
                .lock()
                .get_stream(testutil::TEST_STREAM_NAME)
                .unwrap()
                .config
                .clone()
        }

        fn set_config(&self, config: StreamConfig) {
            self.db
                .db
                .lock()
                .update_stream_config(testutil::TEST_STREAM_NAME, config)
                .unwrap();
        }

        /// Adds a complete recording backed by a real file of `size` bytes.
        fn add(&self, name: &str, age_days: i64, size: i64) -> (i64, PathBuf) {
            let path = self.dir.path().join(name);
            std::fs::write(&path, vec![0u8; size as usize]).unwrap();
            let start = self.now - Duration::days(age_days);
            let id = self
                .db
                .db
                .lock()
                .add_recording(&RecordingToInsert {
                    stream_name: testutil::TEST_STREAM_NAME.to_owned(),
                    path: path.to_str().unwrap().to_owned(),
                    start,
                    end: start + Duration::seconds(60),
                    size_bytes: size,
                    is_complete: true,
                    ..Default::default()
                })
                .unwrap();
            (id, path)
        }

        fn scan_at(&self, free_pct: f64) -> ScanSummary {
            self.engine
                .scan_with_free_pct(&mut || Ok(free_pct))
                .unwrap()
        }

        fn row_exists(&self, id: i64) -> bool {
            self.db.db.lock().get_recording_by_id(id).is_ok()
        }
    }

    #[test]
    fn pressure_boundaries() {
        use PressureLevel::*;
        let cases = [
            (4.99, Emergency),
            (5.0, Critical),
            (9.9, Critical),
            (10.0, Warning),
            (19.9, Warning),
            (20.0, Normal),
            (50.0, Normal),
            (-1.0, Emergency),
            (150.0, Normal),
        ];
        for (pct, expected) in cases {
            assert_eq!(
                evaluate_disk_pressure_level(pct),
                expected,
                "free_pct {pct}"
            );
            // Idempotent and deterministic.
            assert_eq!(evaluate_disk_pressure_level(pct), expected);
        }
    }

    #[test]
    fn effective_days_floors() {
        assert_eq!(effective_days(30, 1.0), 30);
        assert_eq!(effective_days(30, 0.25), 7);
        assert_eq!(effective_days(7, 2.0), 14);
        assert_eq!(effective_days(7, 1.5), 10);
        assert_eq!(effective_days(0, 3.0), 0);
    }

    #[test]
    fn age_policy_deletes_expired_only() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 7;
        config.detection_retention_days = 14;
        f.set_config(config);

        let (old_id, old_path) = f.add("old.mp4", 10, 100);
        let (young_id, young_path) = f.add("young.mp4", 3, 100);

        let summary = f.scan_at(50.0);
        assert_eq!(summary.age_deleted, 1);
        assert!(!f.row_exists(old_id));
        assert!(!old_path.exists());
        assert!(f.row_exists(young_id));
        assert!(young_path.exists());
    }

    #[test]
    fn age_policy_honors_tier_multiplier() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 7;
        f.set_config(config);

        // 10 days old: expired at Standard (7d) but not at Critical (21d).
        let (id, _) = f.add("r.mp4", 10, 100);
        f.db
            .db
            .lock()
            .set_recording_retention_tier(id, RetentionTier::Critical)
            .unwrap();
        assert_eq!(f.scan_at(50.0).age_deleted, 0);
        assert!(f.row_exists(id));

        // 22 days old clears even the Critical multiplier.
        let (old_id, _) = f.add("old.mp4", 22, 100);
        f.db
            .db
            .lock()
            .set_recording_retention_tier(old_id, RetentionTier::Critical)
            .unwrap();
        assert_eq!(f.scan_at(50.0).age_deleted, 1);
        assert!(!f.row_exists(old_id));
        assert!(f.row_exists(id));
    }

    #[test]
    fn ephemeral_tier_shortens_retention() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 30;
        f.set_config(config);

        // 10 days old: safe at Standard (30d), expired at Ephemeral
        // (floor(30 × 0.25) = 7d).
        let (id, _) = f.add("r.mp4", 10, 100);
        f.db
            .db
            .lock()
            .set_recording_retention_tier(id, RetentionTier::Ephemeral)
            .unwrap();
        let summary = f.scan_at(50.0);
        assert_eq!(summary.age_deleted, 1);
        assert!(!f.row_exists(id));
    }

    #[test]
    fn age_policy_honors_row_override() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 7;
        f.set_config(config);

        // 10 days old with a 30-day override survives.
        let (id, _) = f.add("r.mp4", 10, 100);
        f.db
            .db
            .lock()
            .set_recording_retention_override(id, 30)
            .unwrap();
        assert_eq!(f.scan_at(50.0).age_deleted, 0);
        assert!(f.row_exists(id));
    }

    #[test]
    fn emergency_halves_multipliers() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 10;
        f.set_config(config);

        // 7 days old at Standard: effective 10d normally, 5d in Emergency.
        let (id, _) = f.add("r.mp4", 7, 100);
        assert_eq!(f.scan_at(50.0).age_deleted, 0);
        assert!(f.row_exists(id));
        let summary = f.scan_at(1.0);
        assert!(summary.age_deleted >= 1);
        assert!(!f.row_exists(id));
    }

    #[test]
    fn quota_deletes_oldest_first() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 0; // age policy off
        config.detection_retention_days = 0;
        config.max_bytes = Some(250);
        f.set_config(config);

        let (oldest, _) = f.add("a.mp4", 9, 100);
        let (middle, _) = f.add("b.mp4", 5, 100);
        let (newest, _) = f.add("c.mp4", 1, 100);

        let summary = f.scan_at(50.0);
        assert_eq!(summary.quota_deleted, 1);
        assert!(!f.row_exists(oldest));
        assert!(f.row_exists(middle));
        assert!(f.row_exists(newest));
        assert!(f.db.db.lock().stream_storage_bytes(testutil::TEST_STREAM_NAME).unwrap() <= 250);
    }

    #[test]
    fn pressure_policy_respects_eligibility_and_recovery() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 0;
        config.detection_retention_days = 0;
        f.set_config(config);

        let (ineligible, _) = f.add("keep.mp4", 9, 100);
        f.db
            .db
            .lock()
            .set_recording_disk_pressure_eligible(ineligible, false)
            .unwrap();
        let (a, _) = f.add("a.mp4", 8, 100);
        let (b, _) = f.add("b.mp4", 7, 100);
        let (c, _) = f.add("c.mp4", 6, 100);

        // Free space "recovers" after two deletions.
        let mut calls = 0;
        let summary = f
            .engine
            .scan_with_free_pct(&mut || {
                calls += 1;
                Ok(if calls > 4 { 50.0 } else { 8.0 })
            })
            .unwrap();
        assert_eq!(summary.pressure_deleted, 2);
        assert!(!f.row_exists(a));
        assert!(!f.row_exists(b));
        assert!(f.row_exists(c));
        assert!(f.row_exists(ineligible));
    }

    #[test]
    fn pressure_policy_stops_when_candidates_run_out() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 0;
        config.detection_retention_days = 0;
        f.set_config(config);
        let (id, _) = f.add("a.mp4", 8, 100);
        f.db.db.lock().set_recording_protected(id, true).unwrap();

        // Emergency pressure forever, but the only row is protected.
        let summary = f.scan_at(1.0);
        assert_eq!(summary.pressure_deleted, 0);
        assert!(f.row_exists(id));
    }

    #[test]
    fn failed_unlink_keeps_row() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 1;
        f.set_config(config);

        // A directory at the recording path makes remove_file fail.
        let (id, path) = f.add("r.mp4", 10, 100);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let summary = f.scan_at(50.0);
        assert_eq!(summary.age_deleted, 0);
        assert_eq!(summary.failed, 1);
        assert!(f.row_exists(id));
    }

    #[test]
    fn missing_file_still_removes_row() {
        let f = Fixture::new();
        let mut config = f.config();
        config.retention_days = 1;
        f.set_config(config);
        let (id, path) = f.add("r.mp4", 10, 100);
        std::fs::remove_file(&path).unwrap();

        let summary = f.scan_at(50.0);
        assert_eq!(summary.age_deleted, 1);
        assert!(!f.row_exists(id));
    }
}
