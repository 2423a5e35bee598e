// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Size-sync: reconciling catalog byte counts with on-disk file sizes.
//!
//! Writers normally fill `size_bytes` when finalizing a recording, but a
//! crash mid-write leaves complete rows with size 0. This task pairs those
//! rows with their files and backfills the size. Missing files are left
//! alone; the orphan reaper (external) owns those.

use crate::db::Database;
use base::clock::Clocks;
use base::shutdown;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Passes more frequent than this are pointless disk churn.
pub const MIN_SYNC_INTERVAL: StdDuration = StdDuration::from_secs(10);

struct Worker {
    // Dropping the sender asks the thread to stop.
    shutdown_tx: shutdown::Sender,
    join: thread::JoinHandle<()>,
}

/// Owns the background thread; at most one runs per instance.
pub struct SizeSync<C: Clocks + Clone> {
    db: Arc<Database<C>>,
    worker: Mutex<Option<Worker>>,
}

impl<C: Clocks + Clone> SizeSync<C> {
    pub fn new(db: Arc<Database<C>>) -> Self {
        SizeSync {
            db,
            worker: Mutex::new(None),
        }
    }

    /// Runs one reconciliation pass immediately, returning the number of
    /// rows updated.
    pub fn force_recording_sync(&self) -> Result<usize, base::Error> {
        force_recording_sync(&self.db)
    }

    /// Starts the background thread. A second call while running is a
    /// no-op returning false. Intervals below [`MIN_SYNC_INTERVAL`] are
    /// clamped up.
    pub fn start(&self, interval: StdDuration) -> bool {
        let mut w = self.worker.lock();
        if w.is_some() {
            debug!("size-sync thread already running");
            return false;
        }
        let interval = interval.max(MIN_SYNC_INTERVAL);
        let (tx, rx) = shutdown::channel();
        let db = self.db.clone();
        let join = thread::Builder::new()
            .name("size-sync".to_owned())
            .spawn(move || run(db, rx, interval))
            .expect("spawning size-sync thread never fails");
        *w = Some(Worker {
            shutdown_tx: tx,
            join,
        });
        true
    }

    /// Stops and joins the thread. Calling while not running is a no-op
    /// returning false.
    pub fn stop(&self) -> bool {
        let Some(w) = self.worker.lock().take() else {
            return false;
        };
        drop(w.shutdown_tx);
        if w.join.join().is_err() {
            warn!("size-sync thread panicked");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl<C: Clocks + Clone> Drop for SizeSync<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<C: Clocks + Clone>(db: Arc<Database<C>>, shutdown_rx: shutdown::Receiver, interval: StdDuration) {
    info!("size-sync thread starting");
    loop {
        if shutdown_rx.wait_for(interval).is_err() {
            break;
        }
        match force_recording_sync(&db) {
            Ok(0) => {}
            Ok(n) => info!("size-sync updated {n} recordings"),
            Err(err) => warn!(%err, "size-sync pass failed; will retry next tick"),
        }
    }
    info!("size-sync thread ending");
}

/// The reconciliation pass itself. Selects complete rows with `size_bytes`
/// 0, stats each file (outside the catalog lock), and writes back sizes.
/// A missing or unreadable file leaves its row untouched.
pub fn force_recording_sync<C: Clocks + Clone>(
    db: &Database<C>,
) -> Result<usize, base::Error> {
    let rows = db.lock().list_unsized_complete()?;
    let mut updated = 0;
    for (id, path) in rows {
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len() as i64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "size-sync: file missing; leaving row for the orphan reaper");
                continue;
            }
            Err(e) => {
                warn!(err = %e, path, "size-sync: stat failed; leaving row");
                continue;
            }
        };
        if size == 0 {
            continue; // still zero on disk; nothing to record.
        }
        db.lock().set_recording_size(id, size)?;
        updated += 1;
    }
    Ok(updated)
}
