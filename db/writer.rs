// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Writing recordings: draining packet buffers into segment files and
//! keeping the catalog row honest at open and close.
//!
//! A segment opens on the first keyframe, rotates at the configured
//! duration on the next keyframe boundary, and is finalized (end time,
//! byte size, completion flag) on close. Crash recovery: rows left
//! complete-with-zero-size are backfilled by the size-sync task.

use crate::buffer::Packet;
use crate::db::{Database, RecordingToInsert, Trigger};
use base::clock::Clocks;
use base::time::{Duration, Time};
use base::{bail_t, ErrorKind, ResultExt as _};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct InnerWriter {
    f: std::fs::File,
    id: i64,
    path: PathBuf,
    start: Time,
    last_arrival: Time,
    bytes: u64,
}

/// Writes one stream's packets into rotating segment files.
pub struct RecordingWriter<C: Clocks + Clone> {
    db: Arc<Database<C>>,
    stream_name: String,
    dir: PathBuf,
    segment_secs: i64,
    trigger: Trigger,
    inner: Option<InnerWriter>,
}

impl<C: Clocks + Clone> RecordingWriter<C> {
    /// Creates a writer; segment files land under
    /// `storage_dir/<stream_name>/`.
    pub fn new(
        db: Arc<Database<C>>,
        storage_dir: &std::path::Path,
        stream_name: &str,
        segment_secs: i64,
        trigger: Trigger,
    ) -> Result<Self, base::Error> {
        if segment_secs <= 0 {
            bail_t!(InvalidArgument, "segment duration must be positive");
        }
        if !storage_dir.is_absolute() {
            bail_t!(
                InvalidArgument,
                "storage dir {:?} must be absolute",
                storage_dir
            );
        }
        let dir = storage_dir.join(stream_name);
        std::fs::create_dir_all(&dir).err_kind(ErrorKind::Internal)?;
        Ok(RecordingWriter {
            db,
            stream_name: stream_name.to_owned(),
            dir,
            segment_secs,
            trigger,
            inner: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Appends one packet. Before the first keyframe arrives, packets are
    /// skipped (a decoder couldn't use them anyway). Rotation happens on
    /// keyframes once the segment has run its duration.
    pub fn write_packet(&mut self, pkt: &Packet) -> Result<(), base::Error> {
        if let Some(inner) = self.inner.as_ref() {
            if pkt.keyframe && pkt.arrival - inner.start >= Duration(self.segment_secs) {
                debug!(stream = %self.stream_name, "rotating segment on keyframe");
                self.close(None)?;
            }
        }
        if self.inner.is_none() {
            if !pkt.keyframe {
                return Ok(());
            }
            self.open_segment(pkt)?;
        }
        let inner = self.inner.as_mut().expect("opened above");
        inner.f.write_all(&pkt.data).err_kind(ErrorKind::Internal)?;
        inner.bytes += pkt.data.len() as u64;
        inner.last_arrival = pkt.arrival;
        Ok(())
    }

    fn open_segment(&mut self, first: &Packet) -> Result<(), base::Error> {
        let filename = format!("{}-{:06}.seg", first.arrival.0, first.index);
        let path = self.dir.join(filename);
        let f = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .err_kind(ErrorKind::Internal)?;
        let (width, height, fps, codec) = {
            let l = self.db.lock();
            match l.get_stream(&self.stream_name) {
                Some(s) => (
                    s.config.width as i32,
                    s.config.height as i32,
                    s.config.fps as i32,
                    s.config.codec.clone(),
                ),
                None => (0, 0, 0, String::new()),
            }
        };
        let id = self.db.lock().add_recording(&RecordingToInsert {
            stream_name: self.stream_name.clone(),
            path: path.to_str().expect("storage paths are utf-8").to_owned(),
            start: first.arrival,
            end: first.arrival,
            size_bytes: 0,
            width,
            height,
            fps,
            codec,
            trigger: self.trigger,
            is_complete: false,
            ..Default::default()
        })?;
        info!(stream = %self.stream_name, id, path = %path.display(), "opened segment");
        self.inner = Some(InnerWriter {
            f,
            id,
            path,
            start: first.arrival,
            last_arrival: first.arrival,
            bytes: 0,
        });
        Ok(())
    }

    /// Syncs and finalizes the open segment, if any. `end` defaults to the
    /// last packet's arrival time.
    pub fn close(&mut self, end: Option<Time>) -> Result<(), base::Error> {
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        inner.f.sync_all().err_kind(ErrorKind::Internal)?;
        drop(inner.f);
        let end = end.unwrap_or(inner.last_arrival);
        self.db
            .lock()
            .update_recording(inner.id, end, inner.bytes as i64, true)?;
        info!(
            stream = %self.stream_name,
            id = inner.id,
            bytes = inner.bytes,
            path = %inner.path.display(),
            "finalized segment"
        );
        Ok(())
    }
}

impl<C: Clocks + Clone> Drop for RecordingWriter<C> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(err) = self.close(None) {
                warn!(%err, stream = %self.stream_name, "unable to finalize segment on drop");
            }
        }
    }
}
