// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! The packet entry point handed to the ingestion collaborator.
//!
//! RTSP/ONVIF session handling lives outside this crate; what it gets from
//! us is an attach/packet/detach surface that gates on the stream state
//! machine, feeds the packet buffer pool, and keeps the timestamp tracker
//! current. `on_packet` is the hot path: it never touches the catalog or
//! any disk I/O.

use base::clock::Clocks;
use base::time::Time;
use db::buffer::{Packet, PacketBuffer, PacketBufferPool};
use db::states::{Component, Feature, OpState, StreamState, StreamStateManager};
use db::tracker::TrackerMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// One ingester's hold on a stream. Dropping without [`IngestGlue::detach`]
/// leaks a reference; ingesters are expected to detach explicitly so they
/// can report errors.
#[derive(Debug)]
pub struct IngestHandle {
    state: Arc<StreamState>,
    buffer: Arc<PacketBuffer>,
    next_index: AtomicU64,
}

impl IngestHandle {
    pub fn stream_name(&self) -> &str {
        self.state.name()
    }
}

pub struct IngestGlue<C: Clocks + Clone> {
    clocks: C,
    pool: Arc<PacketBufferPool>,
    trackers: Arc<TrackerMap<C>>,
    states: Arc<StreamStateManager>,
}

impl<C: Clocks + Clone> IngestGlue<C> {
    pub fn new(
        clocks: C,
        pool: Arc<PacketBufferPool>,
        trackers: Arc<TrackerMap<C>>,
        states: Arc<StreamStateManager>,
    ) -> Self {
        IngestGlue {
            clocks,
            pool,
            trackers,
            states,
        }
    }

    /// Called when an ingester connects to its source. Takes the stream
    /// from `Inactive` to `Starting` and holds an `Ingest` reference.
    pub fn attach(&self, stream: &str) -> Result<IngestHandle, base::Error> {
        let Some(state) = self.states.get_by_name(stream) else {
            base::bail_t!(NotFound, "no stream state {:?}", stream);
        };
        let Some(buffer) = self.pool.get(stream) else {
            base::bail_t!(NotFound, "no packet buffer for stream {:?}", stream);
        };
        state.set_operational_state(OpState::Starting);
        let refs = state.add_ref(Component::Ingest);
        self.trackers.get_or_create(stream);
        info!(stream, refs, "ingester attached");
        Ok(IngestHandle {
            state,
            buffer,
            next_index: AtomicU64::new(0),
        })
    }

    /// Hot path. Returns false when the packet was dropped (stream
    /// stopping, streaming disabled, or buffer rejection); drops are
    /// surfaced through the buffer's counters, not errors.
    pub fn on_packet(
        &self,
        handle: &IngestHandle,
        data: Vec<u8>,
        keyframe: bool,
        pts: Option<i64>,
        dts: Option<i64>,
    ) -> bool {
        let state = &handle.state;
        if state.is_stopping() || state.operational_state() == OpState::Error {
            return false;
        }
        if !state.has_feature(Feature::Streaming) && !state.has_feature(Feature::Recording) {
            return false;
        }
        let arrival = Time::new(self.clocks.realtime());
        if keyframe {
            self.trackers.update_keyframe_time(state.name());
            // The first keyframe makes the stream usable.
            state.set_operational_state(OpState::Active);
        }
        let pkt = Arc::new(Packet {
            data,
            keyframe,
            index: handle.next_index.fetch_add(1, Ordering::Relaxed),
            pts,
            dts,
            arrival,
        });
        self.pool.add_packet(&handle.buffer, pkt)
    }

    /// Called when an ingester disconnects. `failed` marks the stream
    /// `Error` (terminal until it is removed and re-created); otherwise a
    /// fully-released stream returns to `Inactive`.
    pub fn detach(&self, handle: IngestHandle, failed: bool) {
        let state = &handle.state;
        let remaining = state.release_ref(Component::Ingest);
        if failed {
            state.set_operational_state(OpState::Error);
            warn!(stream = %state.name(), "ingester detached after failure");
            return;
        }
        if remaining == 0 {
            state.set_operational_state(OpState::Stopping);
            state.set_operational_state(OpState::Inactive);
        }
        info!(stream = %state.name(), remaining, "ingester detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::clock::SimulatedClocks;
    use db::buffer::BufferMode;
    use db::json::StreamConfig;

    fn glue() -> IngestGlue<SimulatedClocks> {
        let clocks = SimulatedClocks::new(time::Timespec::new(1000, 0));
        let pool = Arc::new(PacketBufferPool::new(16));
        pool.create("front", 10, BufferMode::Memory).unwrap();
        let states = Arc::new(StreamStateManager::new(4));
        states.create("front", StreamConfig::default()).unwrap();
        let trackers = Arc::new(TrackerMap::new(clocks.clone()));
        IngestGlue::new(clocks, pool, trackers, states)
    }

    #[test]
    fn attach_requires_known_stream() {
        let g = glue();
        assert_eq!(
            g.attach("nonexistent").unwrap_err().kind(),
            base::ErrorKind::NotFound
        );
        let h = g.attach("front").unwrap();
        assert_eq!(h.stream_name(), "front");
        assert_eq!(
            g.states.get_by_name("front").unwrap().operational_state(),
            OpState::Starting
        );
    }

    #[test]
    fn packets_flow_and_first_keyframe_activates() {
        let g = glue();
        let h = g.attach("front").unwrap();
        assert!(g.on_packet(&h, vec![0; 100], false, None, None));
        assert_eq!(h.state.operational_state(), OpState::Starting);
        assert!(!g.trackers.last_keyframe_received("front", None));

        assert!(g.on_packet(&h, vec![0; 100], true, Some(0), None));
        assert_eq!(h.state.operational_state(), OpState::Active);
        assert!(g.trackers.last_keyframe_received("front", None));
        assert_eq!(g.pool.get("front").unwrap().stats().count, 2);

        // Packet indices are stream-relative and consecutive.
        let buf = g.pool.get("front").unwrap();
        assert_eq!(buf.pop_oldest().unwrap().index, 0);
        assert_eq!(buf.pop_oldest().unwrap().index, 1);
    }

    #[test]
    fn stopping_stream_rejects_packets() {
        let g = glue();
        let h = g.attach("front").unwrap();
        g.on_packet(&h, vec![0; 10], true, None, None);
        h.state.set_operational_state(OpState::Stopping);
        assert!(!g.on_packet(&h, vec![0; 10], false, None, None));
        assert_eq!(g.pool.get("front").unwrap().stats().count, 1);
    }

    #[test]
    fn clean_detach_returns_to_inactive() {
        let g = glue();
        let h = g.attach("front").unwrap();
        g.on_packet(&h, vec![0; 10], true, None, None);
        g.detach(h, false);
        let s = g.states.get_by_name("front").unwrap();
        assert_eq!(s.operational_state(), OpState::Inactive);
        assert_eq!(s.ref_count(), 0);
    }

    #[test]
    fn failed_detach_is_terminal_until_recreate() {
        let g = glue();
        let h = g.attach("front").unwrap();
        g.detach(h, true);
        let s = g.states.get_by_name("front").unwrap();
        assert_eq!(s.operational_state(), OpState::Error);
        // Error rejects further attaches' transitions...
        let h = g.attach("front").unwrap();
        assert_eq!(h.state.operational_state(), OpState::Error);
        assert!(!g.on_packet(&h, vec![0; 10], true, None, None));
        g.detach(h, false);
        // ...until remove + create resets it.
        g.states.remove(&s).unwrap();
        g.states.create("front", StreamConfig::default()).unwrap();
        let h = g.attach("front").unwrap();
        assert_eq!(h.state.operational_state(), OpState::Starting);
    }
}
