// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Per-stream wall-clock bookkeeping: when the last keyframe and the last
//! detection arrived, and which transport the stream is using.
//!
//! Updates happen on the ingest hot path, so the per-stream slots are plain
//! atomics behind an `Arc`. A slot's identity survives [`TrackerMap::reset`]
//! (handles returned earlier keep observing it); [`TrackerMap::remove`]
//! frees the slot, and a later `get_or_create` may hand out a different one.

use base::clock::Clocks;
use base::time::Time;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Timestamps for one stream. All fields default to zero, meaning "never".
pub struct StreamClock {
    last_keyframe_sec: AtomicI64,
    last_detection_sec: AtomicI64,
    udp: AtomicBool,
}

impl StreamClock {
    fn new() -> Self {
        StreamClock {
            last_keyframe_sec: AtomicI64::new(0),
            last_detection_sec: AtomicI64::new(0),
            udp: AtomicBool::new(false),
        }
    }

    fn reset(&self) {
        self.last_keyframe_sec.store(0, Ordering::SeqCst);
        self.last_detection_sec.store(0, Ordering::SeqCst);
        self.udp.store(false, Ordering::SeqCst);
    }

    pub fn last_keyframe(&self) -> Time {
        Time(self.last_keyframe_sec.load(Ordering::SeqCst))
    }

    pub fn last_detection(&self) -> Time {
        Time(self.last_detection_sec.load(Ordering::SeqCst))
    }

    pub fn is_udp(&self) -> bool {
        self.udp.load(Ordering::SeqCst)
    }
}

/// Process-wide map from stream name to [`StreamClock`], with lifecycle
/// init → use → clear; re-use after clear begins from empty.
pub struct TrackerMap<C: Clocks> {
    clocks: C,
    inner: Mutex<FnvHashMap<String, Arc<StreamClock>>>,
}

impl<C: Clocks> TrackerMap<C> {
    pub fn new(clocks: C) -> Self {
        TrackerMap {
            clocks,
            inner: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Returns the slot for `stream`, creating it if absent. The empty
    /// stream name is the null sentinel and yields `None`.
    pub fn get_or_create(&self, stream: &str) -> Option<Arc<StreamClock>> {
        if stream.is_empty() {
            return None;
        }
        let mut l = self.inner.lock();
        Some(
            l.entry(stream.to_owned())
                .or_insert_with(|| Arc::new(StreamClock::new()))
                .clone(),
        )
    }

    /// Zeroes the slot's counters while preserving its identity: handles
    /// from a prior `get_or_create` keep pointing at the live slot.
    pub fn reset(&self, stream: &str) {
        if let Some(clock) = self.inner.lock().get(stream) {
            clock.reset();
        }
    }

    /// Frees the slot. A subsequent `get_or_create` may return a different
    /// identity.
    pub fn remove(&self, stream: &str) {
        self.inner.lock().remove(stream);
    }

    pub fn set_udp_flag(&self, stream: &str, udp: bool) {
        if let Some(clock) = self.get_or_create(stream) {
            clock.udp.store(udp, Ordering::SeqCst);
        }
    }

    /// Records a keyframe arrival at the current wall-clock time. Monotonic:
    /// the stored time never regresses, even against a stale caller.
    pub fn update_keyframe_time(&self, stream: &str) {
        let now = Time::new(self.clocks.realtime());
        if let Some(clock) = self.get_or_create(stream) {
            clock
                .last_keyframe_sec
                .fetch_max(now.0, Ordering::SeqCst);
        }
    }

    /// With `check_time`, true iff the last keyframe arrived strictly after
    /// it; without, true iff a keyframe has ever been seen. Unknown streams
    /// report false (all-zero times).
    pub fn last_keyframe_received(&self, stream: &str, check_time: Option<Time>) -> bool {
        let last = match self.inner.lock().get(stream) {
            Some(clock) => clock.last_keyframe(),
            None => Time(0),
        };
        match check_time {
            Some(t) => last > t,
            None => last > Time(0),
        }
    }

    pub fn update_last_detection_time(&self, stream: &str, time: Time) {
        if let Some(clock) = self.get_or_create(stream) {
            clock
                .last_detection_sec
                .fetch_max(time.0, Ordering::SeqCst);
        }
    }

    pub fn get_last_detection_time(&self, stream: &str) -> Time {
        match self.inner.lock().get(stream) {
            Some(clock) => clock.last_detection(),
            None => Time(0),
        }
    }

    /// Drops every slot. Re-use after clear begins from empty.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::clock::SimulatedClocks;
    use time::Duration;

    fn map_at(boot_sec: i64) -> TrackerMap<SimulatedClocks> {
        TrackerMap::new(SimulatedClocks::new(time::Timespec::new(boot_sec, 0)))
    }

    #[test]
    fn null_stream_is_none() {
        let m = map_at(0);
        assert!(m.get_or_create("").is_none());
        assert!(m.is_empty());
    }

    #[test]
    fn new_streams_report_zero() {
        let m = map_at(1000);
        let c = m.get_or_create("front").unwrap();
        assert_eq!(c.last_keyframe(), Time(0));
        assert_eq!(c.last_detection(), Time(0));
        assert!(!c.is_udp());
        assert!(!m.last_keyframe_received("front", None));
        assert_eq!(m.get_last_detection_time("front"), Time(0));
    }

    #[test]
    fn keyframe_strict_comparison() {
        let m = map_at(1000);
        m.update_keyframe_time("front");
        assert!(m.last_keyframe_received("front", None));
        // Strict >: a check at exactly the keyframe time fails.
        assert!(!m.last_keyframe_received("front", Some(Time(1000))));
        assert!(m.last_keyframe_received("front", Some(Time(999))));
        assert!(!m.last_keyframe_received("front", Some(Time(1001))));
        // Unknown stream is never "received".
        assert!(!m.last_keyframe_received("back", Some(Time(0))));
    }

    #[test]
    fn keyframe_time_is_monotonic() {
        let m = map_at(1000);
        m.update_keyframe_time("front");
        let c = m.get_or_create("front").unwrap();
        assert_eq!(c.last_keyframe(), Time(1000));

        m.clocks.sleep(Duration::seconds(5));
        m.update_keyframe_time("front");
        assert_eq!(c.last_keyframe(), Time(1005));

        // A stale direct store can't regress the value.
        c.last_keyframe_sec.fetch_max(1001, Ordering::SeqCst);
        assert_eq!(c.last_keyframe(), Time(1005));
    }

    #[test]
    fn reset_preserves_identity() {
        let m = map_at(1000);
        let before = m.get_or_create("front").unwrap();
        m.update_keyframe_time("front");
        m.set_udp_flag("front", true);
        m.reset("front");

        // The old handle still observes the same (zeroed) slot.
        assert_eq!(before.last_keyframe(), Time(0));
        assert!(!before.is_udp());
        let after = m.get_or_create("front").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn remove_frees_slot() {
        let m = map_at(1000);
        let before = m.get_or_create("front").unwrap();
        m.remove("front");
        let after = m.get_or_create("front").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn detection_time_round_trip() {
        let m = map_at(0);
        m.update_last_detection_time("front", Time(42));
        assert_eq!(m.get_last_detection_time("front"), Time(42));
        m.update_last_detection_time("front", Time(40));
        assert_eq!(m.get_last_detection_time("front"), Time(42));
    }

    #[test]
    fn clear_then_reuse() {
        let m = map_at(0);
        m.get_or_create("a").unwrap();
        m.get_or_create("b").unwrap();
        assert_eq!(m.len(), 2);
        m.clear();
        assert!(m.is_empty());
        m.get_or_create("a").unwrap();
        assert_eq!(m.len(), 1);
    }
}
