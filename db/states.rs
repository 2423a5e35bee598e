// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Reference-counted lifecycle of each configured stream.
//!
//! Producers (ingesters) and consumers (writer, detection, live viewers)
//! attach with a component tag and gate their hot paths on the operational
//! state and feature flags, which are plain atomics. The manager owns the
//! states in a slab arena; a state's identity is its slot index, so lookup
//! by index is O(1) and handles stay valid until `remove`.

use crate::json::StreamConfig;
use base::bail_t;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use slab::Slab;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{info, warn};

/// Operational state of a live stream.
///
/// `Inactive` → `Starting` (first ingester attach) → `Active` (first
/// keyframe) → `Stopping` → `Inactive` (all refs released). `Error` is
/// terminal until the state is removed and re-created.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum OpState {
    Inactive = 0,
    Starting = 1,
    Active = 2,
    Stopping = 3,
    Error = 4,
}

impl OpState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => OpState::Inactive,
            1 => OpState::Starting,
            2 => OpState::Active,
            3 => OpState::Stopping,
            4 => OpState::Error,
            _ => unreachable!("all stored values come from OpState"),
        }
    }

    fn can_become(self, to: OpState) -> bool {
        use OpState::*;
        matches!(
            (self, to),
            (Inactive, Starting)
                | (Starting, Active)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Active, Stopping)
                | (Active, Error)
                | (Stopping, Inactive)
        )
    }
}

/// A producer or consumer holding a stream open.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum Component {
    Api = 0,
    Hls = 1,
    Record = 2,
    Detect = 3,
    Mqtt = 4,
    Ingest = 5,
}

pub const NUM_COMPONENTS: usize = 6;

/// The closed feature set; anything else is `UnknownFeature`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Feature {
    Streaming = 1,
    Recording = 2,
    Detection = 4,
}

impl Feature {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "streaming" => Some(Feature::Streaming),
            "recording" => Some(Feature::Recording),
            "detection" => Some(Feature::Detection),
            _ => None,
        }
    }
}

/// Per-stream live state. All fields the hot path reads are atomics.
pub struct StreamState {
    name: String,
    config: StreamConfig,
    state: AtomicU32,
    refs: [AtomicU32; NUM_COMPONENTS],
    total_refs: AtomicU32,
    features: AtomicU32,
    callbacks_enabled: AtomicBool,
}

impl StreamState {
    fn new(name: String, config: StreamConfig) -> Self {
        let features = u32::from(config.streaming_enabled) * Feature::Streaming as u32
            | u32::from(config.detection_based_recording) * Feature::Detection as u32;
        StreamState {
            name,
            config,
            state: AtomicU32::new(OpState::Inactive as u32),
            refs: Default::default(),
            total_refs: AtomicU32::new(0),
            features: AtomicU32::new(features),
            callbacks_enabled: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn operational_state(&self) -> OpState {
        OpState::from_u32(self.state.load(Ordering::SeqCst))
    }

    /// True for `Stopping` only.
    pub fn is_stopping(&self) -> bool {
        self.operational_state() == OpState::Stopping
    }

    /// Attempts the transition; invalid ones (per the state machine above)
    /// return false and change nothing.
    pub fn set_operational_state(&self, to: OpState) -> bool {
        let mut cur = self.state.load(Ordering::SeqCst);
        loop {
            if !OpState::from_u32(cur).can_become(to) {
                return false;
            }
            match self.state.compare_exchange_weak(
                cur,
                to as u32,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Increments the component's count, returning the new total across all
    /// components.
    pub fn add_ref(&self, component: Component) -> u32 {
        self.refs[component as usize].fetch_add(1, Ordering::SeqCst);
        self.total_refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the component's count, returning the new total. Releasing
    /// below zero is a programming error; it clamps at zero and logs rather
    /// than underflowing.
    pub fn release_ref(&self, component: Component) -> u32 {
        let r = self.refs[component as usize].fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |v| v.checked_sub(1),
        );
        if r.is_err() {
            warn!(
                stream = %self.name,
                ?component,
                "release_ref with zero refs held; clamping"
            );
            return self.total_refs.load(Ordering::SeqCst);
        }
        self.total_refs.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Total references across all components.
    pub fn ref_count(&self) -> u32 {
        self.total_refs.load(Ordering::SeqCst)
    }

    pub fn component_ref_count(&self, component: Component) -> u32 {
        self.refs[component as usize].load(Ordering::SeqCst)
    }

    /// Sets a feature flag by name. The feature set is closed; unknown
    /// names are rejected.
    pub fn set_feature(&self, name: &str, enabled: bool) -> Result<(), base::Error> {
        let Some(f) = Feature::parse(name) else {
            bail_t!(InvalidArgument, "unknown feature {:?}", name);
        };
        if enabled {
            self.features.fetch_or(f as u32, Ordering::SeqCst);
        } else {
            self.features.fetch_and(!(f as u32), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Hot-path feature poll.
    pub fn has_feature(&self, f: Feature) -> bool {
        self.features.load(Ordering::SeqCst) & (f as u32) != 0
    }

    pub fn set_callbacks_enabled(&self, enabled: bool) {
        self.callbacks_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn are_callbacks_enabled(&self) -> bool {
        self.callbacks_enabled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("name", &self.name)
            .field("state", &self.operational_state())
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

struct ManagerInner {
    slots: Slab<Arc<StreamState>>,
    by_name: FnvHashMap<String, usize>,
}

/// Owns every live [`StreamState`].
pub struct StreamStateManager {
    capacity: usize,
    inner: Mutex<ManagerInner>,
    shut_down: AtomicBool,
}

impl StreamStateManager {
    pub fn new(capacity: usize) -> Self {
        StreamStateManager {
            capacity,
            inner: Mutex::new(ManagerInner {
                slots: Slab::with_capacity(capacity),
                by_name: FnvHashMap::default(),
            }),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates a state for the stream, or returns the existing one without
    /// touching its refs when the name is already present.
    pub fn create(
        &self,
        name: &str,
        config: StreamConfig,
    ) -> Result<Arc<StreamState>, base::Error> {
        if name.is_empty() {
            bail_t!(InvalidArgument, "stream name must be non-empty");
        }
        if self.shut_down.load(Ordering::SeqCst) {
            bail_t!(Unavailable, "stream state manager is shut down");
        }
        let mut l = self.inner.lock();
        if let Some(&i) = l.by_name.get(name) {
            return Ok(l.slots[i].clone());
        }
        if l.slots.len() >= self.capacity {
            bail_t!(
                ResourceExhausted,
                "stream capacity {} reached; can't add {:?}",
                self.capacity,
                name
            );
        }
        let state = Arc::new(StreamState::new(name.to_owned(), config));
        let i = l.slots.insert(state.clone());
        l.by_name.insert(name.to_owned(), i);
        Ok(state)
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<StreamState>> {
        let l = self.inner.lock();
        l.by_name.get(name).map(|&i| l.slots[i].clone())
    }

    /// O(1) lookup by slot index.
    pub fn get_by_index(&self, i: usize) -> Option<Arc<StreamState>> {
        self.inner.lock().slots.get(i).cloned()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.lock().by_name.get(name).copied()
    }

    /// Frees the slot. This is also the only way out of `Error`.
    pub fn remove(&self, state: &Arc<StreamState>) -> Result<(), base::Error> {
        let mut l = self.inner.lock();
        let Some(&i) = l.by_name.get(state.name()) else {
            bail_t!(NotFound, "no stream state {:?}", state.name());
        };
        if !Arc::ptr_eq(&l.slots[i], state) {
            bail_t!(NotFound, "stale handle for stream state {:?}", state.name());
        }
        let refs = state.ref_count();
        if refs > 0 {
            warn!(stream = %state.name(), refs, "removing stream state with live refs");
        }
        l.slots.remove(i);
        l.by_name.remove(state.name());
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Transitions every stream toward `Stopping`, waits up to `timeout`
    /// for reference counts to drain, then releases storage. A second call
    /// is a no-op.
    pub fn shutdown(&self, timeout: StdDuration) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let states: Vec<Arc<StreamState>> = {
            let l = self.inner.lock();
            l.slots.iter().map(|(_, s)| s.clone()).collect()
        };
        for s in &states {
            // Streams still warming up stop too; idle ones have nothing to do.
            s.set_operational_state(OpState::Stopping);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let live: u32 = states.iter().map(|s| s.ref_count()).sum();
            if live == 0 {
                break;
            }
            if Instant::now() >= deadline {
                let stuck: Vec<&str> = states
                    .iter()
                    .filter(|s| s.ref_count() > 0)
                    .map(|s| s.name())
                    .collect();
                warn!(
                    "stream shutdown grace period expired with refs held: {}",
                    stuck.join(", ")
                );
                break;
            }
            std::thread::sleep(StdDuration::from_millis(10));
        }
        for s in &states {
            s.set_operational_state(OpState::Inactive);
        }
        let mut l = self.inner.lock();
        l.slots.clear();
        l.by_name.clear();
        info!("stream state manager shut down");
    }
}
