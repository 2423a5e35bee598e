// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Tools for propagating a graceful shutdown signal through the program.
//!
//! Two layers:
//!
//! *   a [`channel`] whose receiver can be cloned, checked on the hot path,
//!     and blocked on in loop threads.
//! *   a [`Coordinator`] which tracks every long-lived subsystem, invokes
//!     their stop functions in descending priority order, and bounds the
//!     grace period at process exit.

use parking_lot::{Condvar, Mutex};
use slab::Slab;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
pub struct ShutdownError;

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("shutdown requested")
    }
}

impl std::error::Error for ShutdownError {}

struct Inner {
    /// `true` iff shutdown has already happened.
    stopped: Mutex<bool>,

    condvar: Condvar,
}

pub struct Sender(Arc<Inner>);

impl Drop for Sender {
    fn drop(&mut self) {
        // Note sequencing: modify the lock state, then notify waiters.
        // The opposite order would create a race in which something might never wake.
        *self.0.stopped.lock() = true;
        self.0.condvar.notify_all();
    }
}

#[derive(Clone)]
pub struct Receiver(Arc<Inner>);

impl Receiver {
    pub fn check(&self) -> Result<(), ShutdownError> {
        if *self.0.stopped.lock() {
            Err(ShutdownError)
        } else {
            Ok(())
        }
    }

    /// Blocks up to `timeout`; `Ok(())` means the timeout elapsed with the
    /// program still running, `Err(ShutdownError)` means shutdown was
    /// requested in the meantime.
    pub fn wait_for(&self, timeout: StdDuration) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + timeout;
        let mut l = self.0.stopped.lock();
        while !*l {
            if self.0.condvar.wait_until(&mut l, deadline).timed_out() {
                return if *l { Err(ShutdownError) } else { Ok(()) };
            }
        }
        Err(ShutdownError)
    }
}

/// Returns a sender and receiver for graceful shutdown.
///
/// Dropping the sender will request shutdown.
pub fn channel() -> (Sender, Receiver) {
    let inner = Arc::new(Inner {
        stopped: Mutex::new(false),
        condvar: Condvar::new(),
    });
    (Sender(inner.clone()), Receiver(inner))
}

/// What a registered component is, for logs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ComponentKind {
    Ingest,
    Storage,
    Network,
    Maintenance,
    Other,
}

/// Lifecycle of a registered component. Transitions are strictly monotone:
/// `Running` → `Stopping` → `Stopped`. Anything else is silently rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ComponentState {
    Running,
    Stopping,
    Stopped,
}

/// Handle returned by [`Coordinator::register`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ComponentId(usize);

type StopFn = Box<dyn Fn() + Send + Sync>;

struct Component {
    name: String,
    kind: ComponentKind,
    state: ComponentState,
    priority: i32,
    stop_fn: Option<Arc<StopFn>>,
}

struct CoordinatorInner {
    components: Slab<Component>,
    initiated: bool,
}

/// Fleet-wide orderly-stop barrier.
///
/// Subsystems register on startup; `initiate_shutdown` flips the global flag
/// (visible through [`Coordinator::receiver`] clones) and then invokes each
/// stop function, higher priority first. The stop functions run outside the
/// coordinator lock so they may call back into `set_state`.
pub struct Coordinator {
    inner: Mutex<CoordinatorInner>,
    condvar: Condvar,
    tx: Mutex<Option<Sender>>,
    rx: Receiver,
}

impl Coordinator {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Coordinator {
            inner: Mutex::new(CoordinatorInner {
                components: Slab::new(),
                initiated: false,
            }),
            condvar: Condvar::new(),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Returns a receiver on the global flag, for loop threads to check
    /// once per iteration.
    pub fn receiver(&self) -> Receiver {
        self.rx.clone()
    }

    pub fn register(
        &self,
        name: &str,
        kind: ComponentKind,
        stop_fn: Option<StopFn>,
        priority: i32,
    ) -> ComponentId {
        let mut l = self.inner.lock();
        let key = l.components.insert(Component {
            name: name.to_owned(),
            kind,
            state: ComponentState::Running,
            priority,
            stop_fn: stop_fn.map(Arc::new),
        });
        ComponentId(key)
    }

    /// Advances a component's state. Only the exact successor is accepted;
    /// reverse or skipping transitions are dropped without comment so that
    /// racing callers can't corrupt the bookkeeping.
    pub fn set_state(&self, id: ComponentId, state: ComponentState) {
        let mut l = self.inner.lock();
        let Some(c) = l.components.get_mut(id.0) else {
            return;
        };
        let ok = matches!(
            (c.state, state),
            (ComponentState::Running, ComponentState::Stopping)
                | (ComponentState::Stopping, ComponentState::Stopped)
        );
        if ok {
            c.state = state;
            self.condvar.notify_all();
        }
    }

    pub fn get_state(&self, id: ComponentId) -> Option<ComponentState> {
        self.inner.lock().components.get(id.0).map(|c| c.state)
    }

    pub fn component_count(&self) -> usize {
        self.inner.lock().components.len()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.inner.lock().initiated
    }

    /// Requests an orderly stop. Idempotent and edge-triggered: the second
    /// and later calls return without touching anything.
    pub fn initiate_shutdown(&self) {
        let to_stop = {
            let mut l = self.inner.lock();
            if l.initiated {
                return;
            }
            l.initiated = true;
            let mut v: Vec<(i32, String, Arc<StopFn>)> = l
                .components
                .iter()
                .filter_map(|(_, c)| {
                    c.stop_fn
                        .as_ref()
                        .map(|f| (c.priority, c.name.clone(), f.clone()))
                })
                .collect();
            // Higher priority stops first.
            v.sort_by(|a, b| b.0.cmp(&a.0));
            v
        };
        // Flip the flag before running stop functions so every loop thread
        // sees it even if a stop function blocks.
        drop(self.tx.lock().take());
        info!("shutdown initiated; stopping {} components", to_stop.len());
        for (priority, name, f) in to_stop {
            info!(%name, priority, "stopping component");
            f();
        }
    }

    /// Blocks until every registered component reports `Stopped` or the
    /// timeout elapses. Returns true on success. With no components
    /// registered it returns true immediately. Expired components are
    /// abandoned, not force-killed.
    pub fn wait_for_all_stopped(&self, timeout_seconds: u64) -> bool {
        let deadline = Instant::now() + StdDuration::from_secs(timeout_seconds);
        let mut l = self.inner.lock();
        loop {
            if l.components
                .iter()
                .all(|(_, c)| c.state == ComponentState::Stopped)
            {
                return true;
            }
            if self.condvar.wait_until(&mut l, deadline).timed_out() {
                let stragglers: Vec<String> = l
                    .components
                    .iter()
                    .filter(|(_, c)| c.state != ComponentState::Stopped)
                    .map(|(_, c)| format!("{} ({:?})", c.name, c.kind))
                    .collect();
                warn!(
                    "shutdown grace period expired with unstopped components: {}",
                    stragglers.join(", ")
                );
                return false;
            }
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Mutex<Option<Arc<Coordinator>>> = Mutex::new(None);

/// Initializes the process-wide coordinator, or returns the existing one.
/// Re-init after [`cleanup`] begins from empty.
pub fn init() -> Arc<Coordinator> {
    let mut g = GLOBAL.lock();
    match &*g {
        Some(c) => c.clone(),
        None => {
            let c = Arc::new(Coordinator::new());
            *g = Some(c.clone());
            c
        }
    }
}

pub fn get() -> Option<Arc<Coordinator>> {
    GLOBAL.lock().clone()
}

pub fn cleanup() {
    GLOBAL.lock().take();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_check() {
        let (tx, rx) = super::channel();
        rx.check().unwrap();
        drop(tx);
        rx.check().unwrap_err();
    }

    #[test]
    fn blocking() {
        let (tx, rx) = super::channel();
        rx.wait_for(StdDuration::from_secs(0)).unwrap();
        let h = std::thread::spawn(move || rx.wait_for(StdDuration::from_secs(1000)).unwrap_err());

        // Make it likely that rx has done its initial check and is waiting on the Condvar.
        std::thread::sleep(StdDuration::from_millis(10));

        drop(tx);
        h.join().unwrap();
    }

    #[test]
    fn empty_coordinator_stops_immediately() {
        let c = Coordinator::new();
        assert!(c.wait_for_all_stopped(0));
        assert!(!c.is_shutdown_initiated());
    }

    #[test]
    fn stop_order_and_idempotence() {
        let c = Coordinator::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
            let order = order.clone();
            c.register(
                name,
                ComponentKind::Other,
                Some(Box::new(move || order.lock().push(name))),
                priority,
            );
        }
        c.initiate_shutdown();
        assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
        assert!(c.is_shutdown_initiated());
        c.receiver().check().unwrap_err();

        // A second call must not re-run stop functions.
        c.initiate_shutdown();
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn monotone_transitions() {
        let c = Coordinator::new();
        let id = c.register("t", ComponentKind::Ingest, None, 0);
        assert_eq!(c.get_state(id), Some(ComponentState::Running));

        // Skipping straight to Stopped is rejected silently.
        c.set_state(id, ComponentState::Stopped);
        assert_eq!(c.get_state(id), Some(ComponentState::Running));

        c.set_state(id, ComponentState::Stopping);
        assert_eq!(c.get_state(id), Some(ComponentState::Stopping));

        // Going backward is rejected silently.
        c.set_state(id, ComponentState::Running);
        assert_eq!(c.get_state(id), Some(ComponentState::Stopping));

        c.set_state(id, ComponentState::Stopped);
        assert_eq!(c.get_state(id), Some(ComponentState::Stopped));
        assert!(c.wait_for_all_stopped(0));
    }

    #[test]
    fn wait_times_out_with_running_component() {
        let c = Coordinator::new();
        c.register("stuck", ComponentKind::Network, None, 0);
        assert!(!c.wait_for_all_stopped(0));
    }

    #[test]
    fn global_reinit_after_cleanup() {
        super::cleanup();
        let c = super::init();
        c.register("x", ComponentKind::Other, None, 0);
        assert_eq!(c.component_count(), 1);
        super::cleanup();
        assert!(super::get().is_none());
        let c = super::init();
        assert_eq!(c.component_count(), 0);
        super::cleanup();
    }
}
