// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand to run the recording engine.

use crate::config::{self, Config};
use crate::ingest::IngestGlue;
use base::clock::RealClocks;
use base::shutdown::{self, ComponentKind, ComponentState, Coordinator, Receiver};
use db::buffer::{BufferMode, PacketBufferPool};
use db::retention::RetentionEngine;
use db::states::{Component, Feature, StreamState, StreamStateManager};
use db::sync::SizeSync;
use db::tracker::TrackerMap;
use db::writer::RecordingWriter;
use db::{Database, Trigger};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration as StdDuration;
use structopt::StructOpt;
use tracing::{error, info, warn};

/// Grace period before abandoning unstopped components at exit.
const SHUTDOWN_GRACE_SECS: u64 = 30;

const RETENTION_INTERVAL: StdDuration = StdDuration::from_secs(60);
const SIZE_SYNC_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// How long the recorder sleeps between buffer polls.
const RECORDER_POLL: StdDuration = StdDuration::from_secs(1);

/// Seconds of pre-roll each stream's packet buffer targets.
const BUFFER_RETENTION_SECS: u32 = 10;

#[derive(StructOpt)]
pub struct Args {
    /// Path of the TOML configuration file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<i32, base::Error> {
    if let Some(p) = &args.config {
        if let Some(s) = p.to_str() {
            config::set_custom_config_path(s);
        }
    }
    let config_path = config::config_path();
    let config = Config::load(&config_path)?;
    info!("loaded configuration from {:?}", config_path);

    let clocks = RealClocks {};
    let conn = super::open_conn(
        std::path::Path::new(&config.db_path),
        super::OpenMode::ReadWrite,
    )?;
    db::set_journal_mode(&conn, "wal")?;
    let database = Arc::new(Database::new(clocks, conn, true)?);

    // Reconcile the config's stream list into the catalog.
    {
        let mut l = database.lock();
        for s in &config.streams {
            let sc = s.to_stream_config(config.retention_days);
            if l.get_stream(&s.name).is_some() {
                l.update_stream_config(&s.name, sc)?;
            } else {
                l.add_stream(&s.name, sc)?;
            }
        }
    }

    let storage = PathBuf::from(&config.storage_path);
    std::fs::create_dir_all(&storage).map_err(|e| {
        base::format_err_t!(Internal, "unable to create storage dir {:?}: {}", storage, e)
    })?;

    let coordinator = shutdown::init();
    install_signal_handler(coordinator.clone())?;

    let mut pool = PacketBufferPool::new(config.buffer_size);
    if config.use_swap {
        let spill = storage.join("spill");
        std::fs::create_dir_all(&spill).map_err(|e| {
            base::format_err_t!(Internal, "unable to create spill dir {:?}: {}", spill, e)
        })?;
        pool = pool.with_spill_dir(spill);
    }
    let pool = Arc::new(pool);
    let trackers = Arc::new(TrackerMap::new(clocks));
    let states = Arc::new(StreamStateManager::new(config.streams.len().max(16)));
    let glue = Arc::new(IngestGlue::new(
        clocks,
        pool.clone(),
        trackers.clone(),
        states.clone(),
    ));

    // Size-sync reconciler.
    let size_sync = Arc::new(SizeSync::new(database.clone()));
    size_sync.start(SIZE_SYNC_INTERVAL);
    register_stoppable(
        &coordinator,
        "size-sync",
        ComponentKind::Maintenance,
        10,
        {
            let size_sync = size_sync.clone();
            move || {
                size_sync.stop();
            }
        },
    );

    // Retention scanner.
    let engine = Arc::new(RetentionEngine::new(database.clone(), storage.clone()));
    spawn_component(&coordinator, "retention", ComponentKind::Maintenance, 20, {
        let engine = engine.clone();
        move |rx| engine.run(rx, RETENTION_INTERVAL)
    });

    // Per-stream buffers, states, and recorder threads. Recorders stop
    // before the maintenance tasks so final segments land in the catalog.
    let mode = if config.use_swap {
        BufferMode::Spill
    } else {
        BufferMode::Memory
    };
    for s in &config.streams {
        pool.create(&s.name, BUFFER_RETENTION_SECS, mode)?;
        let state = states.create(&s.name, s.to_stream_config(config.retention_days))?;
        state.set_feature("recording", true)?;
        if s.detection_based_recording {
            state.set_feature("detection", true)?;
        }
        let trigger = if s.detection_based_recording {
            Trigger::Detection
        } else {
            Trigger::Scheduled
        };
        spawn_component(
            &coordinator,
            &format!("record-{}", s.name),
            ComponentKind::Storage,
            50,
            {
                let database = database.clone();
                let pool = pool.clone();
                let state = state.clone();
                let storage = storage.clone();
                let segment_secs = config.mp4_segment_duration_seconds;
                move |rx| {
                    recorder_loop(rx, database, pool, state, storage, segment_secs, trigger)
                }
            },
        );
    }

    if config.demo_mode {
        info!("demo mode: generating synthetic packets for every stream");
        for s in &config.streams {
            spawn_component(
                &coordinator,
                &format!("demo-{}", s.name),
                ComponentKind::Ingest,
                60,
                {
                    let glue = glue.clone();
                    let name = s.name.clone();
                    move |rx| demo_ingest_loop(rx, glue, &name)
                },
            );
        }
    }

    info!("lantern-nvr running with {} streams", config.streams.len());
    let rx = coordinator.receiver();
    while rx.wait_for(StdDuration::from_secs(3600)).is_ok() {}

    info!("shutting down");
    states.shutdown(StdDuration::from_secs(10));
    let clean = coordinator.wait_for_all_stopped(SHUTDOWN_GRACE_SECS);
    pool.clear();
    trackers.clear();
    shutdown::cleanup();
    Ok(if clean { 0 } else { 1 })
}

/// Routes SIGINT and SIGTERM to the coordinator from a dedicated thread.
fn install_signal_handler(coordinator: Arc<Coordinator>) -> Result<(), base::Error> {
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])
    .map_err(|e| base::format_err_t!(Internal, "unable to install signal handlers: {}", e))?;
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "received termination signal; initiating shutdown");
                coordinator.initiate_shutdown();
            }
        })
        .expect("spawning signal thread never fails");
    Ok(())
}

/// Registers a component whose stop function runs synchronously during
/// `initiate_shutdown`, bracketing it with the state transitions.
fn register_stoppable(
    coordinator: &Arc<Coordinator>,
    name: &str,
    kind: ComponentKind,
    priority: i32,
    stop: impl Fn() + Send + Sync + 'static,
) {
    let id_cell = Arc::new(OnceLock::new());
    let id = coordinator.register(name, kind, Some(Box::new({
        let coordinator = coordinator.clone();
        let id_cell = id_cell.clone();
        move || {
            if let Some(&id) = id_cell.get() {
                coordinator.set_state(id, ComponentState::Stopping);
            }
            stop();
            if let Some(&id) = id_cell.get() {
                coordinator.set_state(id, ComponentState::Stopped);
            }
        }
    })), priority);
    id_cell.set(id).ok();
}

/// Spawns a loop thread which owns its component registration: the loop
/// exits when the shutdown flag flips, then reports itself stopped.
fn spawn_component(
    coordinator: &Arc<Coordinator>,
    name: &str,
    kind: ComponentKind,
    priority: i32,
    f: impl FnOnce(Receiver) + Send + 'static,
) {
    let id = coordinator.register(name, kind, None, priority);
    let rx = coordinator.receiver();
    let coordinator = coordinator.clone();
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            f(rx);
            coordinator.set_state(id, ComponentState::Stopping);
            coordinator.set_state(id, ComponentState::Stopped);
        })
        .expect("spawning component thread never fails");
}

/// Polls the stream's buffer and appends drained packets to rotating
/// segment files. On shutdown, takes one final drain so buffered packets
/// reach disk.
fn recorder_loop(
    rx: Receiver,
    database: Arc<Database>,
    pool: Arc<PacketBufferPool>,
    state: Arc<StreamState>,
    storage: PathBuf,
    segment_secs: i64,
    trigger: Trigger,
) {
    let name = state.name().to_owned();
    let mut writer =
        match RecordingWriter::new(database, &storage, &name, segment_secs, trigger) {
            Ok(w) => w,
            Err(err) => {
                error!(%err, stream = %name, "unable to create recording writer");
                return;
            }
        };
    state.add_ref(Component::Record);
    loop {
        let stopping = rx.wait_for(RECORDER_POLL).is_err() || state.is_stopping();
        if state.has_feature(Feature::Recording) {
            if let Some(buf) = pool.get(&name) {
                for p in buf.drain() {
                    if let Err(err) = writer.write_packet(&p) {
                        warn!(%err, stream = %name, "write failed; leaving rest buffered");
                        break;
                    }
                }
            }
        }
        if stopping {
            break;
        }
    }
    if let Err(err) = writer.close(None) {
        warn!(%err, stream = %name, "unable to finalize segment at shutdown");
    }
    state.release_ref(Component::Record);
    info!(stream = %name, "recorder stopped");
}

/// Synthetic ingester for demo mode: one keyframe-led GOP per second.
fn demo_ingest_loop(rx: Receiver, glue: Arc<IngestGlue<RealClocks>>, stream: &str) {
    // Streams and buffers are registered before this thread spawns, so the
    // retry only matters if startup is racing shutdown.
    let handle = match base::clock::retry(&RealClocks {}, &rx, &mut || glue.attach(stream)) {
        Ok(h) => h,
        Err(_shutdown) => return,
    };
    let mut n: u64 = 0;
    loop {
        if rx.wait_for(StdDuration::from_millis(200)).is_err() {
            break;
        }
        let keyframe = n % 5 == 0;
        let size = if keyframe { 8192 } else { 2048 };
        glue.on_packet(&handle, vec![0x42; size], keyframe, Some(n as i64 * 18000), None);
        n += 1;
    }
    glue.detach(handle, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_helpers_round_trip() {
        let coordinator = Arc::new(Coordinator::new());
        spawn_component(&coordinator, "noop", ComponentKind::Other, 1, |rx| {
            let _ = rx.wait_for(StdDuration::from_secs(60));
        });
        let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        register_stoppable(&coordinator, "stoppable", ComponentKind::Other, 2, {
            let stopped = stopped.clone();
            move || stopped.store(true, std::sync::atomic::Ordering::SeqCst)
        });
        coordinator.initiate_shutdown();
        assert!(stopped.load(std::sync::atomic::Ordering::SeqCst));
        assert!(coordinator.wait_for_all_stopped(10));
    }
}
