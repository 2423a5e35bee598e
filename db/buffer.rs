// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Per-stream bounded packet FIFOs under a global memory budget.
//!
//! Ingesters push compressed packets; the writer and live consumers pop
//! them. Packets are shared (`Arc`), never copied between holders. When the
//! pool exceeds its budget, whole GOP prefixes are evicted: first from the
//! offending buffer until it fits its fair share, then from the pool's
//! largest buffer. Mutations hold only the buffer's list mutex; spill-file
//! writes happen on a separate handle after the list splice.

use base::time::{Duration, Time};
use byteorder::{LittleEndian, WriteBytesExt};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimum target retention; `create` rejects anything lower.
pub const MIN_RETENTION_SECS: u32 = 5;

/// Eviction logging is rate-limited to once per this many evicted packets.
const EVICTION_LOG_EVERY: u64 = 250;

/// Magic prefix of every spill record, for salvage tools.
const SPILL_RECORD_MAGIC: &[u8; 4] = b"LPKT";

/// How many packets to over-provision per second of retention: 20% above
/// the nominal frame rate.
pub fn estimate_packet_count(fps: u32, seconds: u32) -> usize {
    (f64::from(fps) * f64::from(seconds) * 1.2).ceil() as usize
}

/// What to do with packets evicted under memory pressure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BufferMode {
    /// Drop evicted packets.
    Memory,

    /// Append evicted packets to an on-disk spill file before dropping them
    /// from memory, so a crash-salvage pass can recover pre-roll.
    Spill,
}

/// An opaque compressed media packet. Immutable after arrival; shared
/// between the ingester and any number of buffers/consumers by reference
/// count only.
pub struct Packet {
    pub data: Vec<u8>,
    pub keyframe: bool,

    /// Stream-relative arrival index, for gap detection downstream.
    pub index: u64,

    /// Presentation/decode timestamps in stream units, if the transport
    /// supplied them.
    pub pts: Option<i64>,
    pub dts: Option<i64>,

    /// Wall-clock arrival time.
    pub arrival: Time,
}

impl Packet {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("size", &self.data.len())
            .field("keyframe", &self.keyframe)
            .field("index", &self.index)
            .field("arrival", &self.arrival)
            .finish_non_exhaustive()
    }
}

/// Counts surfaced instead of errors on the hot path.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferCounters {
    pub evicted_packets: u64,
    pub evicted_bytes: u64,
    pub rejected_adds: u64,
}

/// Point-in-time statistics for one buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferStats {
    pub count: usize,
    pub bytes: usize,

    /// `newest.arrival - oldest.arrival`; zero with fewer than two packets.
    pub duration: Duration,
}

#[derive(Debug)]
struct BufferList {
    packets: VecDeque<Arc<Packet>>,
    bytes: usize,
    destroyed: bool,
    counters: BufferCounters,

    /// `counters.evicted_packets` as of the last eviction log line.
    last_eviction_log: u64,
}

impl BufferList {
    /// Index one past the oldest whole GOP: the position of the first
    /// keyframe after the front, or the whole queue if there is none.
    fn gop_prefix_end(&self) -> usize {
        self.packets
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, p)| p.keyframe)
            .map(|(i, _)| i)
            .unwrap_or(self.packets.len())
    }

    /// Removes `n` packets from the front, returning them for optional
    /// spilling. Updates byte and eviction accounting.
    fn evict_front(&mut self, n: usize, pool_bytes: &AtomicUsize) -> Vec<Arc<Packet>> {
        let evicted: Vec<Arc<Packet>> = self.packets.drain(..n).collect();
        let bytes: usize = evicted.iter().map(|p| p.size()).sum();
        self.bytes -= bytes;
        pool_bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.counters.evicted_packets += evicted.len() as u64;
        self.counters.evicted_bytes += bytes as u64;
        evicted
    }

    fn span(&self) -> Duration {
        match (self.packets.front(), self.packets.back()) {
            (Some(f), Some(b)) if self.packets.len() >= 2 => b.arrival - f.arrival,
            _ => Duration(0),
        }
    }

    fn maybe_log_eviction(&mut self, name: &str) {
        if self.counters.evicted_packets - self.last_eviction_log >= EVICTION_LOG_EVERY {
            self.last_eviction_log = self.counters.evicted_packets;
            info!(
                stream = %name,
                evicted_packets = self.counters.evicted_packets,
                evicted_bytes = self.counters.evicted_bytes,
                "buffer evicting under pressure"
            );
        }
    }
}

#[derive(Debug)]
struct SpillState {
    file: Option<std::fs::File>,
}

/// One per stream: an ordered FIFO of shared packets.
#[derive(Debug)]
pub struct PacketBuffer {
    name: String,
    retain_secs: u32,
    mode: BufferMode,
    spill_path: Option<PathBuf>,

    /// Mirror of `list.bytes` for lock-free largest-buffer selection.
    bytes_mirror: AtomicUsize,

    list: Mutex<BufferList>,
    spill: Mutex<SpillState>,
    pool_bytes: Arc<AtomicUsize>,
}

impl PacketBuffer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retain_secs(&self) -> u32 {
        self.retain_secs
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Removes and returns the oldest packet; the caller owns the returned
    /// reference.
    pub fn pop_oldest(&self) -> Option<Arc<Packet>> {
        let mut l = self.list.lock();
        let p = l.packets.pop_front()?;
        l.bytes -= p.size();
        self.bytes_mirror.store(l.bytes, Ordering::SeqCst);
        self.pool_bytes.fetch_sub(p.size(), Ordering::SeqCst);
        Some(p)
    }

    /// Returns a new shared reference to the oldest packet without mutating
    /// the buffer.
    pub fn peek_oldest(&self) -> Option<Arc<Packet>> {
        self.list.lock().packets.front().cloned()
    }

    /// Lazily-popping iterator over the buffer, oldest first. Consuming it
    /// to the end drains the buffer; dropping it early (e.g. when a
    /// downstream write fails) leaves the remaining packets in place.
    pub fn drain(&self) -> Drain<'_> {
        Drain { buf: self }
    }

    /// Releases every packet.
    pub fn clear(&self) {
        let dropped_bytes = {
            let mut l = self.list.lock();
            let bytes = l.bytes;
            l.packets.clear();
            l.bytes = 0;
            self.bytes_mirror.store(0, Ordering::SeqCst);
            bytes
        };
        self.pool_bytes.fetch_sub(dropped_bytes, Ordering::SeqCst);
        let mut spill = self.spill.lock();
        if let (Some(f), Some(path)) = (spill.file.take(), self.spill_path.as_ref()) {
            drop(f);
            if let Err(err) = std::fs::remove_file(path) {
                warn!(%err, path = %path.display(), "unable to remove spill file");
            }
        }
    }

    pub fn stats(&self) -> BufferStats {
        let l = self.list.lock();
        BufferStats {
            count: l.packets.len(),
            bytes: l.bytes,
            duration: l.span(),
        }
    }

    pub fn counters(&self) -> BufferCounters {
        self.list.lock().counters
    }

    /// Evicts one whole GOP prefix, returning how many packets went.
    /// Refuses to evict a lone packet (the freshest data).
    fn evict_one_gop(&self) -> usize {
        let evicted = {
            let mut l = self.list.lock();
            let end = l.gop_prefix_end();
            if end == l.packets.len() && l.packets.len() <= 1 {
                return 0;
            }
            let evicted = l.evict_front(end, &self.pool_bytes);
            self.bytes_mirror.store(l.bytes, Ordering::SeqCst);
            l.maybe_log_eviction(&self.name);
            evicted
        };
        let n = evicted.len();
        self.spill_evicted(evicted);
        n
    }

    /// Appends evicted packets to the spill file. Runs after the list mutex
    /// is released; IO latency here never blocks the hot path.
    fn spill_evicted(&self, evicted: Vec<Arc<Packet>>) {
        if self.mode != BufferMode::Spill || evicted.is_empty() {
            return;
        }
        let Some(path) = self.spill_path.as_ref() else {
            return;
        };
        let mut spill = self.spill.lock();
        if spill.file.is_none() {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => spill.file = Some(f),
                Err(err) => {
                    warn!(%err, path = %path.display(), "unable to open spill file");
                    return;
                }
            }
        }
        let f = spill.file.as_mut().expect("just opened");
        for p in &evicted {
            if let Err(err) = write_spill_record(f, p) {
                warn!(%err, stream = %self.name, "spill write failed; dropping record");
                break;
            }
        }
    }
}

fn write_spill_record(f: &mut std::fs::File, p: &Packet) -> std::io::Result<()> {
    f.write_all(SPILL_RECORD_MAGIC)?;
    f.write_u8(p.keyframe as u8)?;
    f.write_u64::<LittleEndian>(p.index)?;
    f.write_i64::<LittleEndian>(p.arrival.0)?;
    f.write_u32::<LittleEndian>(p.data.len() as u32)?;
    f.write_all(&p.data)?;
    Ok(())
}

/// See [`PacketBuffer::drain`].
pub struct Drain<'a> {
    buf: &'a PacketBuffer,
}

impl Iterator for Drain<'_> {
    type Item = Arc<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.pop_oldest()
    }
}

/// Process-wide pool: stream name → buffer, plus the global byte budget.
pub struct PacketBufferPool {
    budget_bytes: usize,
    spill_dir: Option<PathBuf>,
    buffers: Mutex<FnvHashMap<String, Arc<PacketBuffer>>>,
    total_bytes: Arc<AtomicUsize>,
}

impl PacketBufferPool {
    pub fn new(budget_mb: usize) -> Self {
        PacketBufferPool {
            budget_bytes: budget_mb << 20,
            spill_dir: None,
            buffers: Mutex::new(FnvHashMap::default()),
            total_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Directory for spill files of `BufferMode::Spill` buffers.
    pub fn with_spill_dir(mut self, dir: PathBuf) -> Self {
        self.spill_dir = Some(dir);
        self
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::SeqCst)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn create(
        &self,
        stream: &str,
        seconds: u32,
        mode: BufferMode,
    ) -> Result<Arc<PacketBuffer>, base::Error> {
        if stream.is_empty() {
            base::bail_t!(InvalidArgument, "buffer requires a stream name");
        }
        if seconds < MIN_RETENTION_SECS {
            base::bail_t!(
                InvalidArgument,
                "retention {} s below minimum {} s",
                seconds,
                MIN_RETENTION_SECS
            );
        }
        let mut buffers = self.buffers.lock();
        if buffers.contains_key(stream) {
            base::bail_t!(AlreadyExists, "buffer for stream {:?} already exists", stream);
        }
        let spill_path = match (mode, self.spill_dir.as_ref()) {
            (BufferMode::Spill, Some(dir)) => {
                let safe: String = stream
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                Some(dir.join(format!("{safe}.spill")))
            }
            (BufferMode::Spill, None) => {
                warn!(%stream, "spill mode requested without a spill dir; falling back to drop");
                None
            }
            (BufferMode::Memory, _) => None,
        };
        let buf = Arc::new(PacketBuffer {
            name: stream.to_owned(),
            retain_secs: seconds,
            mode,
            spill_path,
            bytes_mirror: AtomicUsize::new(0),
            list: Mutex::new(BufferList {
                packets: VecDeque::new(),
                bytes: 0,
                destroyed: false,
                counters: BufferCounters::default(),
                last_eviction_log: 0,
            }),
            spill: Mutex::new(SpillState { file: None }),
            pool_bytes: self.total_bytes.clone(),
        });
        buffers.insert(stream.to_owned(), buf.clone());
        Ok(buf)
    }

    /// A non-existent stream is not an error, just absent.
    pub fn get(&self, stream: &str) -> Option<Arc<PacketBuffer>> {
        self.buffers.lock().get(stream).cloned()
    }

    /// Marks the buffer dead, releases its packets, and removes it from the
    /// pool. Destroying an already-destroyed buffer is a no-op.
    pub fn destroy(&self, buf: &Arc<PacketBuffer>) {
        {
            let mut l = buf.list.lock();
            if l.destroyed {
                return;
            }
            l.destroyed = true;
        }
        buf.clear();
        let mut buffers = self.buffers.lock();
        if let Some(existing) = buffers.get(buf.name()) {
            if Arc::ptr_eq(existing, buf) {
                buffers.remove(buf.name());
            }
        }
    }

    /// Appends a packet. Hot path: failures (destroyed buffer, regressed
    /// arrival time) return false and bump the buffer's reject counter
    /// rather than erroring. Triggers eviction as needed to hold the
    /// span and budget invariants.
    pub fn add_packet(&self, buf: &Arc<PacketBuffer>, pkt: Arc<Packet>) -> bool {
        let size = pkt.size();
        let fair_share = self.budget_bytes / self.buffers.lock().len().max(1);
        let spill_batches = {
            let mut l = buf.list.lock();
            if l.destroyed {
                l.counters.rejected_adds += 1;
                return false;
            }
            if let Some(back) = l.packets.back() {
                if pkt.arrival < back.arrival {
                    l.counters.rejected_adds += 1;
                    return false;
                }
            }
            l.packets.push_back(pkt);
            l.bytes += size;
            self.total_bytes.fetch_add(size, Ordering::SeqCst);

            let mut spill_batches = Vec::new();

            // Hard cap: span may never exceed twice the target retention,
            // even mid-GOP.
            let hard_cap = Duration(2 * i64::from(buf.retain_secs));
            while l.span() > hard_cap {
                spill_batches.push(l.evict_front(1, &self.total_bytes));
            }

            // Soft trim to the target retention, whole GOPs at a time.
            let target = Duration(i64::from(buf.retain_secs));
            while l.span() > target {
                let end = l.gop_prefix_end();
                if end == l.packets.len() {
                    break; // a single unbounded GOP stays.
                }
                spill_batches.push(l.evict_front(end, &self.total_bytes));
            }

            // Budget: shrink ourselves to the pool's per-stream fair share.
            while self.total_bytes.load(Ordering::SeqCst) > self.budget_bytes
                && l.bytes > fair_share
            {
                let end = l.gop_prefix_end();
                if end == l.packets.len() && l.packets.len() <= 1 {
                    break;
                }
                spill_batches.push(l.evict_front(end, &self.total_bytes));
            }
            self.bytes_mirror_store(buf, l.bytes);
            l.maybe_log_eviction(&buf.name);
            spill_batches
        };
        for batch in spill_batches {
            buf.spill_evicted(batch);
        }

        // Still over budget: take whole GOPs from the pool's largest buffer.
        while self.total_bytes.load(Ordering::SeqCst) > self.budget_bytes {
            let victim = {
                let buffers = self.buffers.lock();
                buffers
                    .values()
                    .max_by_key(|b| b.bytes_mirror.load(Ordering::SeqCst))
                    .cloned()
            };
            let Some(victim) = victim else { break };
            let n = victim.evict_one_gop();
            if n == 0 {
                debug!("pool over budget but no evictable GOP remains");
                break;
            }
        }
        true
    }

    fn bytes_mirror_store(&self, buf: &PacketBuffer, bytes: usize) {
        buf.bytes_mirror.store(bytes, Ordering::SeqCst);
    }

    /// Destroys every buffer. Re-use after clear begins from empty.
    pub fn clear(&self) {
        let all: Vec<Arc<PacketBuffer>> = self.buffers.lock().values().cloned().collect();
        for buf in all {
            self.destroy(&buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PacketGen {
        index: u64,
        arrival: i64,
    }

    impl PacketGen {
        fn new(start_sec: i64) -> Self {
            PacketGen {
                index: 0,
                arrival: start_sec,
            }
        }

        fn next(&mut self, keyframe: bool, size: usize, advance_sec: i64) -> Arc<Packet> {
            let p = Arc::new(Packet {
                data: vec![0u8; size],
                keyframe,
                index: self.index,
                pts: Some(self.index as i64 * 3000),
                dts: None,
                arrival: Time(self.arrival),
            });
            self.index += 1;
            self.arrival += advance_sec;
            p
        }
    }

    #[test]
    fn create_validates_arguments() {
        let pool = PacketBufferPool::new(16);
        assert_eq!(
            pool.create("", 5, BufferMode::Memory).unwrap_err().kind(),
            base::ErrorKind::InvalidArgument
        );
        assert_eq!(
            pool.create("s", 4, BufferMode::Memory).unwrap_err().kind(),
            base::ErrorKind::InvalidArgument
        );
        pool.create("s", 5, BufferMode::Memory).unwrap();
        assert_eq!(
            pool.create("s", 5, BufferMode::Memory).unwrap_err().kind(),
            base::ErrorKind::AlreadyExists
        );
        assert!(pool.get("missing").is_none());
    }

    #[test]
    fn fifo_order() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(100);
        for size in [10, 20, 30] {
            assert!(pool.add_packet(&buf, gen.next(true, size, 1)));
        }
        assert_eq!(pool.total_bytes(), 60);
        assert_eq!(buf.pop_oldest().unwrap().size(), 10);
        assert_eq!(buf.pop_oldest().unwrap().size(), 20);
        assert_eq!(buf.pop_oldest().unwrap().size(), 30);
        assert!(buf.pop_oldest().is_none());
        assert_eq!(pool.total_bytes(), 0);
    }

    #[test]
    fn peek_does_not_mutate() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        pool.add_packet(&buf, gen.next(true, 10, 1));
        let a = buf.peek_oldest().unwrap();
        let b = buf.peek_oldest().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(buf.stats().count, 1);
    }

    #[test]
    fn stats_duration() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 30, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(100);
        assert_eq!(buf.stats().duration, Duration(0));
        pool.add_packet(&buf, gen.next(true, 10, 7));
        assert_eq!(buf.stats().duration, Duration(0)); // a single packet has no span.
        pool.add_packet(&buf, gen.next(false, 10, 0));
        assert_eq!(buf.stats().duration, Duration(7));
        assert_eq!(buf.stats().bytes, 20);
        assert_eq!(buf.stats().count, 2);
    }

    #[test]
    fn byte_accounting_invariant() {
        let pool = PacketBufferPool::new(1); // 1 MiB
        let a = pool.create("a", 60, BufferMode::Memory).unwrap();
        let b = pool.create("b", 60, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        for i in 0..200 {
            let buf = if i % 2 == 0 { &a } else { &b };
            pool.add_packet(buf, gen.next(i % 10 == 0, 16 << 10, 1));
            assert!(pool.total_bytes() <= pool.budget_bytes());
            assert_eq!(
                a.stats().bytes + b.stats().bytes,
                pool.total_bytes(),
                "pool accounting must equal the sum over buffers"
            );
        }
    }

    #[test]
    fn eviction_drops_whole_gops() {
        // Budget fits ~6 packets of 64 KiB; each GOP is key + 2 deltas.
        let pool = PacketBufferPool::new(0); // 0 MiB budget forces eviction from one buffer...
        let pool = PacketBufferPool {
            budget_bytes: 6 * (64 << 10),
            ..pool
        };
        let buf = pool.create("s", 600, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        for _gop in 0..3 {
            pool.add_packet(&buf, gen.next(true, 64 << 10, 1));
            pool.add_packet(&buf, gen.next(false, 64 << 10, 1));
            pool.add_packet(&buf, gen.next(false, 64 << 10, 1));
        }
        // Nine packets pushed with room for six: the oldest GOP went as a
        // unit, and the survivor's front is a keyframe.
        let stats = buf.stats();
        assert_eq!(stats.count, 6);
        assert!(buf.peek_oldest().unwrap().keyframe);
        let counters = buf.counters();
        assert_eq!(counters.evicted_packets, 3);
        assert_eq!(counters.evicted_bytes, 3 * (64 << 10) as u64);
    }

    #[test]
    fn span_hard_cap() {
        let pool = PacketBufferPool::new(64);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        // One giant GOP spanning far past 2x retention: the hard cap drops
        // singles even mid-GOP.
        pool.add_packet(&buf, gen.next(true, 10, 4));
        for _ in 0..5 {
            pool.add_packet(&buf, gen.next(false, 10, 4));
        }
        assert!(buf.stats().duration <= Duration(10));
    }

    #[test]
    fn soft_trim_is_gop_aligned() {
        let pool = PacketBufferPool::new(64);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        // Three GOPs, 4 seconds apart: span 8 > 5 triggers the soft trim,
        // which drops exactly the first GOP.
        for _gop in 0..3 {
            pool.add_packet(&buf, gen.next(true, 10, 2));
            pool.add_packet(&buf, gen.next(false, 10, 2));
        }
        assert!(buf.peek_oldest().unwrap().keyframe);
        assert!(buf.stats().duration <= Duration(5));
        assert_eq!(buf.counters().evicted_packets % 2, 0);
    }

    #[test]
    fn cross_buffer_eviction_takes_largest() {
        let pool = PacketBufferPool {
            budget_bytes: 10 * (64 << 10),
            ..PacketBufferPool::new(0)
        };
        let big = pool.create("big", 600, BufferMode::Memory).unwrap();
        let small = pool.create("small", 600, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        // `big` holds 8 packets in GOPs of 2; fair share is 5 packets each.
        for _ in 0..4 {
            pool.add_packet(&big, gen.next(true, 64 << 10, 1));
            pool.add_packet(&big, gen.next(false, 64 << 10, 1));
        }
        // `small` pushes 3 packets; the pool must shed from `big`.
        for _ in 0..3 {
            pool.add_packet(&small, gen.next(true, 64 << 10, 1));
        }
        assert!(pool.total_bytes() <= pool.budget_bytes());
        assert_eq!(small.stats().count, 3);
        assert!(big.stats().count < 8);
        assert!(big.peek_oldest().unwrap().keyframe);
    }

    #[test]
    fn add_to_destroyed_buffer_fails_with_counter() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        pool.add_packet(&buf, gen.next(true, 10, 1));
        pool.destroy(&buf);
        assert!(pool.get("s").is_none());
        assert_eq!(pool.total_bytes(), 0);

        assert!(!pool.add_packet(&buf, gen.next(true, 10, 1)));
        assert_eq!(buf.counters().rejected_adds, 1);

        // Destroying again is a no-op.
        pool.destroy(&buf);
    }

    #[test]
    fn out_of_order_arrival_rejected() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        pool.add_packet(
            &buf,
            Arc::new(Packet {
                data: vec![0; 10],
                keyframe: true,
                index: 0,
                pts: None,
                dts: None,
                arrival: Time(100),
            }),
        );
        let ok = pool.add_packet(
            &buf,
            Arc::new(Packet {
                data: vec![0; 10],
                keyframe: false,
                index: 1,
                pts: None,
                dts: None,
                arrival: Time(99),
            }),
        );
        assert!(!ok);
        assert_eq!(buf.counters().rejected_adds, 1);
        assert_eq!(buf.stats().count, 1);
    }

    #[test]
    fn drain_stops_where_the_consumer_stops() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        for _ in 0..5 {
            pool.add_packet(&buf, gen.next(true, 10, 1));
        }
        {
            let mut drain = buf.drain();
            assert_eq!(drain.next().unwrap().index, 0);
            assert_eq!(drain.next().unwrap().index, 1);
            // Simulated downstream error: stop consuming.
        }
        assert_eq!(buf.stats().count, 3);
        assert_eq!(buf.peek_oldest().unwrap().index, 2);

        // A full consume drains the buffer.
        assert_eq!(buf.drain().count(), 3);
        assert_eq!(buf.stats().count, 0);
    }

    #[test]
    fn spill_mode_writes_evicted_gops() {
        let dir = tempfile::tempdir().unwrap();
        let pool = PacketBufferPool {
            budget_bytes: 4 * 100,
            ..PacketBufferPool::new(0).with_spill_dir(dir.path().to_owned())
        };
        let buf = pool.create("cam/1", 600, BufferMode::Spill).unwrap();
        let mut gen = PacketGen::new(0);
        for _gop in 0..3 {
            pool.add_packet(&buf, gen.next(true, 100, 1));
            pool.add_packet(&buf, gen.next(false, 100, 1));
        }
        let spill = dir.path().join("cam_1.spill");
        let meta = std::fs::metadata(&spill).expect("spill file exists");
        // 2 evicted packets, each 4 magic + 1 flag + 8 index + 8 arrival +
        // 4 len + 100 payload.
        assert_eq!(meta.len(), 2 * 125);

        // clear() removes the spill file along with the packets.
        buf.clear();
        assert!(!spill.exists());
    }

    #[test]
    fn estimate_overhead() {
        assert_eq!(estimate_packet_count(30, 5), 180);
        assert_eq!(estimate_packet_count(1, 5), 6);
        assert_eq!(estimate_packet_count(25, 10), 300);
        assert_eq!(estimate_packet_count(0, 5), 0);
    }

    #[test]
    fn pool_clear_then_reuse() {
        let pool = PacketBufferPool::new(16);
        let buf = pool.create("s", 5, BufferMode::Memory).unwrap();
        let mut gen = PacketGen::new(0);
        pool.add_packet(&buf, gen.next(true, 10, 1));
        pool.clear();
        assert_eq!(pool.buffer_count(), 0);
        assert_eq!(pool.total_bytes(), 0);
        pool.create("s", 5, BufferMode::Memory).unwrap();
    }
}
