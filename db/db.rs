// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Database access logic for the Lantern NVR SQLite schema.
//!
//! The SQLite schema includes everything except the recording payloads
//! themselves (those live in per-stream files under the storage directory;
//! see the `writer` module). See `schema.sql` for a more detailed
//! description.
//!
//! The [`Database`] struct caches stream configurations and auth state in
//! RAM, making the assumption that only one process is accessing the
//! database at a time. Performance and efficiency notes:
//!
//! *   the list operations with row callbacks invoke the callback with the
//!     database lock held. Callbacks shouldn't perform long-running work.
//!
//! *   the database lock may be held for longer than is acceptable for the
//!     critical path of buffering packets. The hot path must not touch the
//!     catalog; writers register rows only at segment open/close.

use crate::auth;
use crate::json::StreamConfig;
use crate::query;
use crate::raw;
use crate::zone;
use base::clock::{self, Clocks};
use base::time::Time;
use base::{bail_t, ErrorKind, ResultExt as _};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::params;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use tracing::{info, warn};

/// Current schema version; `init` creates this and read-write opens
/// require it. See `guide/schema.md` for more information.
pub const EXPECTED_SCHEMA_VERSION: i32 = 2;

/// Oldest schema version readers still understand. Columns added after it
/// are declared optional in `raw::recording_query`, so read-only opens of
/// older databases substitute defaults instead of failing.
pub const MIN_SCHEMA_VERSION: i32 = 1;

/// Why a recording was started.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(i32)]
pub enum Trigger {
    #[default]
    Scheduled = 0,
    Detection = 1,
    Motion = 2,
    Manual = 3,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Detection => "detection",
            Trigger::Motion => "motion",
            Trigger::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Trigger::Scheduled),
            "detection" => Some(Trigger::Detection),
            "motion" => Some(Trigger::Motion),
            "manual" => Some(Trigger::Manual),
            _ => None,
        }
    }

    /// True for the triggers which age out on the detection retention knob
    /// rather than the regular one.
    pub fn is_detection_class(self) -> bool {
        matches!(self, Trigger::Detection | Trigger::Motion)
    }

    pub(crate) fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Trigger::Scheduled),
            1 => Some(Trigger::Detection),
            2 => Some(Trigger::Motion),
            3 => Some(Trigger::Manual),
            _ => None,
        }
    }
}

impl rusqlite::types::FromSql for Trigger {
    fn column_result(
        value: rusqlite::types::ValueRef,
    ) -> rusqlite::types::FromSqlResult<Self> {
        let v = value.as_i64()?;
        Trigger::from_i64(v).ok_or(rusqlite::types::FromSqlError::OutOfRange(v))
    }
}

impl rusqlite::types::ToSql for Trigger {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok((*self as i32).into())
    }
}

/// Retention class modifying a recording's effective retention days.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(i32)]
pub enum RetentionTier {
    Critical = 0,
    Important = 1,
    #[default]
    Standard = 2,
    Ephemeral = 3,
}

impl RetentionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RetentionTier::Critical => "critical",
            RetentionTier::Important => "important",
            RetentionTier::Standard => "standard",
            RetentionTier::Ephemeral => "ephemeral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(RetentionTier::Critical),
            "important" => Some(RetentionTier::Important),
            "standard" => Some(RetentionTier::Standard),
            "ephemeral" => Some(RetentionTier::Ephemeral),
            _ => None,
        }
    }

    pub(crate) fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(RetentionTier::Critical),
            1 => Some(RetentionTier::Important),
            2 => Some(RetentionTier::Standard),
            3 => Some(RetentionTier::Ephemeral),
            _ => None,
        }
    }
}

impl rusqlite::types::FromSql for RetentionTier {
    fn column_result(
        value: rusqlite::types::ValueRef,
    ) -> rusqlite::types::FromSqlResult<Self> {
        let v = value.as_i64()?;
        RetentionTier::from_i64(v).ok_or(rusqlite::types::FromSqlError::OutOfRange(v))
    }
}

impl rusqlite::types::ToSql for RetentionTier {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok((*self as i32).into())
    }
}

/// A recording to pass to [`LockedDatabase::add_recording`].
#[derive(Clone, Debug)]
pub struct RecordingToInsert {
    pub stream_name: String,
    pub path: String,
    pub start: Time,
    pub end: Time,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub codec: String,
    pub trigger: Trigger,
    pub is_complete: bool,
    pub protected: bool,
    pub retention_override_days: i64,
    pub retention_tier: RetentionTier,
    pub disk_pressure_eligible: bool,
}

impl Default for RecordingToInsert {
    fn default() -> Self {
        RecordingToInsert {
            stream_name: String::new(),
            path: String::new(),
            start: Time(0),
            end: Time(0),
            size_bytes: 0,
            width: 0,
            height: 0,
            fps: 0,
            codec: String::new(),
            trigger: Trigger::Scheduled,
            is_complete: false,
            protected: false,
            retention_override_days: -1,
            retention_tier: RetentionTier::Standard,
            disk_pressure_eligible: true,
        }
    }
}

/// A stored recording row.
#[derive(Clone, Debug)]
pub struct RecordingRow {
    pub id: i64,
    pub stream_name: String,
    pub path: String,
    pub start: Time,
    pub end: Time,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub codec: String,
    pub trigger: Trigger,
    pub is_complete: bool,
    pub protected: bool,
    pub retention_override_days: i64,
    pub retention_tier: RetentionTier,
    pub disk_pressure_eligible: bool,
}

impl RecordingRow {
    /// The retention days to apply to this row given the stream's base
    /// setting, honoring the per-row override.
    pub fn base_retention_days(&self, regular_days: i64, detection_days: i64) -> i64 {
        if self.retention_override_days >= 0 {
            return self.retention_override_days;
        }
        if self.trigger.is_detection_class() {
            detection_days
        } else {
            regular_days
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RecordingSort {
    #[default]
    StartTime,
    EndTime,
    SizeBytes,
    Id,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filters for [`LockedDatabase::list_recordings_paginated`] and
/// [`LockedDatabase::count_recordings`].
#[derive(Clone, Debug)]
pub struct RecordingQuery<'a> {
    pub start: Time,
    pub end: Time,
    pub stream_name: Option<&'a str>,
    pub trigger: Option<Trigger>,
    pub label: Option<&'a str>,
    pub sort: RecordingSort,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RecordingQuery<'_> {
    fn default() -> Self {
        RecordingQuery {
            start: Time::MIN,
            end: Time::MAX,
            stream_name: None,
            trigger: None,
            label: None,
            sort: RecordingSort::StartTime,
            order: SortOrder::Asc,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventRow {
    pub id: i64,
    pub timestamp: Time,
    pub type_: String,
    pub stream_name: Option<String>,
    pub description: Option<String>,
}

/// In-memory state about a configured stream.
#[derive(Clone, Debug)]
pub struct Stream {
    pub id: i64,
    pub name: String,
    pub config: StreamConfig,
}

/// Pragmas for full database integrity, applied on read-write open.
pub static INTEGRITY_PRAGMAS: [&str; 3] = [
    // Enforce foreign keys. This is on by default with --features=bundled.
    // Ensure it's always on.
    "pragma foreign_keys = on",
    // Make the database actually durable.
    "pragma fullfsync = on",
    "pragma synchronous = 3",
];

pub(crate) fn set_integrity_pragmas(conn: &rusqlite::Connection) -> Result<(), base::Error> {
    for pragma in INTEGRITY_PRAGMAS {
        conn.execute(pragma, params![])
            .err_kind(ErrorKind::Internal)?;
    }
    Ok(())
}

pub(crate) fn check_sqlite_version() -> Result<(), base::Error> {
    // SQLite version 3.8.2 introduced the "without rowid" syntax used in the
    // schema. <https://www.sqlite.org/withoutrowid.html>
    if rusqlite::version_number() < 3008002 {
        bail_t!(
            FailedPrecondition,
            "SQLite version {} is too old; need at least 3.8.2",
            rusqlite::version()
        );
    }
    Ok(())
}

/// Sets the journal mode, eg `wal` or `delete`. Typical pragma statements
/// return a row; `query_row` swallows it.
pub fn set_journal_mode(conn: &rusqlite::Connection, requested: &str) -> Result<(), base::Error> {
    assert!(!requested.contains(';')); // quick check for accidental sql injection.
    let actual = conn
        .query_row(
            &format!("pragma journal_mode = {requested}"),
            params![],
            |row| row.get::<_, String>(0),
        )
        .err_kind(ErrorKind::Internal)?;
    info!("...database now in journal_mode {actual} (requested {requested}).");
    Ok(())
}

/// Initializes a database.
/// Note this doesn't set journal options, so that it can be used on
/// in-memory databases for test code.
pub fn init(conn: &mut rusqlite::Connection) -> Result<(), base::Error> {
    check_sqlite_version()?;
    set_integrity_pragmas(conn)?;
    let tx = conn.transaction().err_kind(ErrorKind::Internal)?;
    tx.execute_batch(include_str!("schema.sql"))
        .err_kind(ErrorKind::Internal)?;
    tx.execute(
        "insert into meta (created_sec) values (cast(strftime('%s', 'now') as integer))",
        params![],
    )
    .err_kind(ErrorKind::Internal)?;
    tx.commit().err_kind(ErrorKind::Internal)?;
    Ok(())
}

/// Gets the schema version from the given database connection.
/// A fully initialized database will return `Ok(Some(schema_version))`. An
/// empty database will return `Ok(None)`. A partially initialized database
/// (in particular, one without a version row) will return some error.
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<Option<i32>, base::Error> {
    let ver_tables: i32 = conn
        .query_row(
            "select count(*) from sqlite_master where name = 'version'",
            params![],
            |row| row.get(0),
        )
        .err_kind(ErrorKind::Internal)?;
    if ver_tables == 0 {
        return Ok(None);
    }
    conn.query_row("select max(id) from version", params![], |row| row.get(0))
        .err_kind(ErrorKind::Internal)
}

/// Checks the schema version against the supported window. Read-only opens
/// tolerate `MIN_SCHEMA_VERSION..EXPECTED_SCHEMA_VERSION`; the insert and
/// update statements name current-version columns, so read-write opens
/// require the current schema.
pub(crate) fn check_schema_version(
    conn: &rusqlite::Connection,
    read_write: bool,
) -> Result<(), base::Error> {
    let Some(ver) = get_schema_version(conn)? else {
        bail_t!(
            FailedPrecondition,
            "no such table: version.\n\n\
            If you have created an empty database by hand, delete it and use \
            `lantern-nvr init` instead."
        );
    };
    if ver < MIN_SCHEMA_VERSION {
        bail_t!(
            FailedPrecondition,
            "database schema version {} is too old (supported: {} through {})",
            ver,
            MIN_SCHEMA_VERSION,
            EXPECTED_SCHEMA_VERSION
        );
    }
    if ver > EXPECTED_SCHEMA_VERSION {
        bail_t!(
            FailedPrecondition,
            "database schema version {} is too new (expected at most {}); \
            must use a newer binary",
            ver,
            EXPECTED_SCHEMA_VERSION
        );
    }
    if ver < EXPECTED_SCHEMA_VERSION {
        if read_write {
            bail_t!(
                FailedPrecondition,
                "database schema version {} requires an upgrade to {} before read-write use",
                ver,
                EXPECTED_SCHEMA_VERSION
            );
        }
        warn!(
            "opening schema version {ver} read-only; columns from newer versions \
            read as their defaults"
        );
    }
    Ok(())
}

/// The recording catalog. Abstracts away SQLite queries, and maintains
/// in-memory state (stream configurations, auth) loaded on startup and
/// updated on successful writes.
#[derive(Debug)]
pub struct Database<C: Clocks + Clone = clock::RealClocks> {
    db: Option<Mutex<LockedDatabase>>,
    clocks: C,
}

/// Catalog state guarded by the single big mutex; see [`Database::lock`].
#[derive(Debug)]
pub struct LockedDatabase {
    conn: rusqlite::Connection,

    /// Introspected column set for recording reads, built once at open;
    /// see `raw::recording_query`.
    recording_cols: query::QueryBuilder,

    streams_by_name: BTreeMap<String, Stream>,
    auth: auth::State,
}

fn acquisition() -> &'static str {
    "database lock acquisition"
}

fn operation() -> &'static str {
    "database operation"
}

impl<C: Clocks + Clone> Database<C> {
    /// Opens the database, checking the schema version and loading cached
    /// state. `read_write` additionally seeds the default admin user when
    /// the user table is empty.
    pub fn new(
        clocks: C,
        conn: rusqlite::Connection,
        read_write: bool,
    ) -> Result<Self, base::Error> {
        check_sqlite_version()?;
        check_schema_version(&conn, read_write)?;
        if read_write {
            set_integrity_pragmas(&conn)?;
        }
        // Transient `database is locked` errors get a bounded internal
        // retry rather than surfacing to callers.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .err_kind(ErrorKind::Internal)?;
        let recording_cols = raw::recording_query(&conn)?;
        let mut auth = auth::State::init(&conn)?;
        if read_write {
            auth.maybe_seed_default_admin(&conn, Time::new(clocks.realtime()))?;
        }
        let mut l = LockedDatabase {
            conn,
            recording_cols,
            streams_by_name: BTreeMap::new(),
            auth,
        };
        l.init_streams()?;
        Ok(Database {
            db: Some(Mutex::new(l)),
            clocks,
        })
    }

    #[inline(always)]
    pub fn clocks(&self) -> C {
        self.clocks.clone()
    }

    /// Locks the database; the returned reference is the only way to perform
    /// (read or write) operations.
    pub fn lock(&self) -> DatabaseGuard<'_, C> {
        let timer = clock::TimerGuard::new(&self.clocks, acquisition);
        let db = self.db.as_ref().unwrap().lock();
        drop(timer);
        let _timer = clock::TimerGuard::<C, &'static str, fn() -> &'static str>::new(
            &self.clocks,
            operation,
        );
        DatabaseGuard { db, _timer }
    }

    /// For testing: closes the database and returns the connection, so a
    /// freshly opened database can be verified to be in an acceptable state.
    #[cfg(test)]
    pub(crate) fn close(mut self) -> rusqlite::Connection {
        self.db.take().unwrap().into_inner().conn
    }
}

/// Reference to a locked database returned by [`Database::lock`].
pub struct DatabaseGuard<'db, C: Clocks> {
    db: MutexGuard<'db, LockedDatabase>,
    _timer: clock::TimerGuard<'db, C, &'static str, fn() -> &'static str>,
}

impl<'db, C: Clocks + Clone> std::ops::Deref for DatabaseGuard<'db, C> {
    type Target = LockedDatabase;
    fn deref(&self) -> &LockedDatabase {
        &self.db
    }
}

impl<'db, C: Clocks + Clone> std::ops::DerefMut for DatabaseGuard<'db, C> {
    fn deref_mut(&mut self) -> &mut LockedDatabase {
        &mut self.db
    }
}

impl LockedDatabase {
    fn init_streams(&mut self) -> Result<(), base::Error> {
        let mut stmt = self
            .conn
            .prepare("select id, name, config from stream")
            .err_kind(ErrorKind::Internal)?;
        let mut rows = stmt.query(params![]).err_kind(ErrorKind::Internal)?;
        let mut streams = BTreeMap::new();
        while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
            let name: String = row.get(1).err_kind(ErrorKind::Internal)?;
            streams.insert(
                name.clone(),
                Stream {
                    id: row.get(0).err_kind(ErrorKind::Internal)?,
                    name,
                    config: row.get(2).err_kind(ErrorKind::Internal)?,
                },
            );
        }
        drop(rows);
        drop(stmt);
        info!("loaded {} stream configs", streams.len());
        self.streams_by_name = streams;
        Ok(())
    }

    // --- transactions -----------------------------------------------------

    /// Opens an explicit transaction. Recording operations called before the
    /// matching `commit_transaction` run inside it on this same held
    /// connection, so there is no second mutex to deadlock on.
    pub fn begin_transaction(&mut self) -> Result<(), base::Error> {
        if !self.conn.is_autocommit() {
            bail_t!(AlreadyExists, "a transaction is already open");
        }
        self.conn
            .execute_batch("begin")
            .err_kind(ErrorKind::Internal)
    }

    /// Commits the open transaction. Without a matching `begin_transaction`
    /// this is a safe no-op that reports the mismatch.
    pub fn commit_transaction(&mut self) -> Result<(), base::Error> {
        if self.conn.is_autocommit() {
            bail_t!(AlreadyExists, "commit without a matching begin");
        }
        self.conn
            .execute_batch("commit")
            .err_kind(ErrorKind::Internal)
    }

    /// As `commit_transaction`, but discards the changes.
    pub fn rollback_transaction(&mut self) -> Result<(), base::Error> {
        if self.conn.is_autocommit() {
            bail_t!(AlreadyExists, "rollback without a matching begin");
        }
        self.conn
            .execute_batch("rollback")
            .err_kind(ErrorKind::Internal)
    }

    // --- recordings -------------------------------------------------------

    pub fn add_recording(&mut self, r: &RecordingToInsert) -> Result<i64, base::Error> {
        if r.stream_name.is_empty() {
            bail_t!(InvalidArgument, "recording requires a stream name");
        }
        if r.path.is_empty() || !Path::new(&r.path).is_absolute() {
            bail_t!(InvalidArgument, "recording path {:?} must be absolute", r.path);
        }
        if r.start > r.end {
            bail_t!(
                InvalidArgument,
                "recording start {} is after end {}",
                r.start,
                r.end
            );
        }
        if r.size_bytes < 0 {
            bail_t!(InvalidArgument, "negative recording size");
        }
        if raw::get_recording_by_path(&self.conn, &self.recording_cols, &r.path)?.is_some() {
            bail_t!(AlreadyExists, "recording path {:?} already cataloged", r.path);
        }
        raw::insert_recording(&self.conn, r)
    }

    pub fn get_recording_by_id(&self, id: i64) -> Result<RecordingRow, base::Error> {
        raw::get_recording_by_id(&self.conn, &self.recording_cols, id)?
            .ok_or_else(|| base::format_err_t!(NotFound, "no recording {}", id))
    }

    pub fn get_recording_by_path(&self, path: &str) -> Result<RecordingRow, base::Error> {
        raw::get_recording_by_path(&self.conn, &self.recording_cols, path)?
            .ok_or_else(|| base::format_err_t!(NotFound, "no recording at {:?}", path))
    }

    /// Finalizes (or re-provisions) a recording's end time, size, and
    /// completion flag.
    pub fn update_recording(
        &mut self,
        id: i64,
        end: Time,
        size_bytes: i64,
        is_complete: bool,
    ) -> Result<(), base::Error> {
        if size_bytes < 0 {
            bail_t!(InvalidArgument, "negative recording size");
        }
        let existing = self.get_recording_by_id(id)?;
        if end < existing.start {
            bail_t!(
                InvalidArgument,
                "end {} is before recording {} start {}",
                end,
                id,
                existing.start
            );
        }
        raw::update_recording(&self.conn, id, end, size_bytes, is_complete)?;
        Ok(())
    }

    /// Deletes a catalog row. The caller is responsible for the file on
    /// disk; the retention engine always unlinks before calling this.
    pub fn delete_recording(&mut self, id: i64) -> Result<(), base::Error> {
        if raw::delete_recording_row(&self.conn, id)? == 0 {
            bail_t!(NotFound, "no recording {}", id);
        }
        Ok(())
    }

    pub fn set_recording_protected(&mut self, id: i64, protected: bool) -> Result<(), base::Error> {
        if raw::set_recording_column(&self.conn, id, "protected", protected as i64)? == 0 {
            bail_t!(NotFound, "no recording {}", id);
        }
        Ok(())
    }

    pub fn set_recording_retention_tier(
        &mut self,
        id: i64,
        tier: RetentionTier,
    ) -> Result<(), base::Error> {
        if raw::set_recording_column(&self.conn, id, "retention_tier", tier as i64)? == 0 {
            bail_t!(NotFound, "no recording {}", id);
        }
        Ok(())
    }

    /// Sets the per-row retention override in days; -1 inherits the stream
    /// setting.
    pub fn set_recording_retention_override(
        &mut self,
        id: i64,
        days: i64,
    ) -> Result<(), base::Error> {
        if days < -1 {
            bail_t!(InvalidArgument, "retention override {} out of range", days);
        }
        if raw::set_recording_column(&self.conn, id, "retention_override_days", days)? == 0 {
            bail_t!(NotFound, "no recording {}", id);
        }
        Ok(())
    }

    pub fn set_recording_disk_pressure_eligible(
        &mut self,
        id: i64,
        eligible: bool,
    ) -> Result<(), base::Error> {
        if raw::set_recording_column(&self.conn, id, "disk_pressure_eligible", eligible as i64)?
            == 0
        {
            bail_t!(NotFound, "no recording {}", id);
        }
        Ok(())
    }

    /// Lists recordings overlapping the time range in ascending start order,
    /// invoking `f` under the database lock.
    pub fn list_recordings_by_time(
        &self,
        stream_name: Option<&str>,
        desired_time: Range<Time>,
        f: &mut dyn FnMut(RecordingRow) -> Result<(), base::Error>,
    ) -> Result<(), base::Error> {
        raw::list_recordings_by_time(&self.conn, &self.recording_cols, stream_name, desired_time, f)
    }

    pub fn list_recordings_paginated(
        &self,
        q: &RecordingQuery,
    ) -> Result<Vec<RecordingRow>, base::Error> {
        if q.limit < 0 || q.offset < 0 {
            bail_t!(InvalidArgument, "negative limit or offset");
        }
        raw::list_recordings_paginated(&self.conn, &self.recording_cols, q)
    }

    pub fn count_recordings(&self, q: &RecordingQuery) -> Result<i64, base::Error> {
        raw::count_recordings(&self.conn, q)
    }

    /// Total cataloged bytes for a stream.
    pub fn stream_storage_bytes(&self, stream_name: &str) -> Result<i64, base::Error> {
        raw::stream_storage_bytes(&self.conn, stream_name)
    }

    /// Complete, non-protected recordings whose age (relative to `now`)
    /// exceeds the per-trigger base retention days, oldest first. The
    /// retention engine applies tier multipliers and per-row overrides on
    /// top of this.
    pub fn list_recordings_for_retention(
        &self,
        stream_name: &str,
        regular_days: i64,
        detection_days: i64,
        limit: i64,
        now: Time,
    ) -> Result<Vec<RecordingRow>, base::Error> {
        raw::list_recordings_for_retention(
            &self.conn,
            &self.recording_cols,
            stream_name,
            now - base::time::Duration::days(regular_days),
            now - base::time::Duration::days(detection_days),
            limit,
            now,
        )
    }

    /// All complete, non-protected recordings of a stream, oldest first, for
    /// quota enforcement.
    pub fn list_recordings_for_quota(
        &self,
        stream_name: &str,
        limit: i64,
    ) -> Result<Vec<RecordingRow>, base::Error> {
        raw::list_recordings_for_quota(&self.conn, &self.recording_cols, stream_name, limit)
    }

    /// Oldest pressure-eligible recordings across all streams, for the
    /// emergency policy.
    pub fn list_pressure_candidates(&self, limit: i64) -> Result<Vec<RecordingRow>, base::Error> {
        raw::list_pressure_candidates(&self.conn, &self.recording_cols, limit)
    }

    pub(crate) fn list_unsized_complete(&self) -> Result<Vec<(i64, String)>, base::Error> {
        raw::list_unsized_complete(&self.conn)
    }

    pub(crate) fn set_recording_size(&mut self, id: i64, size: i64) -> Result<(), base::Error> {
        raw::set_recording_column(&self.conn, id, "size_bytes", size)?;
        Ok(())
    }

    // --- streams ----------------------------------------------------------

    pub fn streams_by_name(&self) -> &BTreeMap<String, Stream> {
        &self.streams_by_name
    }

    pub fn get_stream(&self, name: &str) -> Option<&Stream> {
        self.streams_by_name.get(name)
    }

    pub fn add_stream(&mut self, name: &str, config: StreamConfig) -> Result<i64, base::Error> {
        if name.is_empty() {
            bail_t!(InvalidArgument, "stream name must be non-empty");
        }
        if self.streams_by_name.contains_key(name) {
            bail_t!(AlreadyExists, "stream {:?} already exists", name);
        }
        if config.priority > 10 {
            bail_t!(InvalidArgument, "priority {} out of range", config.priority);
        }
        self.conn
            .prepare_cached("insert into stream (name, config) values (:name, :config)")
            .err_kind(ErrorKind::Internal)?
            .execute(rusqlite::named_params! {":name": name, ":config": &config})
            .err_kind(ErrorKind::Internal)?;
        let id = self.conn.last_insert_rowid();
        self.streams_by_name.insert(
            name.to_owned(),
            Stream {
                id,
                name: name.to_owned(),
                config,
            },
        );
        Ok(id)
    }

    pub fn update_stream_config(
        &mut self,
        name: &str,
        config: StreamConfig,
    ) -> Result<(), base::Error> {
        let Some(id) = self.streams_by_name.get(name).map(|s| s.id) else {
            bail_t!(NotFound, "no stream {:?}", name);
        };
        self.conn
            .prepare_cached("update stream set config = :config where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(rusqlite::named_params! {":config": &config, ":id": id})
            .err_kind(ErrorKind::Internal)?;
        self.streams_by_name
            .get_mut(name)
            .expect("stream still cached")
            .config = config;
        Ok(())
    }

    /// Removes a stream's configuration. Its cataloged recordings remain
    /// until retention takes them.
    pub fn delete_stream(&mut self, name: &str) -> Result<(), base::Error> {
        let Some(s) = self.streams_by_name.remove(name) else {
            bail_t!(NotFound, "no stream {:?}", name);
        };
        self.conn
            .prepare_cached("delete from stream where id = :id")
            .err_kind(ErrorKind::Internal)?
            .execute(rusqlite::named_params! {":id": s.id})
            .err_kind(ErrorKind::Internal)?;
        Ok(())
    }

    // --- detection zones & gating ----------------------------------------

    /// Replaces the zones configured for a stream.
    pub fn save_detection_zones(
        &mut self,
        stream_name: &str,
        zones: &[zone::ZoneToInsert],
    ) -> Result<(), base::Error> {
        if !self.streams_by_name.contains_key(stream_name) {
            bail_t!(NotFound, "no stream {:?}", stream_name);
        }
        zone::save_zones(&self.conn, stream_name, zones)
    }

    pub fn get_detection_zones(&self, stream_name: &str) -> Result<Vec<zone::Zone>, base::Error> {
        zone::list_zones(&self.conn, stream_name)
    }

    /// Mutates `detections` in place, keeping only those accepted by at
    /// least one enabled zone of the stream. With no zones configured, all
    /// detections are kept. Unknown streams are an error.
    pub fn filter_detections_by_zones(
        &self,
        stream_name: &str,
        detections: &mut Vec<zone::Detection>,
    ) -> Result<(), base::Error> {
        if !self.streams_by_name.contains_key(stream_name) {
            bail_t!(NotFound, "no stream {:?}", stream_name);
        }
        let zones = zone::list_zones(&self.conn, stream_name)?;
        zone::filter_by_zones(&zones, detections);
        Ok(())
    }

    /// Applies the stream's object include/exclude filter in place. An
    /// unknown stream means "no filter", not an error.
    pub fn filter_detections_by_stream_objects(
        &self,
        stream_name: &str,
        detections: &mut Vec<zone::Detection>,
    ) {
        let Some(s) = self.streams_by_name.get(stream_name) else {
            return;
        };
        zone::apply_object_filter(
            s.config.object_filter,
            &s.config.object_filter_list,
            detections,
        );
    }

    pub fn add_detection(
        &mut self,
        stream_name: &str,
        timestamp: Time,
        d: &zone::Detection,
    ) -> Result<i64, base::Error> {
        zone::insert_detection(&self.conn, stream_name, timestamp, d)
    }

    pub fn list_detections_in_time_range(
        &self,
        stream_name: &str,
        range: Range<Time>,
    ) -> Result<Vec<zone::DetectionRow>, base::Error> {
        zone::list_detections(&self.conn, stream_name, range)
    }

    // --- motion -----------------------------------------------------------

    /// Motion tuning for a stream; streams without a stored row get the
    /// defaults.
    pub fn get_motion_config(
        &self,
        stream_name: &str,
    ) -> Result<crate::motion::MotionConfig, base::Error> {
        crate::motion::get_config(&self.conn, stream_name)
    }

    pub fn set_motion_config(
        &mut self,
        config: &crate::motion::MotionConfig,
    ) -> Result<(), base::Error> {
        crate::motion::set_config(&self.conn, config)
    }

    pub fn add_motion_annotation(
        &mut self,
        recording_id: i64,
        motion_score: f64,
        regions: &[[f64; 4]],
    ) -> Result<i64, base::Error> {
        self.get_recording_by_id(recording_id)?;
        crate::motion::add_annotation(&self.conn, recording_id, motion_score, regions)
    }

    pub fn get_motion_annotation(
        &self,
        recording_id: i64,
    ) -> Result<Option<crate::motion::MotionAnnotation>, base::Error> {
        crate::motion::get_annotation(&self.conn, recording_id)
    }

    // --- events -----------------------------------------------------------

    pub fn add_event(
        &mut self,
        timestamp: Time,
        type_: &str,
        stream_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64, base::Error> {
        raw::insert_event(&self.conn, timestamp, type_, stream_name, description)
    }

    /// An empty range or a range with no events returns an empty list, not
    /// an error.
    pub fn list_events_in_time_range(
        &self,
        range: Range<Time>,
    ) -> Result<Vec<EventRow>, base::Error> {
        raw::list_events_in_time_range(&self.conn, range)
    }

    // --- auth -------------------------------------------------------------

    pub fn users_by_id(&self) -> &BTreeMap<i64, auth::User> {
        self.auth.users_by_id()
    }

    pub fn create_user(
        &mut self,
        username: &str,
        password: Option<&str>,
        role: auth::Role,
        now: Time,
    ) -> Result<i64, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.create_user(conn, username, password, role, now)
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<&auth::User> {
        self.auth.get_user(username)
    }

    pub fn get_user_by_api_key(&self, api_key: &str) -> Option<&auth::User> {
        self.auth.get_user_by_api_key(api_key)
    }

    pub fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<i64, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.authenticate(conn, username, password)
    }

    pub fn change_password(
        &mut self,
        username: &str,
        new_password: &str,
    ) -> Result<(), base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.change_password(conn, username, new_password)
    }

    pub fn create_session(
        &mut self,
        user_id: i64,
        peer_addr: Option<std::net::IpAddr>,
        user_agent: Option<&str>,
        ttl_sec: i64,
        now: Time,
    ) -> Result<auth::RawSessionId, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.create_session(conn, user_id, peer_addr, user_agent, ttl_sec, now)
    }

    pub fn validate_session(
        &mut self,
        token: &str,
        now: Time,
    ) -> Result<i64, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.validate_session(conn, token, now)
    }

    pub fn delete_session(&mut self, token: &str) -> Result<(), base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.delete_session(conn, token)
    }

    /// Removes expired sessions; returns how many were dropped.
    pub fn cleanup_sessions(&mut self, now: Time) -> Result<usize, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.cleanup_sessions(conn, now)
    }

    pub fn generate_api_key(&mut self, user_id: i64) -> Result<String, base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.generate_api_key(conn, user_id)
    }

    pub fn set_totp_secret(&mut self, user_id: i64, secret: &str) -> Result<(), base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.set_totp_secret(conn, user_id, secret)
    }

    pub fn enable_totp(&mut self, user_id: i64, enabled: bool) -> Result<(), base::Error> {
        let Self {
            ref conn,
            ref mut auth,
            ..
        } = *self;
        auth.enable_totp(conn, user_id, enabled)
    }

    /// Returns `(secret, enabled)` for the user.
    pub fn get_totp_info(&self, user_id: i64) -> Result<(Option<String>, bool), base::Error> {
        self.auth.get_totp_info(user_id)
    }

    // --- misc -------------------------------------------------------------

    /// On-disk byte size of the main database file plus its WAL. In-memory
    /// databases report 0.
    pub fn database_size(&self) -> Result<i64, base::Error> {
        let Some(path) = self.conn.path().filter(|p| !p.is_empty()) else {
            return Ok(0);
        };
        let mut total = std::fs::metadata(path)
            .err_kind(ErrorKind::Internal)?
            .len() as i64;
        let wal = format!("{path}-wal");
        if let Ok(m) = std::fs::metadata(&wal) {
            total += m.len() as i64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use base::clock::SimulatedClocks;

    fn setup_conn() -> rusqlite::Connection {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        super::init(&mut conn).unwrap();
        conn
    }

    fn simulated_db(boot_sec: i64) -> Database<SimulatedClocks> {
        testutil::init();
        let conn = setup_conn();
        Database::new(
            SimulatedClocks::new(time::Timespec::new(boot_sec, 0)),
            conn,
            true,
        )
        .unwrap()
    }

    fn insert(db: &Database<SimulatedClocks>, r: &RecordingToInsert) -> i64 {
        db.lock().add_recording(r).unwrap()
    }

    fn sample(stream: &str, path: &str, start: i64, end: i64) -> RecordingToInsert {
        RecordingToInsert {
            stream_name: stream.to_owned(),
            path: path.to_owned(),
            start: Time(start),
            end: Time(end),
            size_bytes: 0,
            codec: "h264".to_owned(),
            is_complete: true,
            ..Default::default()
        }
    }

    #[test]
    fn version_mismatch_is_rejected() {
        testutil::init();
        let conn = setup_conn();
        conn.execute(
            "insert into version (id, unix_time, notes) values (99, 0, 'future')",
            params![],
        )
        .unwrap();
        let e = Database::new(SimulatedClocks::new(time::Timespec::new(0, 0)), conn, true)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::FailedPrecondition);
    }

    /// A database as `init` would have created it at schema version 1,
    /// before the tiered-retention columns existed. Only the tables touched
    /// at open plus a sample recording row.
    fn setup_v1_conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            create table version (id integer primary key, unix_time integer not null, notes text);
            insert into version (id, unix_time, notes) values (1, 0, 'db creation');
            create table stream (
              id integer primary key,
              name text unique not null,
              config text not null
            );
            create table user (
              id integer primary key autoincrement,
              username text unique not null,
              password_hash text,
              password_failure_count integer not null default 0,
              role integer not null default 1,
              api_key text unique,
              totp_secret text,
              totp_enabled integer not null default 0,
              config text not null default '{}',
              created_sec integer not null
            );
            create table recording (
              id integer primary key autoincrement,
              stream_name text not null,
              path text unique not null,
              start_time integer not null,
              end_time integer not null,
              size_bytes integer not null default 0,
              width integer not null default 0,
              height integer not null default 0,
              fps integer not null default 0,
              codec text not null default '',
              trigger_type integer not null default 0,
              is_complete integer not null default 0,
              protected integer not null default 0
            );
            insert into recording (stream_name, path, start_time, end_time, size_bytes,
                                   codec, trigger_type, is_complete, protected)
                           values ('s', '/r/v1.seg', 0, 60, 10, 'h264', 0, 1, 0);
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn older_schema_reads_with_defaults() {
        testutil::init();
        let conn = setup_v1_conn();
        let db = Database::new(
            SimulatedClocks::new(time::Timespec::new(0, 0)),
            conn,
            false,
        )
        .unwrap();
        let l = db.lock();
        let row = l.get_recording_by_path("/r/v1.seg").unwrap();
        assert_eq!(row.stream_name, "s");
        assert_eq!(row.size_bytes, 10);
        // Columns missing from version 1 read as their defaults.
        assert_eq!(row.retention_override_days, -1);
        assert_eq!(row.retention_tier, RetentionTier::Standard);
        assert!(row.disk_pressure_eligible);

        // The queries whose where clauses mention version 2 columns still
        // run; every row counts as eligible / non-overridden.
        let rows = l
            .list_recordings_for_retention("s", 0, 0, 10, Time(86400))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(l.list_pressure_candidates(10).unwrap().len(), 1);
        assert_eq!(l.list_recordings_for_quota("s", 10).unwrap().len(), 1);
    }

    #[test]
    fn older_schema_rejected_for_read_write() {
        testutil::init();
        let conn = setup_v1_conn();
        let e = Database::new(
            SimulatedClocks::new(time::Timespec::new(0, 0)),
            conn,
            true,
        )
        .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn recording_crud_round_trip() {
        let db = simulated_db(10_000);
        let id = insert(&db, &sample("front", "/var/rec/front/1.mp4", 1000, 1060));
        let mut l = db.lock();
        let row = l.get_recording_by_id(id).unwrap();
        assert_eq!(row.stream_name, "front");
        assert_eq!(row.start, Time(1000));
        assert_eq!(row.trigger, Trigger::Scheduled);
        assert_eq!(row.retention_tier, RetentionTier::Standard);
        assert!(row.disk_pressure_eligible);

        let by_path = l.get_recording_by_path("/var/rec/front/1.mp4").unwrap();
        assert_eq!(by_path.id, id);

        l.update_recording(id, Time(1120), 4096, true).unwrap();
        let row = l.get_recording_by_id(id).unwrap();
        assert_eq!(row.end, Time(1120));
        assert_eq!(row.size_bytes, 4096);
        assert!(row.is_complete);

        l.delete_recording(id).unwrap();
        assert_eq!(
            l.get_recording_by_id(id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn add_recording_validates_arguments() {
        let db = simulated_db(0);
        let mut l = db.lock();
        let mut r = sample("front", "relative/path.mp4", 0, 1);
        assert_eq!(
            l.add_recording(&r).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        r.path = "/abs/path.mp4".to_owned();
        r.stream_name = String::new();
        assert_eq!(
            l.add_recording(&r).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        r.stream_name = "front".to_owned();
        r.start = Time(10);
        r.end = Time(5);
        assert_eq!(
            l.add_recording(&r).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn duplicate_path_conflicts() {
        let db = simulated_db(0);
        insert(&db, &sample("a", "/r/a/1.mp4", 0, 1));
        let e = db
            .lock()
            .add_recording(&sample("b", "/r/a/1.mp4", 5, 6))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn transaction_visibility_and_rollback() {
        let db = simulated_db(0);
        let mut l = db.lock();
        l.begin_transaction().unwrap();
        let id = l
            .add_recording(&sample("front", "/r/f/1.mp4", 0, 10))
            .unwrap();
        // Visible immediately within the same transaction.
        l.get_recording_by_id(id).unwrap();
        l.rollback_transaction().unwrap();
        assert_eq!(
            l.get_recording_by_id(id).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        l.begin_transaction().unwrap();
        let id = l
            .add_recording(&sample("front", "/r/f/2.mp4", 0, 10))
            .unwrap();
        l.commit_transaction().unwrap();
        l.get_recording_by_id(id).unwrap();
    }

    #[test]
    fn commit_without_begin_is_safe_conflict() {
        let db = simulated_db(0);
        let mut l = db.lock();
        assert_eq!(
            l.commit_transaction().unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            l.rollback_transaction().unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        // The catalog is still usable afterward.
        l.add_recording(&sample("front", "/r/f/1.mp4", 0, 1)).unwrap();
    }

    #[test]
    fn quota_list_is_oldest_first() {
        let db = simulated_db(0);
        let day = 86400;
        let now = 100 * day;
        insert(&db, &sample("s", "/r/s/a.mp4", now - day, now - day + 60));
        insert(&db, &sample("s", "/r/s/b.mp4", now - 5 * day, now - 5 * day + 60));
        insert(&db, &sample("s", "/r/s/c.mp4", now - 9 * day, now - 9 * day + 60));
        let rows = db.lock().list_recordings_for_quota("s", 10).unwrap();
        let paths: Vec<_> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/r/s/c.mp4", "/r/s/b.mp4", "/r/s/a.mp4"]);
    }

    #[test]
    fn retention_list_honors_trigger_class() {
        let db = simulated_db(0);
        let day = 86400;
        let now = Time(100 * day);
        let mut young = sample("s", "/r/s/young.mp4", now.0 - 10 * day, now.0 - 10 * day + 60);
        young.trigger = Trigger::Detection;
        insert(&db, &young);
        let mut old = sample("s", "/r/s/old.mp4", now.0 - 20 * day, now.0 - 20 * day + 60);
        old.trigger = Trigger::Detection;
        insert(&db, &old);

        let rows = db
            .lock()
            .list_recordings_for_retention("s", 7, 14, 100, now)
            .unwrap();
        let paths: Vec<_> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/r/s/old.mp4"]);
    }

    #[test]
    fn retention_list_never_returns_protected() {
        let db = simulated_db(0);
        let day = 86400;
        let now = Time(100 * day);
        let id = insert(
            &db,
            &sample("s", "/r/s/old.mp4", now.0 - 50 * day, now.0 - 50 * day + 60),
        );
        let mut l = db.lock();
        l.set_recording_protected(id, true).unwrap();
        assert!(l
            .list_recordings_for_retention("s", 7, 14, 100, now)
            .unwrap()
            .is_empty());
        assert!(l.list_recordings_for_quota("s", 100).unwrap().is_empty());
        assert!(l.list_pressure_candidates(100).unwrap().is_empty());
    }

    #[test]
    fn paginated_sort_and_filters() {
        let db = simulated_db(0);
        let mut manual = sample("s", "/r/s/m.mp4", 100, 160);
        manual.trigger = Trigger::Manual;
        manual.size_bytes = 10;
        insert(&db, &manual);
        let mut sched = sample("s", "/r/s/s.mp4", 200, 260);
        sched.size_bytes = 99;
        insert(&db, &sched);
        insert(&db, &sample("other", "/r/o/x.mp4", 150, 210));

        let l = db.lock();
        let q = RecordingQuery {
            stream_name: Some("s"),
            sort: RecordingSort::SizeBytes,
            order: SortOrder::Desc,
            ..Default::default()
        };
        let rows = l.list_recordings_paginated(&q).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].path, "/r/s/s.mp4");
        assert_eq!(l.count_recordings(&q).unwrap(), 2);

        let q = RecordingQuery {
            trigger: Some(Trigger::Manual),
            ..Default::default()
        };
        let rows = l.list_recordings_paginated(&q).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "/r/s/m.mp4");

        let q = RecordingQuery {
            limit: 1,
            offset: 1,
            stream_name: Some("s"),
            ..Default::default()
        };
        assert_eq!(l.list_recordings_paginated(&q).unwrap().len(), 1);
    }

    #[test]
    fn stream_config_round_trip() {
        let db = simulated_db(0);
        let mut config = StreamConfig {
            url: Some(url::Url::parse("rtsp://camera/main").unwrap()),
            retention_days: 14,
            detection_retention_days: 30,
            max_bytes: Some(1 << 30),
            ..Default::default()
        };
        config.object_filter = crate::json::ObjectFilter::Include;
        config.object_filter_list = "person,car".to_owned();
        {
            let mut l = db.lock();
            l.add_stream("front", config.clone()).unwrap();
            assert_eq!(
                l.add_stream("front", StreamConfig::default())
                    .unwrap_err()
                    .kind(),
                ErrorKind::AlreadyExists
            );
        }

        // Survives a fresh open.
        let conn = db.close();
        let db = Database::new(
            SimulatedClocks::new(time::Timespec::new(0, 0)),
            conn,
            false,
        )
        .unwrap();
        let l = db.lock();
        let s = l.get_stream("front").unwrap();
        assert_eq!(s.config, config);
    }

    #[test]
    fn events_in_range() {
        let db = simulated_db(0);
        let mut l = db.lock();
        l.add_event(Time(1000), "stream_started", Some("front"), None)
            .unwrap();
        // A range that misses the event yields count 0, not an error.
        let out = l.list_events_in_time_range(Time(0)..Time(1000)).unwrap();
        assert!(out.is_empty());
        let out = l.list_events_in_time_range(Time(1000)..Time(1001)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].type_, "stream_started");
    }

    #[test]
    fn storage_bytes_sums_sizes() {
        let db = simulated_db(0);
        let mut a = sample("s", "/r/s/a.mp4", 0, 10);
        a.size_bytes = 100;
        let mut b = sample("s", "/r/s/b.mp4", 20, 30);
        b.size_bytes = 50;
        insert(&db, &a);
        insert(&db, &b);
        insert(&db, &sample("t", "/r/t/a.mp4", 0, 10));
        assert_eq!(db.lock().stream_storage_bytes("s").unwrap(), 150);
        assert_eq!(db.lock().stream_storage_bytes("missing").unwrap(), 0);
    }

    #[test]
    fn base_retention_days_override() {
        let mut row = RecordingRow {
            id: 1,
            stream_name: "s".into(),
            path: "/r".into(),
            start: Time(0),
            end: Time(0),
            size_bytes: 0,
            width: 0,
            height: 0,
            fps: 0,
            codec: String::new(),
            trigger: Trigger::Detection,
            is_complete: true,
            protected: false,
            retention_override_days: -1,
            retention_tier: RetentionTier::Standard,
            disk_pressure_eligible: true,
        };
        assert_eq!(row.base_retention_days(7, 14), 14);
        row.trigger = Trigger::Manual;
        assert_eq!(row.base_retention_days(7, 14), 7);
        row.retention_override_days = 3;
        assert_eq!(row.base_retention_days(7, 14), 3);
    }
}
