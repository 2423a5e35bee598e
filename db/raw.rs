// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Raw database access: SQLite statements which do not touch any cached state.
//!
//! Recording reads go through a [`QueryBuilder`] built once at open, so a
//! reader binary stays usable against the schema versions `db::init`'s
//! history covers: columns added by later migrations are optional, read as
//! their defaults when absent, and the `where` clauses that mention them
//! are only emitted when they exist. Writers have no such latitude; the
//! insert/update statements below name current-version columns, which is
//! why read-write opens require the current schema.

use crate::db::{
    EventRow, RecordingQuery, RecordingRow, RecordingSort, RecordingToInsert, RetentionTier,
    SortOrder, Trigger,
};
use crate::query::QueryBuilder;
use base::time::Time;
use base::{bail_t, ErrorKind, ResultExt as _};
use rusqlite::types::Value;
use rusqlite::{named_params, params, Connection};
use std::ops::Range;

const INSERT_RECORDING_SQL: &str = r#"
    insert into recording (stream_name,  path,  start_time,  end_time,  size_bytes,
                           width,  height,  fps,  codec,  trigger_type,  is_complete,
                           protected,  retention_override_days,  retention_tier,
                           disk_pressure_eligible)
                   values (:stream_name, :path, :start_time, :end_time, :size_bytes,
                           :width, :height, :fps, :codec, :trigger_type, :is_complete,
                           :protected, :retention_override_days, :retention_tier,
                           :disk_pressure_eligible)
"#;

const STREAM_STORAGE_BYTES_SQL: &str = r#"
    select
      coalesce(sum(size_bytes), 0)
    from
      recording
    where
      stream_name = :stream_name
"#;

/// Builds the column set for recording reads. Schema version 1 columns are
/// required; the tiered-retention columns added in version 2 are optional,
/// so a read-only open of a version 1 database still works.
pub(crate) fn recording_query(conn: &Connection) -> Result<QueryBuilder, base::Error> {
    let mut qb = QueryBuilder::new(conn, "recording")?;
    for col in [
        "id",
        "stream_name",
        "path",
        "start_time",
        "end_time",
        "size_bytes",
        "width",
        "height",
        "fps",
        "codec",
        "trigger_type",
        "is_complete",
        "protected",
    ] {
        qb.add_column(col, true)?;
    }
    for col in [
        "retention_override_days",
        "retention_tier",
        "disk_pressure_eligible",
    ] {
        qb.add_column(col, false)?;
    }
    Ok(qb)
}

fn row_to_recording(qb: &QueryBuilder, row: &rusqlite::Row) -> Result<RecordingRow, base::Error> {
    let trigger_raw = qb.get_int(row, "trigger_type", 0)?;
    let Some(trigger) = Trigger::from_i64(trigger_raw) else {
        bail_t!(DataLoss, "bad trigger {} in recording row", trigger_raw);
    };
    let tier_raw = qb.get_int(row, "retention_tier", RetentionTier::Standard as i64)?;
    let Some(retention_tier) = RetentionTier::from_i64(tier_raw) else {
        bail_t!(DataLoss, "bad retention tier {} in recording row", tier_raw);
    };
    Ok(RecordingRow {
        id: qb.get_int(row, "id", 0)?,
        stream_name: qb.get_text(row, "stream_name", "")?,
        path: qb.get_text(row, "path", "")?,
        start: Time(qb.get_int(row, "start_time", 0)?),
        end: Time(qb.get_int(row, "end_time", 0)?),
        size_bytes: qb.get_int(row, "size_bytes", 0)?,
        width: qb.get_int(row, "width", 0)? as i32,
        height: qb.get_int(row, "height", 0)? as i32,
        fps: qb.get_int(row, "fps", 0)? as i32,
        codec: qb.get_text(row, "codec", "")?,
        trigger,
        is_complete: qb.get_bool(row, "is_complete", false)?,
        protected: qb.get_bool(row, "protected", false)?,
        retention_override_days: qb.get_int(row, "retention_override_days", -1)?,
        retention_tier,
        disk_pressure_eligible: qb.get_bool(row, "disk_pressure_eligible", true)?,
    })
}

pub(crate) fn insert_recording(
    conn: &Connection,
    r: &RecordingToInsert,
) -> Result<i64, base::Error> {
    let mut stmt = conn
        .prepare_cached(INSERT_RECORDING_SQL)
        .err_kind(ErrorKind::Internal)?;
    stmt.execute(named_params! {
        ":stream_name": &r.stream_name,
        ":path": &r.path,
        ":start_time": r.start.0,
        ":end_time": r.end.0,
        ":size_bytes": r.size_bytes,
        ":width": r.width,
        ":height": r.height,
        ":fps": r.fps,
        ":codec": &r.codec,
        ":trigger_type": r.trigger,
        ":is_complete": r.is_complete,
        ":protected": r.protected,
        ":retention_override_days": r.retention_override_days,
        ":retention_tier": r.retention_tier,
        ":disk_pressure_eligible": r.disk_pressure_eligible,
    })
    .err_kind(ErrorKind::Internal)?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get_recording_by_id(
    conn: &Connection,
    qb: &QueryBuilder,
    id: i64,
) -> Result<Option<RecordingRow>, base::Error> {
    let sql = qb.build_select(Some("id = :id"), None)?;
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(named_params! {":id": id})
        .err_kind(ErrorKind::Internal)?;
    match rows.next().err_kind(ErrorKind::Internal)? {
        Some(row) => Ok(Some(row_to_recording(qb, row)?)),
        None => Ok(None),
    }
}

pub(crate) fn get_recording_by_path(
    conn: &Connection,
    qb: &QueryBuilder,
    path: &str,
) -> Result<Option<RecordingRow>, base::Error> {
    let sql = qb.build_select(Some("path = :path"), None)?;
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(named_params! {":path": path})
        .err_kind(ErrorKind::Internal)?;
    match rows.next().err_kind(ErrorKind::Internal)? {
        Some(row) => Ok(Some(row_to_recording(qb, row)?)),
        None => Ok(None),
    }
}

/// Updates the mutable completion fields of a recording row.
/// Returns the number of rows changed (0 or 1).
pub(crate) fn update_recording(
    conn: &Connection,
    id: i64,
    end: Time,
    size_bytes: i64,
    is_complete: bool,
) -> Result<usize, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            update recording
            set end_time = :end_time,
                size_bytes = :size_bytes,
                is_complete = :is_complete
            where id = :id
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    stmt.execute(named_params! {
        ":id": id,
        ":end_time": end.0,
        ":size_bytes": size_bytes,
        ":is_complete": is_complete,
    })
    .err_kind(ErrorKind::Internal)
}

/// Sets a single integer-valued flag column. `column` must come from a
/// compile-time constant; it is interpolated into the statement.
pub(crate) fn set_recording_column(
    conn: &Connection,
    id: i64,
    column: &'static str,
    value: i64,
) -> Result<usize, base::Error> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "update recording set {column} = :value where id = :id"
        ))
        .err_kind(ErrorKind::Internal)?;
    stmt.execute(named_params! {":id": id, ":value": value})
        .err_kind(ErrorKind::Internal)
}

pub(crate) fn delete_recording_row(conn: &Connection, id: i64) -> Result<usize, base::Error> {
    let n = conn
        .prepare_cached("delete from motion_recording where recording_id = ?")
        .err_kind(ErrorKind::Internal)?
        .execute(params![id])
        .err_kind(ErrorKind::Internal)?;
    debug_assert!(n <= 1);
    conn.prepare_cached("delete from recording where id = ?")
        .err_kind(ErrorKind::Internal)?
        .execute(params![id])
        .err_kind(ErrorKind::Internal)
}

/// Lists recordings overlapping the given time range in ascending order by
/// start time, passing them to a supplied function. Given that the function
/// is called with the database lock held, it should be quick.
pub(crate) fn list_recordings_by_time(
    conn: &Connection,
    qb: &QueryBuilder,
    stream_name: Option<&str>,
    desired_time: Range<Time>,
    f: &mut dyn FnMut(RecordingRow) -> Result<(), base::Error>,
) -> Result<(), base::Error> {
    let mut clauses = vec!["start_time < :end and end_time > :start".to_owned()];
    if stream_name.is_some() {
        clauses.push("stream_name = :stream_name".to_owned());
    }
    let sql = qb.build_select(Some(&clauses.join(" and ")), Some("start_time"))?;
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = match stream_name {
        Some(s) => stmt
            .query(named_params! {
                ":start": desired_time.start.0,
                ":end": desired_time.end.0,
                ":stream_name": s,
            })
            .err_kind(ErrorKind::Internal)?,
        None => stmt
            .query(named_params! {
                ":start": desired_time.start.0,
                ":end": desired_time.end.0,
            })
            .err_kind(ErrorKind::Internal)?,
    };
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        f(row_to_recording(qb, row)?)?;
    }
    Ok(())
}

/// Builds the `where` clause and positional parameter list shared by the
/// paginated list and count queries.
fn query_filters(q: &RecordingQuery) -> (String, Vec<Value>) {
    let mut clauses = vec!["start_time < ? and end_time > ?".to_owned()];
    let mut values: Vec<Value> = vec![Value::Integer(q.end.0), Value::Integer(q.start.0)];
    if let Some(s) = q.stream_name {
        clauses.push("stream_name = ?".to_owned());
        values.push(Value::Text(s.to_owned()));
    }
    if let Some(t) = q.trigger {
        clauses.push("trigger_type = ?".to_owned());
        values.push(Value::Integer(t as i64));
    }
    if let Some(label) = q.label {
        clauses.push(
            "exists (select 1 from detection d \
             where d.stream_name = recording.stream_name \
             and d.timestamp between recording.start_time and recording.end_time \
             and d.label = ?)"
                .to_owned(),
        );
        values.push(Value::Text(label.to_owned()));
    }
    (clauses.join(" and "), values)
}

pub(crate) fn list_recordings_paginated(
    conn: &Connection,
    qb: &QueryBuilder,
    q: &RecordingQuery,
) -> Result<Vec<RecordingRow>, base::Error> {
    let (where_clause, mut values) = query_filters(q);
    let sort = match q.sort {
        RecordingSort::Id => "id",
        RecordingSort::StartTime => "start_time",
        RecordingSort::EndTime => "end_time",
        RecordingSort::SizeBytes => "size_bytes",
    };
    let order = match q.order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    let mut sql = qb.build_select(
        Some(&where_clause),
        Some(&format!("{sort} {order}")),
    )?;
    sql.push_str(" limit ? offset ?");
    values.push(Value::Integer(q.limit));
    values.push(Value::Integer(q.offset));
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(rusqlite::params_from_iter(values))
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(row_to_recording(qb, row)?);
    }
    Ok(out)
}

pub(crate) fn count_recordings(
    conn: &Connection,
    q: &RecordingQuery,
) -> Result<i64, base::Error> {
    let (where_clause, values) = query_filters(q);
    let sql = format!("select count(*) from recording where {where_clause}");
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    stmt.query_row(rusqlite::params_from_iter(values), |row| row.get(0))
        .err_kind(ErrorKind::Internal)
}

pub(crate) fn stream_storage_bytes(
    conn: &Connection,
    stream_name: &str,
) -> Result<i64, base::Error> {
    let mut stmt = conn
        .prepare_cached(STREAM_STORAGE_BYTES_SQL)
        .err_kind(ErrorKind::Internal)?;
    stmt.query_row(named_params! {":stream_name": stream_name}, |row| {
        row.get(0)
    })
    .err_kind(ErrorKind::Internal)
}

/// Returns complete, non-protected recordings older than the per-trigger
/// cutoff, oldest first. Scheduled/manual rows use `regular_cutoff`;
/// detection/motion rows use `detection_cutoff`; rows with a non-negative
/// per-row override are measured against that instead. On a schema without
/// the override column, every row follows its trigger's cutoff.
pub(crate) fn list_recordings_for_retention(
    conn: &Connection,
    qb: &QueryBuilder,
    stream_name: &str,
    regular_cutoff: Time,
    detection_cutoff: Time,
    limit: i64,
    now: Time,
) -> Result<Vec<RecordingRow>, base::Error> {
    let mut clauses = vec![
        "stream_name = ?".to_owned(),
        "is_complete = 1".to_owned(),
        "protected = 0".to_owned(),
    ];
    let mut values: Vec<Value> = vec![Value::Text(stream_name.to_owned())];
    let age_clause = format!(
        "((trigger_type in ({sched}, {manual}) and start_time < ?) or \
          (trigger_type in ({detect}, {motion}) and start_time < ?))",
        sched = Trigger::Scheduled as i64,
        manual = Trigger::Manual as i64,
        detect = Trigger::Detection as i64,
        motion = Trigger::Motion as i64,
    );
    if qb.has_column("retention_override_days") {
        clauses.push(format!(
            "((retention_override_days >= 0 and \
               start_time < ? - retention_override_days * 86400) or \
              (retention_override_days < 0 and {age_clause}))"
        ));
        values.push(Value::Integer(now.0));
    } else {
        clauses.push(age_clause);
    }
    values.push(Value::Integer(regular_cutoff.0));
    values.push(Value::Integer(detection_cutoff.0));
    let mut sql = qb.build_select(Some(&clauses.join(" and ")), Some("start_time"))?;
    sql.push_str(" limit ?");
    values.push(Value::Integer(limit));
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(rusqlite::params_from_iter(values))
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(row_to_recording(qb, row)?);
    }
    Ok(out)
}

/// Returns all complete, non-protected recordings of a stream, oldest first.
pub(crate) fn list_recordings_for_quota(
    conn: &Connection,
    qb: &QueryBuilder,
    stream_name: &str,
    limit: i64,
) -> Result<Vec<RecordingRow>, base::Error> {
    let mut sql = qb.build_select(
        Some("stream_name = ? and is_complete = 1 and protected = 0"),
        Some("start_time"),
    )?;
    sql.push_str(" limit ?");
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(params![stream_name, limit])
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(row_to_recording(qb, row)?);
    }
    Ok(out)
}

/// Returns the oldest complete, non-protected, pressure-eligible recordings
/// across all streams, for the emergency deletion policy. Rows on a schema
/// without the eligibility column count as eligible (the default).
pub(crate) fn list_pressure_candidates(
    conn: &Connection,
    qb: &QueryBuilder,
    limit: i64,
) -> Result<Vec<RecordingRow>, base::Error> {
    let mut clauses = vec!["is_complete = 1", "protected = 0"];
    if qb.has_column("disk_pressure_eligible") {
        clauses.push("disk_pressure_eligible = 1");
    }
    let mut sql = qb.build_select(Some(&clauses.join(" and ")), Some("start_time"))?;
    sql.push_str(" limit ?");
    let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
    let mut rows = stmt.query(params![limit]).err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(row_to_recording(qb, row)?);
    }
    Ok(out)
}

/// Rows the size-sync task should reconcile: complete but with no recorded
/// byte size.
pub(crate) fn list_unsized_complete(conn: &Connection) -> Result<Vec<(i64, String)>, base::Error> {
    let mut stmt = conn
        .prepare_cached("select id, path from recording where is_complete = 1 and size_bytes = 0")
        .err_kind(ErrorKind::Internal)?;
    let mut rows = stmt.query(params![]).err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push((
            row.get(0).err_kind(ErrorKind::Internal)?,
            row.get(1).err_kind(ErrorKind::Internal)?,
        ));
    }
    Ok(out)
}

pub(crate) fn insert_event(
    conn: &Connection,
    timestamp: Time,
    type_: &str,
    stream_name: Option<&str>,
    description: Option<&str>,
) -> Result<i64, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            insert into event (timestamp,  type,  stream_name,  description)
                       values (:timestamp, :type, :stream_name, :description)
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    stmt.execute(named_params! {
        ":timestamp": timestamp.0,
        ":type": type_,
        ":stream_name": stream_name,
        ":description": description,
    })
    .err_kind(ErrorKind::Internal)?;
    Ok(conn.last_insert_rowid())
}

/// Lists events within `[range.start, range.end)`. An empty result is not an
/// error; callers treat it as count 0.
pub(crate) fn list_events_in_time_range(
    conn: &Connection,
    range: Range<Time>,
) -> Result<Vec<EventRow>, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            select id, timestamp, type, stream_name, description
            from event
            where timestamp >= :start and timestamp < :end
            order by timestamp
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(named_params! {":start": range.start.0, ":end": range.end.0})
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(EventRow {
            id: row.get(0).err_kind(ErrorKind::Internal)?,
            timestamp: Time(row.get(1).err_kind(ErrorKind::Internal)?),
            type_: row.get(2).err_kind(ErrorKind::Internal)?,
            stream_name: row.get(3).err_kind(ErrorKind::Internal)?,
            description: row.get(4).err_kind(ErrorKind::Internal)?,
        });
    }
    Ok(out)
}
