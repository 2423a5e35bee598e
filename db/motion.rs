// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Motion detection settings and per-recording motion annotations.
//!
//! The motion detector itself is a collaborator; what it persists here is
//! its per-stream tuning and, for motion-triggered recordings, the score
//! and regions that justified the trigger.

use base::{bail_t, ErrorKind, ResultExt as _};
use rusqlite::{named_params, Connection};

/// Per-stream motion tuning. Streams without a row use the defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionConfig {
    pub stream_name: String,
    pub enabled: bool,

    /// Detector sensitivity in [0, 1]; higher trips on smaller changes.
    pub sensitivity: f64,

    /// Minimum changed area, as a fraction of the frame, in [0, 1].
    pub min_area: f64,

    /// Seconds to wait after a trigger before another can fire.
    pub cooldown_sec: i64,
}

impl MotionConfig {
    pub fn defaults_for(stream_name: &str) -> Self {
        MotionConfig {
            stream_name: stream_name.to_owned(),
            enabled: false,
            sensitivity: 0.5,
            min_area: 0.01,
            cooldown_sec: 10,
        }
    }

    fn validate(&self) -> Result<(), base::Error> {
        if self.stream_name.is_empty() {
            bail_t!(InvalidArgument, "motion config requires a stream name");
        }
        if !(0.0..=1.0).contains(&self.sensitivity) {
            bail_t!(InvalidArgument, "sensitivity {} out of [0, 1]", self.sensitivity);
        }
        if !(0.0..=1.0).contains(&self.min_area) {
            bail_t!(InvalidArgument, "min_area {} out of [0, 1]", self.min_area);
        }
        if self.cooldown_sec < 0 {
            bail_t!(InvalidArgument, "cooldown {} must be non-negative", self.cooldown_sec);
        }
        Ok(())
    }
}

/// A motion annotation attached 1:1 to a recording row.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionAnnotation {
    pub id: i64,
    pub recording_id: i64,
    pub motion_score: f64,

    /// `[x, y, w, h]` regions in normalized coordinates.
    pub regions: Vec<[f64; 4]>,
}

pub(crate) fn get_config(
    conn: &Connection,
    stream_name: &str,
) -> Result<MotionConfig, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            select enabled, sensitivity, min_area, cooldown_sec
            from motion_config
            where stream_name = :stream_name
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    let row = stmt.query_row(named_params! {":stream_name": stream_name}, |row| {
        Ok(MotionConfig {
            stream_name: stream_name.to_owned(),
            enabled: row.get(0)?,
            sensitivity: row.get(1)?,
            min_area: row.get(2)?,
            cooldown_sec: row.get(3)?,
        })
    });
    match row {
        Ok(c) => Ok(c),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(MotionConfig::defaults_for(stream_name)),
        Err(e) => Err(e).err_kind(ErrorKind::Internal),
    }
}

pub(crate) fn set_config(conn: &Connection, config: &MotionConfig) -> Result<(), base::Error> {
    config.validate()?;
    conn.prepare_cached(
        r#"
        insert into motion_config (stream_name,  enabled,  sensitivity,  min_area,  cooldown_sec)
                           values (:stream_name, :enabled, :sensitivity, :min_area, :cooldown_sec)
        on conflict (stream_name) do update set
            enabled = :enabled,
            sensitivity = :sensitivity,
            min_area = :min_area,
            cooldown_sec = :cooldown_sec
        "#,
    )
    .err_kind(ErrorKind::Internal)?
    .execute(named_params! {
        ":stream_name": &config.stream_name,
        ":enabled": config.enabled,
        ":sensitivity": config.sensitivity,
        ":min_area": config.min_area,
        ":cooldown_sec": config.cooldown_sec,
    })
    .err_kind(ErrorKind::Internal)?;
    Ok(())
}

pub(crate) fn add_annotation(
    conn: &Connection,
    recording_id: i64,
    motion_score: f64,
    regions: &[[f64; 4]],
) -> Result<i64, base::Error> {
    if !(0.0..=1.0).contains(&motion_score) {
        bail_t!(InvalidArgument, "motion score {} out of [0, 1]", motion_score);
    }
    if get_annotation(conn, recording_id)?.is_some() {
        bail_t!(
            AlreadyExists,
            "recording {} already has a motion annotation",
            recording_id
        );
    }
    let regions_json =
        serde_json::to_string(regions).expect("vec of region tuples is serializable");
    conn.prepare_cached(
        r#"
        insert into motion_recording (recording_id,  motion_score,  regions)
                              values (:recording_id, :motion_score, :regions)
        "#,
    )
    .err_kind(ErrorKind::Internal)?
    .execute(named_params! {
        ":recording_id": recording_id,
        ":motion_score": motion_score,
        ":regions": regions_json,
    })
    .err_kind(ErrorKind::Internal)?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get_annotation(
    conn: &Connection,
    recording_id: i64,
) -> Result<Option<MotionAnnotation>, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            select id, motion_score, regions
            from motion_recording
            where recording_id = :recording_id
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    let row = stmt.query_row(named_params! {":recording_id": recording_id}, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    });
    match row {
        Ok((id, motion_score, regions_json)) => {
            let regions = match regions_json {
                None => Vec::new(),
                Some(j) => serde_json::from_str(&j).err_kind(ErrorKind::DataLoss)?,
            };
            Ok(Some(MotionAnnotation {
                id,
                recording_id,
                motion_score,
                regions,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).err_kind(ErrorKind::Internal),
    }
}
