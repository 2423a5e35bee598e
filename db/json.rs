// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! JSON types for use in the database schema. See references from `schema.sql`.

use rusqlite::types::{FromSqlError, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

macro_rules! sql {
    ($l:ident) => {
        impl rusqlite::types::FromSql for $l {
            fn column_result(value: ValueRef) -> Result<Self, FromSqlError> {
                match value {
                    ValueRef::Text(t) => {
                        Ok(serde_json::from_slice(t)
                            .map_err(|e| FromSqlError::Other(Box::new(e)))?)
                    }
                    _ => Err(FromSqlError::InvalidType),
                }
            }
        }

        impl rusqlite::types::ToSql for $l {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(serde_json::to_string(&self)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))?
                    .into())
            }
        }
    };
}

/// Which labels to keep when detection results pass the stream-object gate.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFilter {
    /// No filtering; every label passes.
    #[default]
    None,

    /// Keep only labels in `object_filter_list`.
    Include,

    /// Drop labels in `object_filter_list`.
    Exclude,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// The `rtsp://` URL to use for this stream, excluding username and
    /// password. Credentials belong to the ingestion collaborator.
    pub url: Option<Url>,

    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub fps: u32,

    /// Codec label as stored on recording rows, eg `h264`.
    #[serde(default)]
    pub codec: String,

    /// Scheduling priority, 0 (lowest) through 10.
    #[serde(default)]
    pub priority: u8,

    /// Days to retain scheduled/manual recordings. 0 disables age-based
    /// deletion for this stream.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Days to retain detection/motion recordings.
    #[serde(default = "default_retention_days")]
    pub detection_retention_days: i64,

    /// Per-stream byte quota, enforced oldest-first. `None` means no quota.
    #[serde(default)]
    pub max_bytes: Option<i64>,

    #[serde(default)]
    pub object_filter: ObjectFilter,

    /// Comma-separated labels consumed according to `object_filter`.
    #[serde(default)]
    pub object_filter_list: String,

    /// Retention-tier multipliers; the Standard tier is pinned at 1.0.
    #[serde(default = "default_critical_multiplier")]
    pub critical_multiplier: f64,
    #[serde(default = "default_important_multiplier")]
    pub important_multiplier: f64,
    #[serde(default = "default_ephemeral_multiplier")]
    pub ephemeral_multiplier: f64,

    /// Relative weight when several streams compete for disk.
    #[serde(default)]
    pub storage_priority: i32,

    #[serde(default = "default_true")]
    pub streaming_enabled: bool,

    #[serde(default)]
    pub detection_based_recording: bool,

    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}
sql!(StreamConfig);

fn default_retention_days() -> i64 {
    30
}
fn default_critical_multiplier() -> f64 {
    3.0
}
fn default_important_multiplier() -> f64 {
    2.0
}
fn default_ephemeral_multiplier() -> f64 {
    0.25
}
fn default_true() -> bool {
    true
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            url: None,
            width: 0,
            height: 0,
            fps: 0,
            codec: String::new(),
            priority: 0,
            retention_days: default_retention_days(),
            detection_retention_days: default_retention_days(),
            max_bytes: None,
            object_filter: ObjectFilter::None,
            object_filter_list: String::new(),
            critical_multiplier: default_critical_multiplier(),
            important_multiplier: default_important_multiplier(),
            ephemeral_multiplier: default_ephemeral_multiplier(),
            storage_priority: 0,
            streaming_enabled: true,
            detection_based_recording: false,
            unknown: Map::new(),
        }
    }
}

/// Per-user settings without a dedicated column.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default)]
    pub disabled: bool,

    /// Preferred UI locale and similar cosmetic settings ride along here.
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}
sql!(UserConfig);
