// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Runtime configuration: a single TOML document.
//!
//! Unknown keys are tolerated so configs can move between versions; the
//! validation rules below are the contract a config must pass before the
//! process commits to starting.

use base::bail_t;
use db::json::{ObjectFilter, StreamConfig};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/lantern-nvr.toml";

static CUSTOM_CONFIG_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Overrides the config file location. Best-effort: an empty string is
/// silently ignored.
pub fn set_custom_config_path(path: &str) {
    if path.is_empty() {
        return;
    }
    *CUSTOM_CONFIG_PATH.lock() = Some(PathBuf::from(path));
}

pub fn config_path() -> PathBuf {
    CUSTOM_CONFIG_PATH
        .lock()
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    pub web_root: String,

    #[serde(default = "default_true")]
    pub web_auth_enabled: bool,

    #[serde(default = "default_web_username")]
    pub web_username: String,

    #[serde(default = "default_true")]
    pub web_compression_enabled: bool,

    #[serde(default = "default_auth_timeout_hours")]
    pub auth_timeout_hours: i64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub syslog_enabled: bool,

    /// Default retention days for streams that don't override it.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Packet buffer pool budget, in MiB.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    pub storage_path: String,
    pub db_path: String,
    pub models_path: String,

    #[serde(default = "default_segment_duration")]
    pub mp4_segment_duration_seconds: i64,

    #[serde(default)]
    pub use_swap: bool,

    /// Spill budget in MiB; required non-zero iff `use_swap`.
    #[serde(default)]
    pub swap_size: u64,

    #[serde(default)]
    pub streams: Vec<StreamEntry>,

    #[serde(default)]
    pub turn_enabled: bool,

    #[serde(default)]
    pub mqtt_enabled: bool,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_true")]
    pub go2rtc_enabled: bool,

    #[serde(default = "default_go2rtc_api_port")]
    pub go2rtc_api_port: u16,

    #[serde(default = "default_true")]
    pub webrtc_enabled: bool,

    #[serde(default = "default_true")]
    pub stun_enabled: bool,

    #[serde(default)]
    pub demo_mode: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StreamEntry {
    pub name: String,
    pub url: Url,

    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub fps: u32,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub priority: u8,

    /// Falls back to the global `retention_days` when absent.
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub detection_retention_days: Option<i64>,

    #[serde(default)]
    pub max_bytes: Option<i64>,

    #[serde(default)]
    pub object_filter: ObjectFilter,
    #[serde(default)]
    pub object_filter_list: String,

    #[serde(default)]
    pub storage_priority: i32,

    #[serde(default = "default_true")]
    pub streaming_enabled: bool,

    #[serde(default)]
    pub detection_based_recording: bool,
}

impl StreamEntry {
    /// The per-stream catalog config this entry implies.
    pub fn to_stream_config(&self, global_retention_days: i64) -> StreamConfig {
        StreamConfig {
            url: Some(self.url.clone()),
            width: self.width,
            height: self.height,
            fps: self.fps,
            codec: self.codec.clone(),
            priority: self.priority,
            retention_days: self.retention_days.unwrap_or(global_retention_days),
            detection_retention_days: self
                .detection_retention_days
                .unwrap_or(global_retention_days),
            max_bytes: self.max_bytes,
            object_filter: self.object_filter,
            object_filter_list: self.object_filter_list.clone(),
            storage_priority: self.storage_priority,
            streaming_enabled: self.streaming_enabled,
            detection_based_recording: self.detection_based_recording,
            ..Default::default()
        }
    }
}

fn default_web_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_web_username() -> String {
    "admin".to_owned()
}
fn default_auth_timeout_hours() -> i64 {
    24
}
fn default_log_level() -> String {
    "INFO".to_owned()
}
fn default_retention_days() -> i64 {
    30
}
fn default_buffer_size() -> usize {
    128
}
fn default_segment_duration() -> i64 {
    900
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_go2rtc_api_port() -> u16 {
    1984
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, base::Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            base::format_err_t!(NotFound, "unable to read config {:?}: {}", path, e)
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| base::format_err_t!(InvalidArgument, "bad config {:?}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// The rules a config must pass before startup proceeds. A failed
    /// validation aborts start.
    pub fn validate(&self) -> Result<(), base::Error> {
        if self.web_port == 0 {
            bail_t!(InvalidArgument, "web_port must be within [1, 65535]");
        }
        if self.web_root.is_empty() {
            bail_t!(InvalidArgument, "web_root must be non-empty");
        }
        if self.storage_path.is_empty() {
            bail_t!(InvalidArgument, "storage_path must be non-empty");
        }
        if self.db_path.is_empty() {
            bail_t!(InvalidArgument, "db_path must be non-empty");
        }
        if self.models_path.is_empty() {
            bail_t!(InvalidArgument, "models_path must be non-empty");
        }
        if self.buffer_size == 0 {
            bail_t!(InvalidArgument, "buffer_size must be > 0");
        }
        if self.use_swap && self.swap_size == 0 {
            bail_t!(InvalidArgument, "swap_size must be > 0 when use_swap is set");
        }
        if self.mp4_segment_duration_seconds <= 0 {
            bail_t!(InvalidArgument, "mp4_segment_duration_seconds must be > 0");
        }
        if self.auth_timeout_hours <= 0 {
            bail_t!(InvalidArgument, "auth_timeout_hours must be > 0");
        }
        let mut seen = std::collections::BTreeSet::new();
        for s in &self.streams {
            if s.name.is_empty() {
                bail_t!(InvalidArgument, "stream names must be non-empty");
            }
            if s.priority > 10 {
                bail_t!(
                    InvalidArgument,
                    "stream {:?} priority {} out of [0, 10]",
                    s.name,
                    s.priority
                );
            }
            if !seen.insert(&s.name) {
                bail_t!(InvalidArgument, "duplicate stream name {:?}", s.name);
            }
        }
        Ok(())
    }
}
