// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Utilities for automated testing involving Lantern NVR's persistence
//! library. Used for tests of both the `lantern_db` crate itself and the
//! `lantern_nvr` crate.

use crate::db::{self, Database};
use crate::json::StreamConfig;
use base::clock::Clocks;
use std::sync::Arc;
use tempfile::TempDir;

static INIT: std::sync::Once = std::sync::Once::new();

/// Name of the stream created by `TestDb::new` below.
pub const TEST_STREAM_NAME: &str = "testcam";

/// Performs global initialization for tests.
///    * set up logging. (Note the output can be confusing unless
///      `RUST_TEST_THREADS=1` is set in the program's environment prior to
///      running.)
///    * use a fast but insecure password hashing format.
pub fn init() {
    INIT.call_once(|| {
        base::tracing_setup::install_for_tests();
        crate::auth::set_test_config();
    });
}

pub struct TestDb<C: Clocks + Clone> {
    pub db: Arc<Database<C>>,
    pub tmpdir: TempDir,
}

impl<C: Clocks + Clone> TestDb<C> {
    /// Creates an in-memory test catalog with one configured stream.
    pub fn new(clocks: C) -> Self {
        let tmpdir = tempfile::Builder::new()
            .prefix("lantern-nvr-test")
            .tempdir()
            .unwrap();
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init(&mut conn).unwrap();
        let db = Arc::new(Database::new(clocks, conn, true).unwrap());
        {
            let mut l = db.lock();
            l.add_stream(
                TEST_STREAM_NAME,
                StreamConfig {
                    url: Some(url::Url::parse("rtsp://test-camera/main").unwrap()),
                    width: 1920,
                    height: 1080,
                    fps: 30,
                    codec: "h264".to_owned(),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        TestDb { db, tmpdir }
    }
}
