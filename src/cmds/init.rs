// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand to initialize the database.

use super::OpenMode;
use base::bail_t;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::info;

#[derive(StructOpt)]
pub struct Args {
    /// Path of the SQLite database file to create.
    #[structopt(long, parse(from_os_str), default_value = "/var/lib/lantern-nvr/db.sqlite")]
    db_path: PathBuf,
}

pub fn run(args: Args) -> Result<i32, base::Error> {
    if args.db_path.exists() {
        bail_t!(
            AlreadyExists,
            "database {:?} already exists; refusing to overwrite",
            args.db_path
        );
    }
    if let Some(parent) = args.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| base::format_err_t!(Internal, "unable to create {:?}: {}", parent, e))?;
    }
    let mut conn = super::open_conn(&args.db_path, OpenMode::Create)?;

    // WAL is the only journal mode the single-writer design supports in
    // production.
    db::set_journal_mode(&conn, "wal")?;
    db::init(&mut conn)?;
    info!("initialized database at {:?}", args.db_path);
    Ok(0)
}
