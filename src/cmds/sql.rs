// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand to run a SQLite shell on the catalog.
//!
//! Delegates to the system `sqlite3` binary rather than embedding a shell.
//! Use a read-only invocation (or stop the server first) when poking at a
//! live database; the single-writer invariant is yours to honor here.

use crate::config::{self, Config};
use base::{bail_t, ErrorKind, ResultExt as _};
use std::path::PathBuf;
use std::process::Command;
use structopt::StructOpt;

#[derive(StructOpt)]
pub struct Args {
    /// Path of the TOML configuration file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Arguments to pass through to sqlite3, eg a single query.
    args: Vec<String>,
}

pub fn run(args: Args) -> Result<i32, base::Error> {
    if let Some(p) = &args.config {
        if let Some(s) = p.to_str() {
            config::set_custom_config_path(s);
        }
    }
    let config = Config::load(&config::config_path())?;
    let status = Command::new("sqlite3")
        .arg(&config.db_path)
        .args(&args.args)
        .status()
        .err_kind(ErrorKind::Internal)?;
    match status.code() {
        Some(c) => Ok(c),
        None => bail_t!(Internal, "sqlite3 terminated by signal"),
    }
}
