// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand to log in a user and print a session token, for testing the
//! web layer or scripting against it.

use crate::config::{self, Config};
use base::clock::{Clocks, RealClocks};
use base::time::Time;
use base::{bail_t, ErrorKind, ResultExt as _};
use db::Database;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt)]
pub struct Args {
    /// Path of the TOML configuration file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// The username to log in as.
    username: String,

    /// Session lifetime in hours; defaults to the configured
    /// auth_timeout_hours.
    #[structopt(long)]
    ttl_hours: Option<i64>,
}

pub fn run(args: Args) -> Result<i32, base::Error> {
    if let Some(p) = &args.config {
        if let Some(s) = p.to_str() {
            config::set_custom_config_path(s);
        }
    }
    let config = Config::load(&config::config_path())?;
    let clocks = RealClocks {};
    let conn = super::open_conn(
        std::path::Path::new(&config.db_path),
        super::OpenMode::ReadWrite,
    )?;
    let db = Database::new(clocks, conn, true)?;

    eprint!("Password for {}: ", args.username);
    std::io::stderr().flush().err_kind(ErrorKind::Internal)?;
    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .err_kind(ErrorKind::Internal)?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail_t!(InvalidArgument, "password must be non-empty");
    }

    let now = Time::new(clocks.realtime());
    let ttl_sec = args.ttl_hours.unwrap_or(config.auth_timeout_hours) * 3600;
    let mut l = db.lock();
    let user_id = l.authenticate(&args.username, password)?;
    let session = l.create_session(user_id, None, Some("lantern-nvr login"), ttl_sec, now)?;
    println!("{}", session.encode_base64());
    Ok(0)
}
