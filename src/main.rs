// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

use structopt::StructOpt;
use tracing::{debug, error};

mod cmds;
mod config;
mod ingest;

/// Lantern NVR: lightweight network video recorder.
#[derive(StructOpt)]
#[structopt(name = "lantern-nvr")]
enum Args {
    /// Checks the catalog against the storage directory.
    Check(cmds::check::Args),

    /// Initializes the catalog database.
    Init(cmds::init::Args),

    /// Logs in a user and prints a session token.
    Login(cmds::login::Args),

    /// Runs the recording engine.
    Run(cmds::run::Args),

    /// Runs a SQLite shell on the catalog.
    Sql(cmds::sql::Args),
}

impl Args {
    fn run(self) -> Result<i32, base::Error> {
        match self {
            Args::Check(a) => cmds::check::run(a),
            Args::Init(a) => cmds::init::run(a),
            Args::Login(a) => cmds::login::run(a),
            Args::Run(a) => cmds::run::run(a),
            Args::Sql(a) => cmds::sql::run(a),
        }
    }
}

fn main() {
    // If using the clock will fail, find out now *before* trying to log
    // anything (with timestamps...) so we can print a helpful error.
    {
        let mut ts = std::mem::MaybeUninit::uninit();
        if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr()) } != 0 {
            eprintln!("clock_gettime failed; this indicates a broken environment.");
            std::process::exit(1);
        }
    }

    base::tracing_setup::install();
    let args = Args::from_args();
    match args.run() {
        Err(e) => {
            error!("exiting due to error: {}", base::prettify_failure(&e.into()));
            std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}
