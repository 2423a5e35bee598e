// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Subcommand to check the catalog and storage directory for
//! inconsistencies.

use crate::config::{self, Config};
use base::clock::RealClocks;
use db::Database;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tracing::info;

#[derive(StructOpt)]
pub struct Args {
    /// Path of the TOML configuration file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Update mismatched catalog sizes to match the files on disk.
    #[structopt(long)]
    fix_sizes: bool,
}

pub fn run(args: Args) -> Result<i32, base::Error> {
    if let Some(p) = &args.config {
        if let Some(s) = p.to_str() {
            config::set_custom_config_path(s);
        }
    }
    let config = Config::load(&config::config_path())?;
    let conn = super::open_conn(
        std::path::Path::new(&config.db_path),
        super::OpenMode::ReadWrite,
    )?;
    let database = Arc::new(Database::new(RealClocks {}, conn, false)?);
    let summary = db::check::run(
        &database,
        std::path::Path::new(&config.storage_path),
        args.fix_sizes,
    )?;
    if summary.is_clean() {
        info!("catalog and storage are consistent");
        Ok(0)
    } else {
        Ok(1)
    }
}
