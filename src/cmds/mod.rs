// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

use base::{ErrorKind, ResultExt as _};
use std::path::Path;

pub mod check;
pub mod init;
pub mod login;
pub mod run;
pub mod sql;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    Create,
}

/// Opens the catalog database file.
pub fn open_conn(db_path: &Path, mode: OpenMode) -> Result<rusqlite::Connection, base::Error> {
    let conn = rusqlite::Connection::open_with_flags(
        db_path,
        match mode {
            OpenMode::ReadWrite => rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::Create => {
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            }
        }
        // rusqlite::Connection is not Sync, so there's no reason to tell
        // SQLite3 to use the serialized threading mode.
        | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .err_kind(ErrorKind::Internal)?;
    Ok(conn)
}
