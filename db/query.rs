// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! A small query builder that tolerates missing optional columns.
//!
//! Migrations add columns over time, and read code shouldn't need to move in
//! lockstep: a column is declared `required` (introspection failure is an
//! error) or optional (silently excluded, with the typed accessors returning
//! a caller-supplied default).

use base::{bail_t, ErrorKind, ResultExt as _};
use fnv::{FnvHashMap, FnvHashSet};
use rusqlite::Connection;

#[derive(Debug)]
pub struct QueryBuilder {
    table: String,

    /// Columns that actually exist on the table, per `pragma_table_info`.
    table_columns: FnvHashSet<String>,

    /// Included columns in add order; `build_select` and the accessor
    /// indices follow this order.
    included: Vec<String>,
    index_by_name: FnvHashMap<String, usize>,
}

impl QueryBuilder {
    /// Introspects `table`. A missing table is `NotFound`.
    pub fn new(conn: &Connection, table: &str) -> Result<Self, base::Error> {
        let mut stmt = conn
            .prepare("select name from pragma_table_info(?1)")
            .err_kind(ErrorKind::Internal)?;
        let mut rows = stmt.query([table]).err_kind(ErrorKind::Internal)?;
        let mut table_columns = FnvHashSet::default();
        while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
            table_columns.insert(row.get::<_, String>(0).err_kind(ErrorKind::Internal)?);
        }
        if table_columns.is_empty() {
            bail_t!(NotFound, "no such table {:?}", table);
        }
        Ok(QueryBuilder {
            table: table.to_owned(),
            table_columns,
            included: Vec::new(),
            index_by_name: FnvHashMap::default(),
        })
    }

    /// Adds a column to the select list. A `required` column missing from
    /// the schema is an error; an optional one is silently excluded.
    pub fn add_column(&mut self, name: &str, required: bool) -> Result<(), base::Error> {
        if !self.table_columns.contains(name) {
            if required {
                bail_t!(
                    NotFound,
                    "table {:?} is missing required column {:?}",
                    self.table,
                    name
                );
            }
            return Ok(());
        }
        if self.index_by_name.contains_key(name) {
            return Ok(()); // already included.
        }
        self.index_by_name
            .insert(name.to_owned(), self.included.len());
        self.included.push(name.to_owned());
        Ok(())
    }

    /// True iff the column was added and exists on this schema.
    pub fn has_column(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }

    /// Index of the column within result rows of [`QueryBuilder::build_select`].
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// The comma-joined included columns, for callers assembling statements
    /// `build_select` can't express (eg with `limit` clauses).
    pub fn column_list(&self) -> String {
        self.included.join(", ")
    }

    /// Builds the select statement over the included columns.
    pub fn build_select(
        &self,
        where_clause: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<String, base::Error> {
        if self.included.is_empty() {
            bail_t!(FailedPrecondition, "no columns included for {:?}", self.table);
        }
        let mut sql = format!("select {} from {}", self.included.join(", "), self.table);
        if let Some(w) = where_clause {
            sql.push_str(" where ");
            sql.push_str(w);
        }
        if let Some(o) = order_by {
            sql.push_str(" order by ");
            sql.push_str(o);
        }
        Ok(sql)
    }

    pub fn get_int(
        &self,
        row: &rusqlite::Row,
        name: &str,
        default: i64,
    ) -> Result<i64, base::Error> {
        match self.column_index(name) {
            None => Ok(default),
            Some(i) => row.get(i).err_kind(ErrorKind::Internal),
        }
    }

    pub fn get_double(
        &self,
        row: &rusqlite::Row,
        name: &str,
        default: f64,
    ) -> Result<f64, base::Error> {
        match self.column_index(name) {
            None => Ok(default),
            Some(i) => row.get(i).err_kind(ErrorKind::Internal),
        }
    }

    pub fn get_bool(
        &self,
        row: &rusqlite::Row,
        name: &str,
        default: bool,
    ) -> Result<bool, base::Error> {
        match self.column_index(name) {
            None => Ok(default),
            Some(i) => row.get(i).err_kind(ErrorKind::Internal),
        }
    }

    pub fn get_text(
        &self,
        row: &rusqlite::Row,
        name: &str,
        default: &str,
    ) -> Result<String, base::Error> {
        match self.column_index(name) {
            None => Ok(default.to_owned()),
            Some(i) => row.get(i).err_kind(ErrorKind::Internal),
        }
    }
}
