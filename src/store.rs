// Stract is an open source web search engine.
// Copyright (C) 2024 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The embedded SQL store. One row is appended per persisted page, into a
//! table named `_<netloc>`. A single connection, guarded by one mutex,
//! serializes every statement — the store tolerates exactly one
//! concurrent statement.

use std::path::Path;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};

use crate::error::Error;

static VALID_TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static table-name regex is valid"));

pub struct PageStore {
    conn: Mutex<Connection>,
}

impl PageStore {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates the per-host table `_<netloc>` if it doesn't already
    /// exist. `netloc` is validated before being interpolated into the
    /// DDL: it's the one identifier SQLite's parameter binding can't
    /// cover.
    pub fn ensure_table(&self, netloc: &str) -> Result<(), Error> {
        let table = table_name(netloc)?;
        let sql = format!(
            "create table if not exists \"{table}\" (\
                id integer primary key autoincrement, \
                url text, \
                keyword text, \
                html blob\
            )"
        );
        let conn = self.lock();
        conn.execute(&sql, [])?;
        Ok(())
    }

    /// Acquires a scoped writer handle for `url`. Acquisition itself is
    /// side-effect-free; the row is only appended on `write`.
    pub fn writer<'a>(&'a self, netloc: &str, url: &str, keyword: &str) -> Result<PageWriter<'a>, Error> {
        Ok(PageWriter {
            store: self,
            table: table_name(netloc)?,
            url: url.to_string(),
            keyword: keyword.to_string(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn conn_for_test(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.lock()
    }
}

fn table_name(netloc: &str) -> Result<String, Error> {
    let table = format!("_{netloc}");
    if !VALID_TABLE_NAME.is_match(&table) {
        return Err(Error::InvalidTableName(table));
    }
    Ok(table)
}

/// Scoped handle for a single URL's row. Mirrors
/// `original_source/spider.py`'s `_db.Writer` context manager: acquiring
/// it is free, `write` appends one row, and the handle is released on
/// every exit path of the caller's scope (here, on `Drop`, which is a
/// no-op since `rusqlite::Connection` has no per-statement resource to
/// release — kept for API-contract symmetry with spec.md 4.C).
pub struct PageWriter<'a> {
    store: &'a PageStore,
    table: String,
    url: String,
    keyword: String,
}

impl PageWriter<'_> {
    pub fn write(&self, html: &[u8]) -> Result<(), Error> {
        let sql = format!("insert into \"{}\" (url, keyword, html) values (?1, ?2, ?3)", self.table);
        let conn = self.store.lock();
        conn.execute(&sql, params![self.url, self.keyword, html])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_table_name_with_unsafe_characters() {
        assert!(table_name("h.test:8080").is_err());
        assert!(table_name("h.test; drop table x;--").is_err());
    }

    #[test]
    fn accepts_plain_hostname() {
        assert_eq!(table_name("h.test").unwrap(), "_h.test");
    }

    #[test]
    fn writes_and_counts_rows() {
        let store = PageStore::open(Path::new(":memory:")).unwrap();
        store.ensure_table("h.test").unwrap();

        let writer = store.writer("h.test", "http://h.test/", "").unwrap();
        writer.write(b"<html></html>").unwrap();

        let conn = store.lock();
        let count: i64 = conn
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn no_row_persisted_when_writer_never_called() {
        let store = PageStore::open(Path::new(":memory:")).unwrap();
        store.ensure_table("h.test").unwrap();
        let _writer = store.writer("h.test", "http://h.test/", "").unwrap();

        let conn = store.lock();
        let count: i64 = conn
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
