// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named savepoints with stack discipline.
//!
//! Each guard issues `SAVEPOINT`, then either `RELEASE` (keep the changes)
//! or `ROLLBACK TO` followed by `RELEASE` (discard them and remove the
//! marker). Only the innermost open savepoint may be closed. A guard
//! dropped while still open rolls back.

use std::cell::{Cell, RefCell};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Open savepoint names of one connection, innermost last.
#[derive(Debug, Default)]
pub struct SavepointStack {
    names: RefCell<Vec<String>>,
    counter: Cell<u64>,
}

impl SavepointStack {
    pub fn depth(&self) -> usize {
        self.names.borrow().len()
    }

    fn next_name(&self, label: &str) -> String {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{label}_{n}")
    }
}

/// An open savepoint.
#[derive(Debug)]
pub struct Savepoint<'db> {
    conn: &'db Connection,
    stack: &'db SavepointStack,
    name: String,
    open: bool,
}

impl<'db> Savepoint<'db> {
    pub(crate) fn open(conn: &'db Connection, stack: &'db SavepointStack, label: &str) -> Result<Self> {
        let name = stack.next_name(label);
        conn.execute_batch(&format!(r#"SAVEPOINT "{name}";"#))?;
        stack.names.borrow_mut().push(name.clone());
        debug!(savepoint = %name, "savepoint opened");
        Ok(Self {
            conn,
            stack,
            name,
            open: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Folds the changes into the enclosing transaction.
    pub fn release(&mut self) -> Result<()> {
        self.check_innermost()?;
        self.conn.execute_batch(&format!(r#"RELEASE "{}";"#, self.name))?;
        self.close();
        debug!(savepoint = %self.name, "savepoint released");
        Ok(())
    }

    /// Discards every change made since the savepoint was opened.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_innermost()?;
        self.conn
            .execute_batch(&format!(r#"ROLLBACK TO "{0}"; RELEASE "{0}";"#, self.name))?;
        self.close();
        debug!(savepoint = %self.name, "savepoint rolled back");
        Ok(())
    }

    fn check_innermost(&self) -> Result<()> {
        if !self.open {
            return Err(Error::Savepoint(format!("savepoint {} is already closed", self.name)));
        }
        match self.stack.names.borrow().last() {
            Some(last) if *last == self.name => Ok(()),
            Some(last) => Err(Error::Savepoint(format!(
                "savepoint {} is not the innermost open savepoint ({last} is)",
                self.name
            ))),
            None => Err(Error::Savepoint(format!("savepoint {} is not open", self.name))),
        }
    }

    fn close(&mut self) {
        self.open = false;
        let mut names = self.stack.names.borrow_mut();
        if let Some(pos) = names.iter().rposition(|n| *n == self.name) {
            names.truncate(pos);
        }
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // rolling back an outer savepoint discards the inner ones too
        let sql = format!(r#"ROLLBACK TO "{0}"; RELEASE "{0}";"#, self.name);
        if let Err(e) = self.conn.execute_batch(&sql) {
            warn!(savepoint = %self.name, error = %e, "rollback on drop failed");
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, SavepointStack) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();
        (conn, SavepointStack::default())
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT count(*) FROM t", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn release_keeps_and_rollback_discards() {
        let (conn, stack) = setup();
        let mut sp = Savepoint::open(&conn, &stack, "keep").unwrap();
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        sp.release().unwrap();
        assert_eq!(count(&conn), 1);

        let mut sp = Savepoint::open(&conn, &stack, "discard").unwrap();
        conn.execute("INSERT INTO t VALUES (2)", []).unwrap();
        sp.rollback().unwrap();
        assert_eq!(count(&conn), 1);
        assert_eq!(stack.depth(), 0);
        assert!(matches!(sp.release(), Err(Error::Savepoint(_))));
    }

    #[test]
    fn only_innermost_closes() {
        let (conn, stack) = setup();
        let mut outer = Savepoint::open(&conn, &stack, "outer").unwrap();
        let mut inner = Savepoint::open(&conn, &stack, "inner").unwrap();
        assert!(matches!(outer.release(), Err(Error::Savepoint(_))));
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        inner.release().unwrap();
        outer.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn drop_rolls_back() {
        let (conn, stack) = setup();
        {
            let _sp = Savepoint::open(&conn, &stack, "scoped label").unwrap();
            conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        }
        assert_eq!(count(&conn), 0);
        assert_eq!(stack.depth(), 0);
    }
}
