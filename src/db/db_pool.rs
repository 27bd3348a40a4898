use std::sync::{Mutex, PoisonError};

use duckdb::Connection;
use r2d2::ManageConnection;

pub const IN_MEMORY: &str = ":memory:";

/// Hands out clones of one base connection.
///
/// Clones share the underlying database instance, so every pooled connection
/// sees the same data; this also holds for in-memory databases.
pub struct DuckDBConnectionManager {
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: &str) -> Result<Self, duckdb::Error> {
        let base = if connection_string == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(connection_string)?
        };
        Ok(Self {
            base: Mutex::new(base),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.base.lock().unwrap_or_else(PoisonError::into_inner).try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
