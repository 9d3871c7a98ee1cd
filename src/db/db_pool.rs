use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::{Mutex, PoisonError};

/// Hands out connections to a single DuckDB database.
///
/// DuckDB allows one open instance per file inside a process, and every
/// `:memory:` open is a fresh database, so the manager keeps a root
/// connection and gives the pool clones of it.
pub struct DuckDBConnectionManager {
    connection_string: String,
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Result<Self, duckdb::Error> {
        let root = if connection_string.is_empty() || connection_string == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&connection_string)?
        };

        Ok(Self {
            connection_string,
            root: Mutex::new(root),
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
