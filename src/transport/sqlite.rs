use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::constants::attribution::DERIVED_TABLE_PREFIX;
use crate::errors::AnalyticsError;
use crate::types::TableName;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit handle to the shared platform database.
///
/// Holds only the connection descriptor. Every component that needs storage
/// opens its own connection through `connect`, so streaming readers and the
/// attribution writer never share a cursor.
#[derive(Clone, Debug)]
pub struct Database {
    descriptor: String,
    path: PathBuf,
}

impl Database {
    /// Parse a `sqlite:<path>` descriptor (a bare path is accepted too).
    pub fn from_descriptor(descriptor: &str) -> Result<Self, AnalyticsError> {
        let (scheme, path) = match descriptor.split_once(':') {
            Some((scheme, rest)) if scheme.chars().all(|ch| ch.is_ascii_alphanumeric()) => {
                (Some(scheme), rest)
            }
            _ => (None, descriptor),
        };
        if let Some(scheme) = scheme {
            if !scheme.eq_ignore_ascii_case("sqlite") {
                return Err(AnalyticsError::Connection {
                    descriptor: descriptor.to_string(),
                    reason: format!("unsupported driver '{scheme}'"),
                });
            }
        }
        if path.is_empty() {
            return Err(AnalyticsError::Connection {
                descriptor: descriptor.to_string(),
                reason: "missing database path".into(),
            });
        }
        Ok(Self {
            descriptor: descriptor.to_string(),
            path: PathBuf::from(path),
        })
    }

    /// Connection descriptor this handle was built from.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Open and ping a new connection.
    ///
    /// The database must already exist. The journal mode is left as found.
    pub fn connect(&self) -> Result<Connection, AnalyticsError> {
        let unreachable = |err: rusqlite::Error| self.connection_error(err.to_string());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(unreachable)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unreachable)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(unreachable)?;
        debug!(descriptor = %self.descriptor, "storage connection opened");
        Ok(conn)
    }

    /// Open a connection for a writer that runs alongside streaming readers.
    ///
    /// Switches the database to WAL journaling, which persists in the file,
    /// so readers opened afterwards do not block the writer's commits. Fails
    /// with `Connection` when SQLite refuses the switch.
    pub fn connect_for_writes(&self) -> Result<Connection, AnalyticsError> {
        let conn = self.connect()?;
        enable_wal(&conn).map_err(|reason| self.connection_error(reason))?;
        Ok(conn)
    }

    fn connection_error(&self, reason: String) -> AnalyticsError {
        AnalyticsError::Connection {
            descriptor: self.descriptor.clone(),
            reason,
        }
    }
}

fn enable_wal(conn: &Connection) -> Result<(), String> {
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(|err| err.to_string())?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(format!("journal_mode stayed '{mode}', WAL is required for writes"));
    }
    debug!(journal_mode = %mode, "write-ahead log enabled");
    Ok(())
}

/// Validate a derived table name against the allow-list.
///
/// Names must start with the derived-table prefix and contain only ASCII
/// letters, digits, and underscores.
pub fn validate_derived_table(name: &str) -> Result<TableName, AnalyticsError> {
    let valid_chars = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    let has_suffix =
        name.starts_with(DERIVED_TABLE_PREFIX) && name.len() > DERIVED_TABLE_PREFIX.len();
    if !valid_chars || !has_suffix {
        return Err(AnalyticsError::InvalidIdentifier(name.to_string()));
    }
    Ok(name.to_string())
}

/// Quote an already validated identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Probe a table with a zero-row `SELECT`.
///
/// Any failure counts as "absent"; this avoids relying on catalog queries.
pub fn table_exists(conn: &Connection, table: &str) -> bool {
    let sql = format!("SELECT 1 FROM {} LIMIT 0", quote_identifier(table));
    let probe = conn.prepare(&sql).and_then(|mut stmt| {
        stmt.query([])?;
        Ok(())
    });
    match probe {
        Ok(()) => true,
        Err(err) => {
            debug!(table, error = %err, "table probe failed; treating as absent");
            false
        }
    }
}

/// Drop a table by name.
pub fn drop_table(conn: &Connection, table: &str) -> Result<(), AnalyticsError> {
    conn.execute_batch(&format!("DROP TABLE {}", quote_identifier(table)))
        .map_err(AnalyticsError::query("drop derived table"))
}

/// Create a table from a column definition list.
pub fn create_table(conn: &Connection, table: &str, columns: &str) -> Result<(), AnalyticsError> {
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({columns})",
        quote_identifier(table)
    ))
    .map_err(AnalyticsError::query("create derived table"))
}
