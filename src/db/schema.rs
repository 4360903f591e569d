//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for the persistent question queue
//! and the class catalog, and provides functions to create and configure it.

use crate::error::StoreResult;
use rusqlite::Connection;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the questions table.
/// Rows are never deleted: resolution only sets `resolved_at`.
const CREATE_QUESTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
    student_id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    class_number TEXT NOT NULL DEFAULT '',
    topic TEXT NOT NULL DEFAULT '',
    problem TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    resolved_at TEXT              -- NULL while pending
)
"#;

/// SQL to create the class catalog
const CREATE_CLASSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS classes (
    class_number TEXT PRIMARY KEY,
    topics TEXT NOT NULL          -- JSON array of strings
)
"#;

/// SQL to create service metadata table
const CREATE_ADMIN_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS admin_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// SQL to create indexes for common queries
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_questions_active ON questions(created_at) WHERE resolved_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_questions_class ON questions(class_number)",
];

/// Pragmas applied to every connection (journal mode is set separately
/// because it returns a row)
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

/// Create and configure the database
pub fn create_database(conn: &Connection) -> StoreResult<()> {
    // In-memory databases report "memory" and ignore the request
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;

    conn.execute(CREATE_QUESTIONS_TABLE, [])?;
    conn.execute(CREATE_CLASSES_TABLE, [])?;
    conn.execute(CREATE_ADMIN_INFO_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    set_admin_info(conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    set_admin_info(conn, keys::SERVICE_VERSION, env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

/// Store service metadata
pub fn set_admin_info(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO admin_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Metadata keys stored in `admin_info`
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Version of the service that last opened the database
    pub const SERVICE_VERSION: &str = "service_version";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, OptionalExtension};

    #[test]
    fn test_create_database() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(tables, vec!["admin_info", "classes", "questions"]);
    }

    #[test]
    fn test_create_database_twice() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();
        create_database(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_questions_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    fn admin_info(conn: &Connection, key: &str) -> Option<String> {
        conn.query_row("SELECT value FROM admin_info WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .unwrap()
    }

    #[test]
    fn test_admin_info() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();

        assert_eq!(admin_info(&conn, keys::SCHEMA_VERSION), Some(SCHEMA_VERSION.to_string()));

        set_admin_info(&conn, "test_key", "test_value").unwrap();
        assert_eq!(admin_info(&conn, "test_key"), Some("test_value".to_string()));
        assert_eq!(admin_info(&conn, "nonexistent"), None);
    }
}
