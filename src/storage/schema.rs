//! Database schema definitions
//!
//! This module contains the SQL schema for the job store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl jobs, in submission order
CREATE TABLE IF NOT EXISTS jobs (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    config TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts_made INTEGER NOT NULL DEFAULT 0,
    options TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    run_at_ms INTEGER NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    finished_at_ms INTEGER,
    result TEXT,
    last_error TEXT,
    progress TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_ready ON jobs(status, run_at_ms, seq);
CREATE INDEX IF NOT EXISTS idx_jobs_finished ON jobs(status, finished_at_ms);
"#;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Gets the current schema version from the database
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<i32, rusqlite::Error> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}
