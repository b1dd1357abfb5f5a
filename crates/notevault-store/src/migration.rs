//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1. Applied
//! versions are recorded in `schema_migrations`.

use rusqlite::Connection;
use tracing::info;

use notevault_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        info!(from = current, to = CURRENT_VERSION, "migrated store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: records, outbound intents and the session row.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE records (
            id TEXT PRIMARY KEY,              -- 32 hex chars
            identity_id TEXT NOT NULL,        -- 32 hex chars, owner partition
            encrypted_content TEXT NOT NULL,  -- JSON {ciphertext, iv, authTag}
            encrypted_title TEXT NOT NULL,
            encrypted_folder TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            synced INTEGER NOT NULL DEFAULT 0,
            base_content_hash TEXT,
            conflict TEXT,                    -- JSON conflict snapshot
            size INTEGER NOT NULL,
            content_hash TEXT NOT NULL
        );

        -- One pending outbound change per record
        CREATE TABLE sync_intents (
            record_id TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            queued_at INTEGER NOT NULL
        );

        -- Single-row PIN session
        CREATE TABLE session (
            slot INTEGER PRIMARY KEY CHECK (slot = 0),
            wrapped TEXT NOT NULL,
            stored_at INTEGER NOT NULL
        );

        CREATE INDEX idx_records_identity ON records(identity_id);
        CREATE INDEX idx_records_identity_deleted ON records(identity_id, deleted);
        CREATE INDEX idx_records_identity_updated ON records(identity_id, updated_at);
        CREATE INDEX idx_intents_identity ON sync_intents(identity_id);
        "#,
    )?;

    Ok(())
}
