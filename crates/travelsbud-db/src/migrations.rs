use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS documents (
            path        TEXT PRIMARY KEY,
            collection  TEXT NOT NULL,
            doc_id      TEXT NOT NULL,
            fields      TEXT NOT NULL,
            version     INTEGER NOT NULL DEFAULT 1,
            seq         INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents(collection, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
