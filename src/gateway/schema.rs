use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            content TEXT NOT NULL,
            description TEXT,
            kind TEXT NOT NULL DEFAULT 'note',
            status TEXT NOT NULL DEFAULT 'todo',
            tags TEXT NOT NULL DEFAULT '[]',
            priority TEXT NOT NULL DEFAULT 'none',
            due_date INTEGER,
            images TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS items_owner_created
            ON items(owner_id, created_at DESC);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
