use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            position INTEGER PRIMARY KEY,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            link TEXT NOT NULL,
            image_url TEXT NOT NULL DEFAULT '',
            chapter_number TEXT NOT NULL DEFAULT '',
            last_updated TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            fetched_at INTEGER NOT NULL,
            item_count INTEGER NOT NULL,
            owner TEXT
        );
        "#,
    )
    .context("applying cache schema")?;
    add_owner_column(conn)
}

fn add_owner_column(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('snapshots')")
        .context("inspecting snapshots table")?;
    let mut columns = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let has_owner = columns.any(|name| name.map(|name| name == "owner").unwrap_or(false));
    drop(columns);
    if !has_owner {
        conn.execute("ALTER TABLE snapshots ADD COLUMN owner TEXT", [])
            .context("adding snapshot owner column")?;
        tracing::info!("upgraded cache schema with snapshot owner");
    }
    Ok(())
}
