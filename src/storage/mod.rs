use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::CacheOptions;
use crate::model::{ItemStatus, TrackedItem};

mod schema;

#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub fetched_at: OffsetDateTime,
    pub item_count: usize,
    /// Account that was logged in when the snapshot was taken.
    pub owner: Option<String>,
}

/// Local copy of the last item list the backend returned.
#[derive(Clone)]
pub struct CacheHandle {
    db_path: Arc<PathBuf>,
    options: Arc<CacheOptions>,
}

impl CacheHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening cache database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        f(&mut conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Replaces the stored snapshot in one transaction, tagging it with the
    /// account it was fetched for.
    pub fn save_snapshot(&self, items: &[TrackedItem], owner: Option<&str>) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction().context("starting snapshot transaction")?;
            tx.execute("DELETE FROM items", [])
                .context("clearing cached items")?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO items
                            (position, id, title, link, image_url, chapter_number, last_updated, status)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )
                    .context("preparing cached item insert")?;
                for (position, item) in items.iter().enumerate() {
                    stmt.execute(params![
                        position as i64,
                        item.id,
                        item.title,
                        item.link,
                        item.image_url,
                        item.chapter_number,
                        item.last_updated,
                        item.status.as_str(),
                    ])
                    .with_context(|| format!("caching item {}", item.id))?;
                }
            }
            let now = OffsetDateTime::now_utc().unix_timestamp();
            tx.execute(
                "INSERT INTO snapshots (id, fetched_at, item_count, owner) VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET fetched_at = excluded.fetched_at,
                                               item_count = excluded.item_count,
                                               owner = excluded.owner",
                params![now, items.len() as i64, owner],
            )
            .context("recording snapshot metadata")?;
            tx.commit().context("committing snapshot")?;
            tracing::debug!(count = items.len(), "cached item snapshot");
            Ok(())
        })
    }

    pub fn load_snapshot(&self) -> Result<Vec<TrackedItem>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, link, image_url, chapter_number, last_updated, status
                     FROM items
                     ORDER BY position ASC",
                )
                .context("preparing cached item query")?;
            let rows = stmt
                .query_map([], |row| {
                    let status: String = row.get(6)?;
                    Ok(TrackedItem {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        link: row.get(2)?,
                        image_url: row.get(3)?,
                        chapter_number: row.get(4)?,
                        last_updated: row.get(5)?,
                        status: ItemStatus::from(status),
                    })
                })
                .context("querying cached items")?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
    }

    pub fn last_snapshot(&self) -> Result<Option<SnapshotMeta>> {
        self.with_connection(|conn| {
            let row: Option<(i64, i64, Option<String>)> = conn
                .query_row(
                    "SELECT fetched_at, item_count, owner FROM snapshots WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .context("reading snapshot metadata")?;
            Ok(row.map(|(fetched_at, item_count, owner)| SnapshotMeta {
                fetched_at: OffsetDateTime::from_unix_timestamp(fetched_at)
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
                item_count: item_count.max(0) as usize,
                owner,
            }))
        })
    }

    /// The cached list, but only when it was taken for `owner`.
    pub fn snapshot_for(
        &self,
        owner: Option<&str>,
    ) -> Result<Option<(Vec<TrackedItem>, SnapshotMeta)>> {
        let Some(meta) = self.last_snapshot()? else {
            return Ok(None);
        };
        if meta.owner.as_deref() != owner {
            tracing::debug!(cached_for = ?meta.owner, "snapshot belongs to another account");
            return Ok(None);
        }
        let items = self.load_snapshot()?;
        Ok(Some((items, meta)))
    }

    pub fn clear_snapshot(&self) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction().context("starting cache clear")?;
            tx.execute("DELETE FROM items", [])
                .context("clearing cached items")?;
            tx.execute("DELETE FROM snapshots", [])
                .context("clearing snapshot metadata")?;
            tx.commit().context("committing cache clear")?;
            tracing::info!("cleared cached snapshot");
            Ok(())
        })
    }
}

pub fn init(options: &CacheOptions) -> Result<CacheHandle> {
    let db_path = &options.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening cache database {}", db_path.display()))?;
    prepare_connection(&conn, options)?;
    schema::apply(&conn)?;
    Ok(CacheHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(options.clone()),
    })
}

fn prepare_connection(conn: &Connection, options: &CacheOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        options.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_cache() -> anyhow::Result<(TempDir, CacheHandle)> {
        let temp = TempDir::new()?;
        let mut options = CacheOptions::default();
        options.database_path = temp.path().join("data/cache.db");
        let cache = init(&options)?;
        Ok((temp, cache))
    }

    fn item(id: &str, title: &str, chapter: &str) -> TrackedItem {
        TrackedItem {
            id: id.into(),
            title: title.into(),
            link: format!("https://manga.test/{id}"),
            image_url: String::new(),
            chapter_number: chapter.into(),
            last_updated: "2024-02-02T12:00:00".into(),
            status: ItemStatus::Other("Paused".into()),
        }
    }

    #[test]
    fn empty_cache_has_no_snapshot() -> anyhow::Result<()> {
        let (_temp, cache) = init_cache()?;
        assert!(cache.load_snapshot()?.is_empty());
        assert!(cache.last_snapshot()?.is_none());
        Ok(())
    }

    #[test]
    fn saving_replaces_previous_snapshot_and_keeps_order() -> anyhow::Result<()> {
        let (_temp, cache) = init_cache()?;
        cache.save_snapshot(&[item("1", "Old", "3"), item("2", "Gone", "9")], None)?;

        let fresh = vec![item("9", "Zeta", "1"), item("1", "Old", "4")];
        cache.save_snapshot(&fresh, None)?;

        assert_eq!(cache.load_snapshot()?, fresh);
        let meta = cache.last_snapshot()?.expect("snapshot metadata");
        assert_eq!(meta.item_count, 2);
        Ok(())
    }

    #[test]
    fn snapshot_is_only_returned_to_its_owner() -> anyhow::Result<()> {
        let (_temp, cache) = init_cache()?;
        cache.save_snapshot(&[item("1", "Secret Series", "7")], Some("alice"))?;

        assert!(cache.snapshot_for(Some("bob"))?.is_none());
        assert!(cache.snapshot_for(None)?.is_none());
        let (items, meta) = cache.snapshot_for(Some("alice"))?.expect("owner snapshot");
        assert_eq!(items.len(), 1);
        assert_eq!(meta.owner.as_deref(), Some("alice"));

        cache.clear_snapshot()?;
        assert!(cache.last_snapshot()?.is_none());
        assert!(cache.load_snapshot()?.is_empty());
        Ok(())
    }

    #[test]
    fn reopening_an_existing_cache_keeps_the_schema_usable() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut options = CacheOptions::default();
        options.database_path = temp.path().join("cache.db");
        {
            let conn = Connection::open(&options.database_path)?;
            conn.execute_batch(
                "CREATE TABLE snapshots (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    fetched_at INTEGER NOT NULL,
                    item_count INTEGER NOT NULL
                );",
            )?;
        }
        let cache = init(&options)?;
        cache.save_snapshot(&[item("1", "Old", "3")], Some("alice"))?;
        let cache = init(&options)?;
        assert!(cache.snapshot_for(Some("alice"))?.is_some());
        Ok(())
    }
}
