use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use time::{Date, OffsetDateTime};

use super::{schema, Gateway, GatewayError, Principal};
use crate::config::StorageOptions;
use crate::model::{Item, ItemId, ItemKind, ItemPatch, ItemStatus, NewItem, Patch, Priority};

const ITEM_COLUMNS: &str =
    "id, content, description, kind, status, tags, priority, due_date, images, created_at";

/// Durable gateway over a SQLite database, one row per item scoped by owner.
#[derive(Clone)]
pub struct SqliteGateway {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteGateway {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn fetch_all(&self, owner: &str) -> Result<Vec<Item>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS}
                 FROM items
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![owner], item_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("querying items")?;
            Ok(items)
        })
    }

    fn insert(&self, owner: &str, draft: &NewItem) -> Result<Item> {
        let item = Item::from_new(ItemId::generate(), draft, OffsetDateTime::now_utc());
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO items (id, owner_id, content, description, kind, status, tags,
                                    priority, due_date, images, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id.as_str(),
                    owner,
                    item.content,
                    item.description,
                    item.kind.as_ref(),
                    item.status.as_ref(),
                    encode_list(item.tags.iter())?,
                    item.priority.as_ref(),
                    item.due_date.map(date_to_epoch),
                    encode_list(item.images.iter())?,
                    millis(item.created_at),
                ],
            )
            .context("inserting item")?;
            fetch_one(conn, owner, &item.id)?
                .ok_or_else(|| anyhow::anyhow!("inserted item {} vanished", item.id))
        })
    }

    fn apply_patch(&self, owner: &str, id: &ItemId, patch: &ItemPatch) -> Result<Option<Item>> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Patch::Set(content) = &patch.content {
            columns.push("content");
            values.push(Value::Text(content.clone()));
        }
        if let Patch::Set(description) = &patch.description {
            columns.push("description");
            values.push(description.clone().map_or(Value::Null, Value::Text));
        }
        if let Patch::Set(images) = &patch.images {
            columns.push("images");
            values.push(Value::Text(encode_list(images.iter())?));
        }
        if let Patch::Set(kind) = &patch.kind {
            columns.push("kind");
            values.push(Value::Text(kind.as_ref().to_string()));
        }
        if let Patch::Set(status) = &patch.status {
            columns.push("status");
            values.push(Value::Text(status.as_ref().to_string()));
        }
        if let Patch::Set(due) = &patch.due_date {
            columns.push("due_date");
            values.push(due.map_or(Value::Null, |date| Value::Integer(date_to_epoch(date))));
        }
        if let Patch::Set(tags) = &patch.tags {
            columns.push("tags");
            values.push(Value::Text(encode_list(tags.iter())?));
        }
        if let Patch::Set(priority) = &patch.priority {
            columns.push("priority");
            values.push(Value::Text(priority.as_ref().to_string()));
        }

        self.with_connection(|conn| {
            if !columns.is_empty() {
                let assignments = columns
                    .iter()
                    .map(|column| format!("{column} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("UPDATE items SET {assignments} WHERE id = ? AND owner_id = ?");
                values.push(Value::Text(id.as_str().to_string()));
                values.push(Value::Text(owner.to_string()));
                let updated = conn
                    .execute(&sql, params_from_iter(values.iter()))
                    .context("updating item")?;
                if updated == 0 {
                    return Ok(None);
                }
            }
            fetch_one(conn, owner, id)
        })
    }

    fn remove(&self, owner: &str, id: &ItemId) -> Result<bool> {
        self.with_connection(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM items WHERE id = ?1 AND owner_id = ?2",
                    params![id.as_str(), owner],
                )
                .context("deleting item")?;
            Ok(deleted > 0)
        })
    }
}

impl Gateway for SqliteGateway {
    async fn get_all(&self, principal: &Principal) -> Result<Vec<Item>, GatewayError> {
        Ok(self.fetch_all(principal.id())?)
    }

    async fn create(&self, principal: &Principal, draft: &NewItem) -> Result<Item, GatewayError> {
        if draft.content.trim().is_empty() {
            return Err(GatewayError::Rejected("content is required".into()));
        }
        Ok(self.insert(principal.id(), draft)?)
    }

    async fn update(
        &self,
        principal: &Principal,
        id: &ItemId,
        patch: &ItemPatch,
    ) -> Result<Item, GatewayError> {
        if let Patch::Set(content) = &patch.content {
            if content.trim().is_empty() {
                return Err(GatewayError::Rejected("content cannot be empty".into()));
            }
        }
        self.apply_patch(principal.id(), id, patch)?
            .ok_or_else(|| GatewayError::NotFound(id.clone()))
    }

    async fn delete(&self, principal: &Principal, id: &ItemId) -> Result<(), GatewayError> {
        if self.remove(principal.id(), id)? {
            Ok(())
        } else {
            Err(GatewayError::NotFound(id.clone()))
        }
    }
}

pub fn init(db_path: &Path, options: &StorageOptions) -> Result<SqliteGateway> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, options)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "sqlite gateway ready");
    Ok(SqliteGateway {
        db_path: Arc::new(db_path.to_path_buf()),
        options: Arc::new(options.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

fn fetch_one(conn: &Connection, owner: &str, id: &ItemId) -> Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND owner_id = ?2");
    let item = conn
        .query_row(&sql, params![id.as_str(), owner], item_from_row)
        .optional()
        .with_context(|| format!("fetching item {id}"))?;
    Ok(item)
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    let tags: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let due: Option<i64> = row.get(7)?;
    let images: String = row.get(8)?;
    let created_at: i64 = row.get(9)?;

    Ok(Item {
        id: ItemId::new(row.get::<_, String>(0)?),
        content: row.get(1)?,
        description: row.get(2)?,
        kind: ItemKind::from_str(&kind).map_err(|err| conversion_error(3, err))?,
        status: ItemStatus::from_str(&status).map_err(|err| conversion_error(4, err))?,
        tags: serde_json::from_str::<IndexSet<String>>(&tags)
            .map_err(|err| conversion_error(5, err))?,
        priority: Priority::from_str(&priority).map_err(|err| conversion_error(6, err))?,
        due_date: due
            .map(epoch_to_date)
            .transpose()
            .map_err(|err| conversion_error(7, err))?,
        images: serde_json::from_str(&images).map_err(|err| conversion_error(8, err))?,
        created_at: OffsetDateTime::from_unix_timestamp_nanos(i128::from(created_at) * 1_000_000)
            .map_err(|err| conversion_error(9, err))?,
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let ty = if column == 7 || column == 9 {
        Type::Integer
    } else {
        Type::Text
    };
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

fn encode_list<'a>(values: impl Iterator<Item = &'a String>) -> Result<String> {
    serde_json::to_string(&values.collect::<Vec<_>>()).context("encoding list column")
}

fn millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn date_to_epoch(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

fn epoch_to_date(epoch: i64) -> Result<Date, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp(epoch).map(|at| at.date())
}
