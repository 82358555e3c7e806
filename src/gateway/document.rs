//! The whole collection as one JSON document, with no server-side scoping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

use super::{Gateway, GatewayError, Principal};
use crate::model::{Item, ItemId, ItemKind, ItemPatch, ItemStatus, NewItem, Priority};

/// Storage key of the document; the file is `<key>.json` in the data dir.
pub const DOCUMENT_KEY: &str = "klartext-data";

const DOCUMENT_EXTENSION: &str = "json";
const DOCUMENT_TMP_EXTENSION: &str = "json.tmp";

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub images: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "due_day")]
    pub due_date: Option<time::Date>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub priority: Priority,
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.to_string(),
            content: item.content.clone(),
            description: item.description.clone(),
            images: item.images.clone(),
            kind: item.kind,
            status: Some(item.status),
            is_completed: item.completed(),
            created_at: Some(item.created_at),
            due_date: item.due_date,
            tags: item.tags.iter().cloned().collect(),
            priority: item.priority,
        }
    }
}

impl ItemRecord {
    pub fn into_item(self) -> Item {
        let status = self.status.unwrap_or(if self.is_completed {
            ItemStatus::Done
        } else {
            ItemStatus::Pending
        });
        Item {
            id: ItemId::new(self.id),
            content: self.content,
            description: self.description.filter(|text| !text.is_empty()),
            images: self.images,
            kind: self.kind,
            status,
            created_at: self.created_at.unwrap_or_else(OffsetDateTime::now_utc),
            due_date: self.due_date,
            tags: self.tags.into_iter().collect::<IndexSet<_>>(),
            priority: self.priority,
        }
    }
}

mod due_day {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use time::{Date, OffsetDateTime, UtcOffset};

    const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => {
                let text = date.format(DAY_FORMAT).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    /// Accepts a plain day or a full timestamp; the time of day is dropped
    /// after moving the timestamp into the local offset.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(date) = Date::parse(&raw, DAY_FORMAT) {
            return Ok(Some(date));
        }
        let at = OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)?;
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        Ok(Some(at.to_offset(offset).date()))
    }
}

/// Reads the document at `path`. A missing file is an empty collection.
pub fn load_document(path: &Path) -> Result<Vec<Item>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("reading document {}", path.display()))
        }
    };
    let records: Vec<ItemRecord> = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing document {}", path.display()))?;
    Ok(records.into_iter().map(ItemRecord::into_item).collect())
}

/// Writes `items` in order, replacing the previous document atomically.
pub fn save_document(path: &Path, items: &[Item]) -> Result<()> {
    let records: Vec<ItemRecord> = items.iter().map(ItemRecord::from).collect();
    let json = serde_json::to_vec_pretty(&records).context("serialising document")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("ensuring document dir {}", parent.display()))?;
    }
    let tmp_path = path.with_extension(DOCUMENT_TMP_EXTENSION);
    fs::write(&tmp_path, &json)
        .with_context(|| format!("writing temporary document {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("atomically persisting document {}", path.display()))?;
    Ok(())
}

pub fn document_path(data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{DOCUMENT_KEY}.{DOCUMENT_EXTENSION}"))
}

/// Gateway over the local document. There is a single local owner, so the
/// principal only gates access and does not partition the data.
#[derive(Debug, Clone)]
pub struct DocumentGateway {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl DocumentGateway {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(document_path(data_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Vec<Item>) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let _guard = self.lock.lock();
        let mut items = load_document(&self.path)?;
        let value = f(&mut items)?;
        save_document(&self.path, &items)?;
        Ok(value)
    }
}

impl Gateway for DocumentGateway {
    async fn get_all(&self, _principal: &Principal) -> Result<Vec<Item>, GatewayError> {
        let _guard = self.lock.lock();
        let mut items = load_document(&self.path)?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn create(&self, _principal: &Principal, draft: &NewItem) -> Result<Item, GatewayError> {
        if draft.content.trim().is_empty() {
            return Err(GatewayError::Rejected("content is required".into()));
        }
        self.transact(|items| {
            let item = Item::from_new(ItemId::generate(), draft, OffsetDateTime::now_utc());
            items.insert(0, item.clone());
            Ok(item)
        })
    }

    async fn update(
        &self,
        _principal: &Principal,
        id: &ItemId,
        patch: &ItemPatch,
    ) -> Result<Item, GatewayError> {
        self.transact(|items| {
            let item = items
                .iter_mut()
                .find(|item| item.id == *id)
                .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
            patch.apply_to(item);
            Ok(item.clone())
        })
    }

    async fn delete(&self, _principal: &Principal, id: &ItemId) -> Result<(), GatewayError> {
        self.transact(|items| {
            let before = items.len();
            items.retain(|item| item.id != *id);
            if items.len() == before {
                return Err(GatewayError::NotFound(id.clone()));
            }
            Ok(())
        })
    }
}
