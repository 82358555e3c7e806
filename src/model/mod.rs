//! Item domain model. Completion is derived from [`ItemStatus`], never stored.

use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use time::{Date, OffsetDateTime, UtcOffset};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

pub mod patch;

pub use patch::{ItemPatch, NewItem, Patch};

pub const MAX_CONTENT_LEN: usize = 500;
pub const MIN_INPUT_LEN: usize = 2;

const TENTATIVE_PREFIX: &str = "tentative-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Server-side identifier for a freshly persisted item.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Client-side placeholder used until the gateway confirms a create.
    /// Never reused once reconciled.
    pub fn tentative() -> Self {
        Self(format!("{TENTATIVE_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn is_tentative(&self) -> bool {
        self.0.starts_with(TENTATIVE_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ItemKind {
    #[serde(rename = "todo", alias = "task")]
    #[strum(to_string = "todo", serialize = "task")]
    Task,
    #[default]
    #[serde(rename = "note")]
    #[strum(to_string = "note")]
    Note,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ItemStatus {
    #[default]
    #[serde(rename = "todo", alias = "pending")]
    #[strum(to_string = "todo", serialize = "pending")]
    Pending,
    #[serde(rename = "in_progress", alias = "active")]
    #[strum(to_string = "in_progress", serialize = "active")]
    Active,
    #[serde(rename = "done")]
    #[strum(to_string = "done")]
    Done,
}

impl ItemStatus {
    /// Status reached by flipping the completion checkbox.
    pub fn toggled(self) -> Self {
        match self {
            ItemStatus::Done => ItemStatus::Pending,
            _ => ItemStatus::Done,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub content: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub created_at: OffsetDateTime,
    pub due_date: Option<Date>,
    pub tags: IndexSet<String>,
    pub priority: Priority,
}

impl Item {
    /// Materialises a create request into an item carrying `id`.
    ///
    /// Unspecified optional fields fall back to the gateway defaults
    /// (pending, no priority, no tags, no images, no due date).
    pub fn from_new(id: ItemId, draft: &NewItem, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            content: draft.content.clone(),
            description: draft.description.clone(),
            images: draft.images.clone(),
            kind: draft.kind,
            status: draft.status.unwrap_or_default(),
            created_at,
            due_date: draft.due_date,
            tags: draft.tags.clone(),
            priority: draft.priority,
        }
    }

    pub fn completed(&self) -> bool {
        self.status == ItemStatus::Done
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.status = if completed {
            ItemStatus::Done
        } else {
            ItemStatus::Pending
        };
    }

    pub fn is_task(&self) -> bool {
        self.kind == ItemKind::Task
    }

    /// Inserts `tag` unless already present; returns whether it was new.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content cannot be empty")]
    EmptyContent,
    #[error("content is too long ({len} characters, max {max})")]
    ContentTooLong { len: usize, max: usize },
    #[error("input is too short ({len} characters, min {min})")]
    InputTooShort { len: usize, min: usize },
}

fn char_len(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Trims `raw` and checks it against the content rules.
pub fn validate_content(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = char_len(trimmed);
    if len > MAX_CONTENT_LEN {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Checks free-form capture input before it reaches the parser.
pub fn validate_input(raw: &str) -> Result<(), ValidationError> {
    let len = char_len(raw);
    if len < MIN_INPUT_LEN {
        return Err(ValidationError::InputTooShort {
            len,
            min: MIN_INPUT_LEN,
        });
    }
    if len > MAX_CONTENT_LEN {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(())
}

/// Current calendar day in the local timezone (UTC when the offset cannot
/// be determined).
pub fn local_today() -> Date {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset).date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample() -> Item {
        Item::from_new(
            ItemId::generate(),
            &NewItem::new("Write report"),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn completed_tracks_status() {
        let mut item = sample();
        assert!(!item.completed());
        item.status = ItemStatus::Done;
        assert!(item.completed());
        item.set_completed(false);
        assert_eq!(item.status, ItemStatus::Pending);
        item.status = ItemStatus::Active;
        assert!(!item.completed());
    }

    #[test]
    fn toggled_status_round_trips_through_done() {
        assert_eq!(ItemStatus::Pending.toggled(), ItemStatus::Done);
        assert_eq!(ItemStatus::Active.toggled(), ItemStatus::Done);
        assert_eq!(ItemStatus::Done.toggled(), ItemStatus::Pending);
    }

    #[test]
    fn tags_keep_first_seen_order_without_duplicates() {
        let mut item = sample();
        assert!(item.add_tag("b"));
        assert!(item.add_tag("a"));
        assert!(!item.add_tag("b"));
        assert_eq!(item.tags.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn tentative_ids_are_unique_and_flagged() {
        let a = ItemId::tentative();
        let b = ItemId::tentative();
        assert_ne!(a, b);
        assert!(a.is_tentative());
        assert!(!ItemId::generate().is_tentative());
    }

    #[test]
    fn validate_content_trims_and_bounds_length() {
        assert_eq!(validate_content("  hello ").as_deref(), Ok("hello"));
        assert_eq!(validate_content("   "), Err(ValidationError::EmptyContent));
        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            validate_content(&long),
            Err(ValidationError::ContentTooLong {
                len: MAX_CONTENT_LEN + 1,
                max: MAX_CONTENT_LEN
            })
        );
        assert!(validate_content(&"ä".repeat(MAX_CONTENT_LEN)).is_ok());
    }

    #[test]
    fn validate_input_requires_two_characters() {
        assert_eq!(
            validate_input("x"),
            Err(ValidationError::InputTooShort { len: 1, min: 2 })
        );
        assert!(validate_input("ok").is_ok());
    }

    #[test]
    fn enums_parse_wire_and_friendly_names() {
        assert_eq!(ItemKind::from_str("task"), Ok(ItemKind::Task));
        assert_eq!(ItemKind::from_str("TODO"), Ok(ItemKind::Task));
        assert_eq!(ItemKind::Task.to_string(), "todo");
        assert_eq!(ItemStatus::from_str("active"), Ok(ItemStatus::Active));
        assert_eq!(ItemStatus::Active.to_string(), "in_progress");
        assert_eq!(Priority::from_str("High"), Ok(Priority::High));
        assert_eq!(Priority::None.as_ref(), "none");
    }
}
