use indexmap::IndexSet;
use time::Date;

use super::{validate_content, Item, ItemKind, ItemStatus, Priority, ValidationError};

/// A single field of a partial update: either left alone or replaced.
///
/// Clearing an optional field is `Patch::Set(None)`, never absence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Keep => None,
        }
    }

    fn apply(&self, target: &mut T)
    where
        T: Clone,
    {
        if let Patch::Set(value) = self {
            *target = value.clone();
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Keep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemPatch {
    pub content: Patch<String>,
    pub description: Patch<Option<String>>,
    pub images: Patch<Vec<String>>,
    pub kind: Patch<ItemKind>,
    pub status: Patch<ItemStatus>,
    pub due_date: Patch<Option<Date>>,
    pub tags: Patch<IndexSet<String>>,
    pub priority: Patch<Priority>,
}

impl ItemPatch {
    /// Patch that rewrites every mutable field to the values of `item`.
    pub fn from_item(item: &Item) -> Self {
        Self {
            content: Patch::Set(item.content.clone()),
            description: Patch::Set(item.description.clone()),
            images: Patch::Set(item.images.clone()),
            kind: Patch::Set(item.kind),
            status: Patch::Set(item.status),
            due_date: Patch::Set(item.due_date),
            tags: Patch::Set(item.tags.clone()),
            priority: Patch::Set(item.priority),
        }
    }

    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Patch::Set(status),
            ..Self::default()
        }
    }

    pub fn images(images: Vec<String>) -> Self {
        Self {
            images: Patch::Set(images),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.content.is_set()
            || self.description.is_set()
            || self.images.is_set()
            || self.kind.is_set()
            || self.status.is_set()
            || self.due_date.is_set()
            || self.tags.is_set()
            || self.priority.is_set())
    }

    /// Names of the fields this patch touches, for logging.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let flags = [
            ("content", self.content.is_set()),
            ("description", self.description.is_set()),
            ("images", self.images.is_set()),
            ("kind", self.kind.is_set()),
            ("status", self.status.is_set()),
            ("due_date", self.due_date.is_set()),
            ("tags", self.tags.is_set()),
            ("priority", self.priority.is_set()),
        ];
        for (name, set) in flags {
            if set {
                fields.push(name);
            }
        }
        fields
    }

    /// Trims and checks the content field when present.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if let Patch::Set(content) = &self.content {
            self.content = Patch::Set(validate_content(content)?);
        }
        Ok(())
    }

    pub fn apply_to(&self, item: &mut Item) {
        self.content.apply(&mut item.content);
        self.description.apply(&mut item.description);
        self.images.apply(&mut item.images);
        self.kind.apply(&mut item.kind);
        self.status.apply(&mut item.status);
        self.due_date.apply(&mut item.due_date);
        self.tags.apply(&mut item.tags);
        self.priority.apply(&mut item.priority);
    }
}

/// Create request. Fields left `None`/empty are defaulted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewItem {
    pub content: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub kind: ItemKind,
    pub status: Option<ItemStatus>,
    pub due_date: Option<Date>,
    pub tags: IndexSet<String>,
    pub priority: Priority,
}

impl NewItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn validate(&mut self) -> Result<(), ValidationError> {
        self.content = validate_content(&self.content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use time::macros::date;
    use time::OffsetDateTime;

    fn item() -> Item {
        let mut draft = NewItem::new("Plan trip");
        draft.kind = ItemKind::Task;
        draft.due_date = Some(date!(2024 - 06 - 01));
        draft.description = Some("flights".into());
        Item::from_new(ItemId::generate(), &draft, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn only_set_fields_change() {
        let mut target = item();
        let before = target.clone();
        let patch = ItemPatch {
            priority: Patch::Set(Priority::High),
            ..ItemPatch::default()
        };
        patch.apply_to(&mut target);
        assert_eq!(target.priority, Priority::High);
        assert_eq!(target.content, before.content);
        assert_eq!(target.due_date, before.due_date);
        assert_eq!(target.description, before.description);
    }

    #[test]
    fn set_none_clears_optional_fields() {
        let mut target = item();
        let patch = ItemPatch {
            due_date: Patch::Set(None),
            description: Patch::Set(None),
            ..ItemPatch::default()
        };
        patch.apply_to(&mut target);
        assert_eq!(target.due_date, None);
        assert_eq!(target.description, None);
    }

    #[test]
    fn status_patch_keeps_completion_paired() {
        let mut target = item();
        ItemPatch::status(ItemStatus::Done).apply_to(&mut target);
        assert!(target.completed());
        ItemPatch::status(ItemStatus::Active).apply_to(&mut target);
        assert!(!target.completed());
    }

    #[test]
    fn validate_trims_content_and_rejects_blank() {
        let mut patch = ItemPatch {
            content: Patch::Set("  tidy  ".into()),
            ..ItemPatch::default()
        };
        patch.validate().expect("valid content");
        assert_eq!(patch.content, Patch::Set("tidy".to_string()));

        let mut blank = ItemPatch {
            content: Patch::Set("  ".into()),
            ..ItemPatch::default()
        };
        assert_eq!(blank.validate(), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn fields_lists_present_flags() {
        let patch = ItemPatch {
            status: Patch::Set(ItemStatus::Done),
            tags: Patch::Set(IndexSet::new()),
            ..ItemPatch::default()
        };
        assert_eq!(patch.fields(), vec!["status", "tags"]);
        assert!(ItemPatch::default().is_empty());
        assert!(!ItemPatch::from_item(&item()).is_empty());
    }
}
