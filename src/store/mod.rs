use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Item, ItemId};

/// Ordered in-memory item collection, newest insertion first.
///
/// Knows nothing about persistence; every read sees the last applied write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStore {
    items: IndexMap<ItemId, Item>,
}

/// Full copy of a store's contents, used to undo a failed delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    items: IndexMap<ItemId, Item>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut store = Self::new();
        store.reset(items);
        store
    }

    /// Inserts `item` at the front. An item already stored under the same
    /// id is overwritten and moved to the front.
    pub fn add(&mut self, item: Item) {
        tracing::debug!(id = %item.id, "store add");
        self.items.shift_insert(0, item.id.clone(), item);
    }

    /// Puts `item` in the slot currently held by `id`, keeping its position.
    ///
    /// `item.id` may differ from `id` (reconciling a tentative id); a stale
    /// copy already stored under the new id is dropped. Returns `false` and
    /// leaves the store untouched when `id` is unknown.
    pub fn replace(&mut self, id: &ItemId, item: Item) -> bool {
        let Some(mut index) = self.items.get_index_of(id) else {
            tracing::debug!(%id, "store replace skipped, id not present");
            return false;
        };
        if item.id != *id {
            if let Some((stale, _, _)) = self.items.shift_remove_full(&item.id) {
                if stale < index {
                    index -= 1;
                }
            }
            self.items.shift_remove_index(index);
            self.items.shift_insert(index, item.id.clone(), item);
        } else {
            self.items[index] = item;
        }
        true
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<Item> {
        tracing::debug!(%id, "store remove");
        self.items.shift_remove(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn all(&self) -> Vec<Item> {
        self.items.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.keys().cloned().collect()
    }

    /// Replaces the whole collection, keeping the given order.
    pub fn reset(&mut self, items: impl IntoIterator<Item = Item>) {
        self.items = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            items: self.items.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.items = snapshot.items;
    }

    /// Puts `id` back from `snapshot` at its snapshot position, leaving the
    /// rest of the store as it is now. With no changes since the snapshot
    /// this yields exactly the snapshot. Returns `false` when `id` is
    /// already present or was never in the snapshot.
    pub fn restore_entry(&mut self, snapshot: &StoreSnapshot, id: &ItemId) -> bool {
        if self.items.contains_key(id) {
            return false;
        }
        let Some((index, _, item)) = snapshot.items.get_full(id) else {
            return false;
        };
        let index = index.min(self.items.len());
        self.items.shift_insert(index, id.clone(), item.clone());
        true
    }
}

/// Shared handle to the single in-process store.
///
/// Guards are never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct StoreHandle {
    inner: Arc<RwLock<ItemStore>>,
}

impl StoreHandle {
    pub fn new(store: ItemStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ItemStore> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ItemStore> {
        self.inner.write()
    }

    pub fn all(&self) -> Vec<Item> {
        self.read().all()
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewItem;
    use time::OffsetDateTime;

    fn item(id: &str) -> Item {
        Item::from_new(
            ItemId::new(id),
            &NewItem::new(format!("item {id}")),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn ids(store: &ItemStore) -> Vec<String> {
        store.iter().map(|item| item.id.to_string()).collect()
    }

    #[test]
    fn add_puts_newest_first() {
        let mut store = ItemStore::new();
        store.add(item("a"));
        store.add(item("b"));
        assert_eq!(ids(&store), vec!["b", "a"]);
    }

    #[test]
    fn replace_swaps_id_in_place() {
        let mut store = ItemStore::from_items([item("a"), item("tmp"), item("c")]);
        assert!(store.replace(&ItemId::new("tmp"), item("server")));
        assert_eq!(ids(&store), vec!["a", "server", "c"]);
        assert!(!store.contains(&ItemId::new("tmp")));
    }

    #[test]
    fn replace_drops_stale_copy_of_new_id() {
        let mut store = ItemStore::from_items([item("server"), item("a"), item("tmp")]);
        assert!(store.replace(&ItemId::new("tmp"), item("server")));
        assert_eq!(ids(&store), vec!["a", "server"]);
    }

    #[test]
    fn replace_unknown_id_is_a_no_op() {
        let mut store = ItemStore::from_items([item("a")]);
        let before = store.clone();
        assert!(!store.replace(&ItemId::new("missing"), item("b")));
        assert_eq!(store, before);
    }

    #[test]
    fn replace_same_id_updates_value() {
        let mut store = ItemStore::from_items([item("a"), item("b")]);
        let mut changed = item("b");
        changed.content = "changed".into();
        assert!(store.replace(&ItemId::new("b"), changed));
        assert_eq!(store.get(&ItemId::new("b")).map(|i| i.content.as_str()), Some("changed"));
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_restores_membership_and_order() {
        let mut store = ItemStore::from_items([item("a"), item("b"), item("c")]);
        let snapshot = store.snapshot();
        store.remove(&ItemId::new("b"));
        store.add(item("d"));
        store.restore(snapshot);
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn restore_entry_keeps_later_changes() {
        let mut store = ItemStore::from_items([item("a"), item("b"), item("c")]);
        let snapshot = store.snapshot();
        store.remove(&ItemId::new("b"));
        assert!(store.restore_entry(&snapshot, &ItemId::new("b")));
        assert_eq!(store, ItemStore::from_items([item("a"), item("b"), item("c")]));

        store.remove(&ItemId::new("b"));
        store.add(item("d"));
        assert!(store.restore_entry(&snapshot, &ItemId::new("b")));
        assert_eq!(ids(&store), vec!["d", "b", "a", "c"]);
        assert!(!store.restore_entry(&snapshot, &ItemId::new("b")));
    }

    #[test]
    fn handle_shares_state_between_clones() {
        let handle = StoreHandle::default();
        let other = handle.clone();
        handle.write().add(item("a"));
        assert_eq!(other.read().len(), 1);
        assert!(other.get(&ItemId::new("a")).is_some());
    }
}
