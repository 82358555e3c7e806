use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{Gateway, GatewayError, Principal};
use crate::model::{Item, ItemId, ItemPatch, NewItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetAll,
    Create(String),
    Update(ItemId, Vec<&'static str>),
    Delete(ItemId),
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<(String, Item)>,
    fail_next: usize,
    fail_writes: usize,
    offline: bool,
    calls: Vec<GatewayCall>,
}

impl MemoryState {
    fn check_available(&mut self) -> Result<(), GatewayError> {
        if self.offline {
            return Err(GatewayError::Transport("gateway offline".into()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(GatewayError::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn check_writable(&mut self) -> Result<(), GatewayError> {
        self.check_available()?;
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(GatewayError::Transport("injected write failure".into()));
        }
        Ok(())
    }

    fn row_mut(&mut self, principal: &Principal, id: &ItemId) -> Option<&mut Item> {
        self.rows
            .iter_mut()
            .find(|(owner, item)| owner == principal.id() && item.id == *id)
            .map(|(_, item)| item)
    }
}

/// In-process gateway. Clones share the same rows.
///
/// Supports failure injection so callers can exercise rollback paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `item` as-is, keeping its id and creation time.
    pub fn seed(&self, principal: &Principal, item: Item) {
        self.state
            .lock()
            .rows
            .push((principal.id().to_string(), item));
    }

    /// Makes the next `count` calls fail with a transport error.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// Like [`fail_next`](Self::fail_next), but reads keep working.
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn items_for(&self, principal: &Principal) -> Vec<Item> {
        collect_owned(&self.state.lock(), principal)
    }
}

fn collect_owned(state: &MemoryState, principal: &Principal) -> Vec<Item> {
    let mut items: Vec<Item> = state
        .rows
        .iter()
        .rev()
        .filter(|(owner, _)| owner == principal.id())
        .map(|(_, item)| item.clone())
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

impl Gateway for MemoryGateway {
    async fn get_all(&self, principal: &Principal) -> Result<Vec<Item>, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetAll);
        state.check_available()?;
        Ok(collect_owned(&state, principal))
    }

    async fn create(&self, principal: &Principal, draft: &NewItem) -> Result<Item, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::Create(draft.content.clone()));
        state.check_writable()?;
        if draft.content.trim().is_empty() {
            return Err(GatewayError::Rejected("content is required".into()));
        }
        let item = Item::from_new(ItemId::generate(), draft, OffsetDateTime::now_utc());
        state
            .rows
            .push((principal.id().to_string(), item.clone()));
        Ok(item)
    }

    async fn update(
        &self,
        principal: &Principal,
        id: &ItemId,
        patch: &ItemPatch,
    ) -> Result<Item, GatewayError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::Update(id.clone(), patch.fields()));
        state.check_writable()?;
        let row = state
            .row_mut(principal, id)
            .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
        patch.apply_to(row);
        Ok(row.clone())
    }

    async fn delete(&self, principal: &Principal, id: &ItemId) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::Delete(id.clone()));
        state.check_writable()?;
        let before = state.rows.len();
        state
            .rows
            .retain(|(owner, item)| !(owner == principal.id() && item.id == *id));
        if state.rows.len() == before {
            return Err(GatewayError::NotFound(id.clone()));
        }
        Ok(())
    }
}
