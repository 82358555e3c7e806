//! Optimistic mutations: the store changes first, the gateway confirms or
//! the change is rolled back.

use std::collections::HashSet;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use strum::Display;
use time::OffsetDateTime;

use crate::attachments::{storage_id_from_url, AttachmentHost};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, GatewayError, Principal};
use crate::model::{validate_input, Item, ItemId, ItemPatch, ItemStatus, NewItem};
use crate::parser;
use crate::store::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStrategy {
    /// The tentative item was dropped.
    RemovedTentative,
    /// The store was replaced by the gateway's collection.
    Resynced,
    /// Resync failed too; the store keeps the unconfirmed local state.
    ResyncFailed(GatewayError),
    /// The deleted item was put back from the snapshot.
    RestoredSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    pub kind: MutationKind,
    pub id: ItemId,
    pub error: GatewayError,
    pub strategy: RollbackStrategy,
}

impl Rollback {
    pub fn message(&self) -> String {
        format!("{} of {} failed and was undone: {}", self.kind, self.id, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<T> {
    Confirmed(T),
    RolledBack(Rollback),
    /// No principal bound; nothing was touched.
    Skipped,
}

impl<T> MutationOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed(_))
    }

    pub fn confirmed(self) -> Option<T> {
        match self {
            MutationOutcome::Confirmed(value) => Some(value),
            _ => None,
        }
    }

    pub fn rollback(&self) -> Option<&Rollback> {
        match self {
            MutationOutcome::RolledBack(rollback) => Some(rollback),
            _ => None,
        }
    }
}

pub struct MutationEngine<G> {
    gateway: G,
    store: StoreHandle,
    principal: Option<Principal>,
    notices: Option<Sender<Rollback>>,
    deleting: Mutex<HashSet<ItemId>>,
}

impl<G: Gateway> MutationEngine<G> {
    pub fn new(gateway: G, store: StoreHandle) -> Self {
        Self {
            gateway,
            store,
            principal: None,
            notices: None,
            deleting: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn bind(&mut self, principal: Option<Principal>) {
        self.principal = principal;
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Rollbacks are also published on the returned channel. A new call
    /// replaces the previous subscriber.
    pub fn subscribe(&mut self) -> Receiver<Rollback> {
        let (tx, rx) = unbounded();
        self.notices = Some(tx);
        rx
    }

    /// Replaces the store with the gateway's collection. Returns `false`
    /// without touching anything when no principal is bound.
    pub async fn refresh(&self) -> std::result::Result<bool, GatewayError> {
        let Some(principal) = &self.principal else {
            return Ok(false);
        };
        let items = self.gateway.get_all(principal).await?;
        tracing::debug!(count = items.len(), "store refreshed");
        self.store.write().reset(items);
        Ok(true)
    }

    /// Parses a line of free-form input and creates the resulting item.
    pub async fn capture(&self, text: &str) -> Result<MutationOutcome<Item>> {
        if self.principal.is_none() {
            return Ok(MutationOutcome::Skipped);
        }
        validate_input(text)?;
        let draft = NewItem::from(parser::parse(text));
        self.create(draft).await
    }

    pub async fn create(&self, mut draft: NewItem) -> Result<MutationOutcome<Item>> {
        let Some(principal) = &self.principal else {
            return Ok(MutationOutcome::Skipped);
        };
        draft.validate()?;

        let tentative = Item::from_new(ItemId::tentative(), &draft, OffsetDateTime::now_utc());
        let tentative_id = tentative.id.clone();
        self.store.write().add(tentative);

        match self.gateway.create(principal, &draft).await {
            Ok(item) => {
                if !self.store.write().replace(&tentative_id, item.clone()) {
                    tracing::warn!(%tentative_id, id = %item.id, "tentative item vanished before reconciliation");
                }
                tracing::info!(id = %item.id, "item created");
                Ok(MutationOutcome::Confirmed(item))
            }
            Err(error) => {
                self.store.write().remove(&tentative_id);
                Ok(self.rolled_back(Rollback {
                    kind: MutationKind::Create,
                    id: tentative_id,
                    error,
                    strategy: RollbackStrategy::RemovedTentative,
                }))
            }
        }
    }

    /// Applies the present fields of `patch` to item `id`.
    pub async fn update(&self, id: &ItemId, mut patch: ItemPatch) -> Result<MutationOutcome<Item>> {
        let Some(principal) = &self.principal else {
            return Ok(MutationOutcome::Skipped);
        };
        ensure_confirmed(id)?;
        patch.validate()?;

        {
            let mut store = self.store.write();
            let mut updated = store
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            patch.apply_to(&mut updated);
            store.replace(id, updated);
        }

        match self.gateway.update(principal, id, &patch).await {
            Ok(item) => {
                tracing::info!(%id, fields = ?patch.fields(), "item updated");
                Ok(MutationOutcome::Confirmed(item))
            }
            Err(error) => {
                let strategy = self.resync(principal).await;
                Ok(self.rolled_back(Rollback {
                    kind: MutationKind::Update,
                    id: id.clone(),
                    error,
                    strategy,
                }))
            }
        }
    }

    /// Overwrites every mutable field of the stored item with `item`'s.
    pub async fn update_item(&self, item: &Item) -> Result<MutationOutcome<Item>> {
        self.update(&item.id, ItemPatch::from_item(item)).await
    }

    pub async fn set_status(&self, id: &ItemId, status: ItemStatus) -> Result<MutationOutcome<Item>> {
        self.update(id, ItemPatch::status(status)).await
    }

    /// Flips completion: done becomes pending, anything else becomes done.
    pub async fn toggle(&self, id: &ItemId) -> Result<MutationOutcome<Item>> {
        if self.principal.is_none() {
            return Ok(MutationOutcome::Skipped);
        }
        let status = self.current(id)?.status;
        self.set_status(id, status.toggled()).await
    }

    pub async fn delete(&self, id: &ItemId) -> Result<MutationOutcome<()>> {
        let Some(principal) = &self.principal else {
            return Ok(MutationOutcome::Skipped);
        };
        ensure_confirmed(id)?;

        let snapshot = {
            let mut store = self.store.write();
            if !store.contains(id) {
                return Err(Error::NotFound(id.clone()));
            }
            let snapshot = store.snapshot();
            store.remove(id);
            snapshot
        };
        self.deleting.lock().insert(id.clone());

        let result = self.gateway.delete(principal, id).await;
        self.deleting.lock().remove(id);
        match result {
            Ok(()) => {
                tracing::info!(%id, "item deleted");
                Ok(MutationOutcome::Confirmed(()))
            }
            Err(error) => {
                self.store.write().restore_entry(&snapshot, id);
                Ok(self.rolled_back(Rollback {
                    kind: MutationKind::Delete,
                    id: id.clone(),
                    error,
                    strategy: RollbackStrategy::RestoredSnapshot,
                }))
            }
        }
    }

    pub async fn attach_image(&self, id: &ItemId, url: String) -> Result<MutationOutcome<Item>> {
        if self.principal.is_none() {
            return Ok(MutationOutcome::Skipped);
        }
        let mut images = self.current(id)?.images;
        images.push(url);
        self.update(id, ItemPatch::images(images)).await
    }

    /// Uploads `source` to `host` and attaches the resulting URL.
    pub async fn upload_image<H: AttachmentHost>(
        &self,
        host: &H,
        id: &ItemId,
        source: &std::path::Path,
    ) -> Result<MutationOutcome<Item>> {
        if self.principal.is_none() {
            return Ok(MutationOutcome::Skipped);
        }
        self.current(id)?;
        let url = host.upload(source).await?;
        self.attach_image(id, url).await
    }

    /// Destroys the hosted blob behind `url`, then drops the URL from the
    /// item. A URL that does not carry a storage id, or a host failure,
    /// leaves the item untouched.
    pub async fn detach_image<H: AttachmentHost>(
        &self,
        host: &H,
        id: &ItemId,
        url: &str,
    ) -> Result<MutationOutcome<Item>> {
        if self.principal.is_none() {
            return Ok(MutationOutcome::Skipped);
        }
        let current = self.current(id)?;
        let storage_id = storage_id_from_url(url)?;
        host.destroy(&storage_id).await?;
        let images = current
            .images
            .into_iter()
            .filter(|image| image != url)
            .collect();
        self.update(id, ItemPatch::images(images)).await
    }

    fn current(&self, id: &ItemId) -> Result<Item> {
        self.store.get(id).ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Reloads the store from the gateway. Items still waiting for their
    /// create to be confirmed are kept in front, items with a delete in
    /// flight stay out.
    async fn resync(&self, principal: &Principal) -> RollbackStrategy {
        match self.gateway.get_all(principal).await {
            Ok(items) => {
                let deleting = self.deleting.lock().clone();
                let items = items.into_iter().filter(|item| !deleting.contains(&item.id));
                let mut store = self.store.write();
                let in_flight: Vec<Item> = store
                    .iter()
                    .filter(|item| item.id.is_tentative())
                    .cloned()
                    .collect();
                store.reset(in_flight.into_iter().chain(items));
                RollbackStrategy::Resynced
            }
            Err(err) => {
                tracing::error!(?err, "resync after failed update also failed");
                RollbackStrategy::ResyncFailed(err)
            }
        }
    }

    fn rolled_back<T>(&self, rollback: Rollback) -> MutationOutcome<T> {
        tracing::warn!(
            kind = %rollback.kind,
            id = %rollback.id,
            error = %rollback.error,
            strategy = ?rollback.strategy,
            "mutation rolled back"
        );
        if let Some(notices) = &self.notices {
            if notices.send(rollback.clone()).is_err() {
                tracing::debug!("rollback notice dropped, no subscriber");
            }
        }
        MutationOutcome::RolledBack(rollback)
    }
}

fn ensure_confirmed(id: &ItemId) -> Result<()> {
    if id.is_tentative() {
        return Err(Error::Unconfirmed(id.clone()));
    }
    Ok(())
}
