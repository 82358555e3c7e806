//! Remote persistence contract consumed by the mutation engine.
//!
//! Implementations apply a mutation completely or not at all. Timeouts and
//! transport problems surface as ordinary [`GatewayError`]s.

use std::fmt;

use thiserror::Error;

use crate::model::{Item, ItemId, ItemPatch, NewItem};

pub mod document;
pub mod memory;
mod schema;
pub mod sqlite;

pub use document::DocumentGateway;
pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// Identity under whose scope gateway calls run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("item {0} not found in store")]
    NotFound(ItemId),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl GatewayError {
    pub fn storage(err: impl fmt::Display) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Storage(format!("{err:#}"))
    }
}

#[allow(async_fn_in_trait)]
pub trait Gateway {
    /// Every item owned by `principal`, newest first.
    async fn get_all(&self, principal: &Principal) -> Result<Vec<Item>, GatewayError>;

    /// Persists `draft`; the store assigns id and creation time.
    async fn create(&self, principal: &Principal, draft: &NewItem) -> Result<Item, GatewayError>;

    /// Applies the fields present in `patch` and returns the stored item.
    async fn update(
        &self,
        principal: &Principal,
        id: &ItemId,
        patch: &ItemPatch,
    ) -> Result<Item, GatewayError>;

    async fn delete(&self, principal: &Principal, id: &ItemId) -> Result<(), GatewayError>;
}
