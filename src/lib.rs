pub mod attachments;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod model;
pub mod parser;
pub mod store;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use engine::{MutationEngine, MutationOutcome, Rollback};
pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayError, Principal};
pub use model::{Item, ItemId, ItemKind, ItemPatch, ItemStatus, NewItem, Priority};
pub use store::{ItemStore, StoreHandle};
