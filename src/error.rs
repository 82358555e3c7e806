use thiserror::Error;

use crate::attachments::AttachmentError;
use crate::gateway::GatewayError;
use crate::model::{ItemId, ValidationError};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("item {0} not found")]
    NotFound(ItemId),

    #[error("item {0} is still waiting for its create to be confirmed")]
    Unconfirmed(ItemId),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

pub type Result<T> = std::result::Result<T, Error>;
