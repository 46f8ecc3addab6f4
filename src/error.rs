use crate::domain::bill::{BillId, ItemId};
use crate::domain::gate::MutationKind;
use std::fmt;
use thiserror::Error;

/// The entity a `NotFound` rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Bill(BillId),
    Item(ItemId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bill(id) => write!(f, "bill {id}"),
            Self::Item(id) => write!(f, "item {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BillError {
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("No such {0} found")]
    NotFound(EntityRef),
    #[error("Not authorized to {action} on bill {bill}")]
    Forbidden { bill: BillId, action: MutationKind },
    #[error("Bill {0} is already paid")]
    AlreadyPaid(BillId),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email {0} is already registered")]
    EmailTaken(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BillError {
    /// True for the classified rejections a caller can act on, as opposed to
    /// infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::NotFound(_)
                | Self::Forbidden { .. }
                | Self::AlreadyPaid(_)
                | Self::ValidationError(_)
                | Self::InvalidCredentials
                | Self::EmailTaken(_)
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

pub type Result<T> = std::result::Result<T, BillError>;
