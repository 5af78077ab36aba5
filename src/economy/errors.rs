use thiserror::Error;

use super::types::{CurrencyId, ItemId, ShopKey, StackKey, UserId};
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Broad categories the Command Layer translates into user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientFunds,
    InsufficientStock,
    Forbidden,
    /// An item flag (purchasable, usable) blocks the action.
    FlagGated,
    Internal,
}

/// Errors returned by economy operations. No variant is produced after a mutation
/// has been written.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("'{value}' is not a valid {kind} id (use lowercase letters, digits and _ starting with a letter)")]
    InvalidId { kind: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("limit reached: at most {max} {what}")]
    LimitReached { what: &'static str, max: usize },

    #[error("amount overflow")]
    Overflow,

    #[error("currency '{0}' not found")]
    CurrencyNotFound(CurrencyId),

    /// The guild has no currencies registered at all.
    #[error("no currencies have been created in this server yet")]
    NoCurrency,

    #[error("shop '{0}' not found")]
    ShopNotFound(ShopKey),

    #[error("item '{0}' not found")]
    ItemNotFound(String),

    #[error("inventory item '{0}' not found")]
    StackNotFound(StackKey),

    #[error("user {0} has no character")]
    NoCharacter(UserId),

    #[error("{kind} '{id}' already exists")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{message}")]
    AlreadyClaimed { streak: u32, message: String },

    #[error("you already have a character in this server")]
    CharacterExists,

    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: CurrencyId,
        needed: i64,
        available: i64,
    },

    #[error("insufficient stock for '{item}': requested {requested}, {remaining} left")]
    InsufficientStock {
        item: ItemId,
        requested: u32,
        remaining: u32,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("'{0}' is not for sale")]
    NotPurchasable(ItemId),

    #[error("'{0}' cannot be used")]
    NotUsable(String),

    #[error("'{0}' has unlimited stock")]
    UnlimitedStock(ItemId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("corrupt document: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    pub fn kind(&self) -> ErrorKind {
        use EconomyError::*;
        match self {
            InvalidId { .. } | Validation(_) | LimitReached { .. } | Overflow | InvalidTarget(_) => {
                ErrorKind::Validation
            }
            // Restocking an unlimited item is a rejected no-op, reported like bad input.
            UnlimitedStock(_) => ErrorKind::Validation,
            CurrencyNotFound(_)
            | NoCurrency
            | ShopNotFound(_)
            | ItemNotFound(_)
            | StackNotFound(_)
            | NoCharacter(_) => ErrorKind::NotFound,
            DuplicateId { .. } | AlreadyClaimed { .. } | CharacterExists => ErrorKind::Conflict,
            InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Forbidden(_) => ErrorKind::Forbidden,
            NotPurchasable(_) | NotUsable(_) => ErrorKind::FlagGated,
            Storage(_) | Codec(_) | Internal(_) => ErrorKind::Internal,
        }
    }
}
