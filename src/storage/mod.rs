//! # Storage Module - Persistence Providers
//!
//! The economy core never touches disk directly. It talks to a
//! [`PersistenceProvider`], which stores one JSON document per
//! `(collection, guild)` pair plus an append-only ledger journal per guild.
//!
//! ## Providers
//!
//! - [`JsonFileStore`] - one pretty-printed JSON file per document, written via
//!   temp-file + rename under an exclusive `fs2` lock
//! - [`SledStore`] - embedded sled database, multi-document saves applied as one batch
//! - [`MemoryStore`] - process-local map used by tests and the `memory` backend
//!
//! ## Layout (JSON backend)
//!
//! ```text
//! data/
//! ├── guild_configs/<guild>.json
//! ├── shops/<guild>.json
//! ├── users/<guild>.json
//! ├── checkins/<guild>.json
//! ├── characters/<guild>.json
//! └── journal/<guild>.jsonl
//! ```
//!
//! ## Contract
//!
//! - `load_collection` returns the last successfully saved snapshot, or `None`
//!   when nothing was ever saved for that guild.
//! - `save_collections` is durable before it returns. When it fails, no
//!   document of the batch is left in a half-written state.

mod json_store;
mod memory;
mod sled_store;

pub use json_store::JsonFileStore;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::fmt;

use thiserror::Error;

/// Errors raised by persistence providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around IO errors (directory creation, file writes, locking).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A provider-internal mutex was poisoned by a panicking writer.
    #[error("storage lock poisoned: {0}")]
    Poisoned(&'static str),

    /// A batch write failed and the earlier documents of the batch could not be restored.
    #[error("batch for guild {guild} failed ({cause}); rollback also failed: {rollback}")]
    RollbackFailed {
        guild: String,
        cause: String,
        rollback: String,
    },
}

/// The record collections the economy persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    GuildConfigs,
    Shops,
    Users,
    Checkins,
    Characters,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::GuildConfigs,
        Collection::Shops,
        Collection::Users,
        Collection::Checkins,
        Collection::Characters,
    ];

    /// Stable name used for directories and log lines.
    pub fn name(self) -> &'static str {
        match self {
            Collection::GuildConfigs => "guild_configs",
            Collection::Shops => "shops",
            Collection::Users => "users",
            Collection::Checkins => "checkins",
            Collection::Characters => "characters",
        }
    }

    /// Single-byte tag used as a fixed-width key prefix by binary backends.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Collection::GuildConfigs => 1,
            Collection::Shops => 2,
            Collection::Users => 3,
            Collection::Checkins => 4,
            Collection::Characters => 5,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable keyed document storage consumed by the economy core.
pub trait PersistenceProvider: Send + Sync {
    /// Load the document for `collection` in `guild`.
    fn load_collection(
        &self,
        collection: Collection,
        guild: &str,
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Persist several documents belonging to one guild as a single unit.
    fn save_collections(
        &self,
        guild: &str,
        batch: &[(Collection, Vec<u8>)],
    ) -> Result<(), StorageError>;

    /// Persist a single document.
    fn save_collection(
        &self,
        collection: Collection,
        guild: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.save_collections(guild, &[(collection, data.to_vec())])
    }

    /// Append one serialized journal entry for `guild`.
    fn append_journal(&self, guild: &str, entry: &[u8]) -> Result<(), StorageError>;

    /// Read every journal entry for `guild`, oldest first.
    fn read_journal(&self, guild: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}
