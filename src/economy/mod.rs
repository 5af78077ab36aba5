//! # Guild economy core
//!
//! All economic state is partitioned per guild: currencies, balances, shops, inventories,
//! check-in streaks and character sheets. The [`Economy`] service owns the injected
//! [`PersistenceProvider`] and hands out lightweight component views:
//!
//! - [`CurrencyRegistry`] via [`Economy::currencies`]
//! - [`Ledger`] via [`Economy::ledger`]
//! - [`ShopCatalog`] via [`Economy::shops`]
//! - [`InventoryManager`] via [`Economy::inventory`]
//! - [`CheckInEngine`] via [`Economy::checkin`]
//! - [`CharacterSheets`] via [`Economy::characters`]
//! - [`AdminRoles`] via [`Economy::admin`]
//!
//! Every public operation is one load-validate-mutate-save cycle under the guild's lock.
//! Validation failures return before anything is written, and all documents an operation
//! touched are committed in a single provider batch, so a purchase can never be observed
//! debited but not stocked.
//!
//! ```rust
//! use std::sync::Arc;
//! use guildvault::config::EconomyConfig;
//! use guildvault::economy::{Caller, Economy};
//! use guildvault::storage::MemoryStore;
//!
//! let economy = Economy::new(Arc::new(MemoryStore::new()), EconomyConfig::default());
//! let admin = Caller::new("guild", "owner").platform_admin();
//! economy.currencies().create(&admin, "gold", "Gold", Some("G"), None).unwrap();
//! economy.ledger().credit(&admin.guild, &"alice".into(), "gold", 25).unwrap();
//! assert_eq!(economy.ledger().balance(&admin.guild, &"alice".into(), "gold").unwrap(), 25);
//! ```

use std::sync::Arc;

use log::debug;

mod admin;
mod character;
mod checkin;
mod clock;
mod currency;
mod errors;
mod inventory;
mod keyed;
pub mod leveling;
mod ledger;
mod shop;
mod txn;
mod types;

pub use admin::AdminRoles;
pub use character::{BaseStats, CharacterSheets, CharacterView, LevelChange};
pub use checkin::{CheckInEngine, CheckinReceipt, CheckinSettingsUpdate, CheckinStatus, RoleBonus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use currency::CurrencyRegistry;
pub use errors::{EconomyError, ErrorKind};
pub use inventory::{InventoryManager, UseOutcome};
pub use ledger::{EntryKind, Ledger, LedgerEntry, TransferReceipt};
pub use shop::{NewItem, PurchaseReceipt, ShopCatalog};
pub use types::*;

use crate::config::EconomyConfig;
use crate::metrics;
use crate::storage::PersistenceProvider;
use txn::{GuildLocks, GuildTxn};

pub struct Economy {
    store: Arc<dyn PersistenceProvider>,
    clock: Arc<dyn Clock>,
    config: EconomyConfig,
    locks: GuildLocks,
}

impl Economy {
    pub fn new(store: Arc<dyn PersistenceProvider>, config: EconomyConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn PersistenceProvider>,
        config: EconomyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            locks: GuildLocks::default(),
        }
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn PersistenceProvider {
        self.store.as_ref()
    }

    pub fn currencies(&self) -> CurrencyRegistry<'_> {
        CurrencyRegistry::new(self)
    }

    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self)
    }

    pub fn shops(&self) -> ShopCatalog<'_> {
        ShopCatalog::new(self)
    }

    pub fn inventory(&self) -> InventoryManager<'_> {
        InventoryManager::new(self)
    }

    pub fn checkin(&self) -> CheckInEngine<'_> {
        CheckInEngine::new(self)
    }

    pub fn characters(&self) -> CharacterSheets<'_> {
        CharacterSheets::new(self)
    }

    pub fn admin(&self) -> AdminRoles<'_> {
        AdminRoles::new(self)
    }

    /// Run `op` as one unit of work against `guild`.
    ///
    /// The guild lock is held for the whole cycle. On `Ok` every document the closure
    /// took for writing is saved in one batch; on `Err` nothing is saved.
    pub(crate) fn with_guild<T, F>(&self, guild: &GuildId, op: F) -> Result<T, EconomyError>
    where
        F: FnOnce(&mut GuildTxn<'_>) -> Result<T, EconomyError>,
    {
        let handle = self.locks.handle(guild)?;
        // A panic inside `op` never reaches commit, so a poisoned lock guards nothing stale.
        let _guard = handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut txn = GuildTxn::new(self.store.as_ref(), guild, self.clock.now());
        let outcome = op(&mut txn).and_then(|value| txn.commit().map(|()| value));
        if let Err(e) = &outcome {
            debug!("operation in guild {} rejected: {}", guild, e);
            metrics::record_rejection(e.kind());
        }
        outcome
    }
}
