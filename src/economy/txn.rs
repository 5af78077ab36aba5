//! Per-guild unit of work.
//!
//! A [`GuildTxn`] lives for exactly one operation while the guild lock is held. It loads
//! each collection document at most once, hands out mutable copies, and on commit writes
//! every modified document in one provider batch. Dropping it without commit writes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::EconomyError;
use super::keyed;
use super::ledger::LedgerEntry;
use super::types::{
    CheckinKey, CheckinRecord, Character, GuildConfig, GuildId, Shop, ShopKey, UserAccount, UserId,
};
use crate::storage::{Collection, PersistenceProvider};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ShopBook(#[serde(with = "keyed")] pub BTreeMap<ShopKey, Shop>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct AccountBook(pub BTreeMap<UserId, UserAccount>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CheckinBook(#[serde(with = "keyed")] pub BTreeMap<CheckinKey, CheckinRecord>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CharacterBook(pub BTreeMap<UserId, Character>);

pub(crate) struct Slot<T> {
    value: Option<T>,
    dirty: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            dirty: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct Slots {
    config: Slot<GuildConfig>,
    shops: Slot<ShopBook>,
    accounts: Slot<AccountBook>,
    checkins: Slot<CheckinBook>,
    characters: Slot<CharacterBook>,
}

/// A per-guild collection document.
pub(crate) trait Document: Serialize + DeserializeOwned + Default {
    const COLLECTION: Collection;
    fn slot(slots: &mut Slots) -> &mut Slot<Self>;
}

macro_rules! document {
    ($ty:ty, $collection:expr, $field:ident) => {
        impl Document for $ty {
            const COLLECTION: Collection = $collection;
            fn slot(slots: &mut Slots) -> &mut Slot<Self> {
                &mut slots.$field
            }
        }
    };
}

document!(GuildConfig, Collection::GuildConfigs, config);
document!(ShopBook, Collection::Shops, shops);
document!(AccountBook, Collection::Users, accounts);
document!(CheckinBook, Collection::Checkins, checkins);
document!(CharacterBook, Collection::Characters, characters);

pub(crate) struct GuildTxn<'a> {
    store: &'a dyn PersistenceProvider,
    guild: &'a GuildId,
    now: DateTime<Utc>,
    slots: Slots,
    journal: Vec<LedgerEntry>,
}

impl<'a> GuildTxn<'a> {
    pub(crate) fn new(
        store: &'a dyn PersistenceProvider,
        guild: &'a GuildId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            guild,
            now,
            slots: Slots::default(),
            journal: Vec::new(),
        }
    }

    pub(crate) fn guild(&self) -> &GuildId {
        self.guild
    }

    /// Timestamp stamped on every record created by this operation.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn load<T: Document>(&mut self) -> Result<&mut Slot<T>, EconomyError> {
        let store = self.store;
        let guild = self.guild;
        let slot = T::slot(&mut self.slots);
        if slot.value.is_none() {
            let loaded = match store.load_collection(T::COLLECTION, guild.as_str())? {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => T::default(),
            };
            debug!("loaded {} for guild {}", T::COLLECTION, guild);
            slot.value = Some(loaded);
        }
        Ok(slot)
    }

    /// Read access; the document is not written back unless also taken with `write`.
    pub(crate) fn read<T: Document>(&mut self) -> Result<&T, EconomyError> {
        let slot = self.load::<T>()?;
        slot.value
            .as_ref()
            .ok_or_else(|| EconomyError::Internal(format!("{} not loaded", T::COLLECTION)))
    }

    pub(crate) fn write<T: Document>(&mut self) -> Result<&mut T, EconomyError> {
        let slot = self.load::<T>()?;
        slot.dirty = true;
        slot.value
            .as_mut()
            .ok_or_else(|| EconomyError::Internal(format!("{} not loaded", T::COLLECTION)))
    }

    /// Queue a journal entry, appended only after the documents commit.
    pub(crate) fn record(&mut self, entry: LedgerEntry) {
        self.journal.push(entry);
    }

    pub(crate) fn commit(self) -> Result<(), EconomyError> {
        let Self {
            store,
            guild,
            slots,
            journal,
            ..
        } = self;

        let mut batch = Vec::new();
        push_dirty(&slots.config, &mut batch)?;
        push_dirty(&slots.shops, &mut batch)?;
        push_dirty(&slots.accounts, &mut batch)?;
        push_dirty(&slots.checkins, &mut batch)?;
        push_dirty(&slots.characters, &mut batch)?;

        if !batch.is_empty() {
            store.save_collections(guild.as_str(), &batch)?;
            debug!("committed {} document(s) for guild {}", batch.len(), guild);
        }

        // The journal is an audit trail; balances are already durable at this point.
        for entry in &journal {
            let appended = serde_json::to_vec(entry)
                .map_err(EconomyError::from)
                .and_then(|bytes| Ok(store.append_journal(guild.as_str(), &bytes)?));
            if let Err(e) = appended {
                warn!("journal append failed for guild {}: {}", guild, e);
            }
        }
        Ok(())
    }
}

fn push_dirty<T: Document>(
    slot: &Slot<T>,
    batch: &mut Vec<(Collection, Vec<u8>)>,
) -> Result<(), EconomyError> {
    if let (true, Some(value)) = (slot.dirty, slot.value.as_ref()) {
        batch.push((T::COLLECTION, serde_json::to_vec_pretty(value)?));
    }
    Ok(())
}

/// One mutex per guild, created on first use.
#[derive(Default)]
pub(crate) struct GuildLocks {
    locks: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
}

impl GuildLocks {
    pub(crate) fn handle(&self, guild: &GuildId) -> Result<Arc<Mutex<()>>, EconomyError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| EconomyError::Internal("guild lock table poisoned".into()))?;
        Ok(locks.entry(guild.clone()).or_default().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn untouched_documents_are_not_written() {
        let store = MemoryStore::new();
        let guild = GuildId::new("g");
        let mut txn = GuildTxn::new(&store, &guild, Utc::now());
        txn.read::<GuildConfig>().expect("read");
        txn.commit().expect("commit");
        assert!(store
            .load_collection(Collection::GuildConfigs, "g")
            .expect("load")
            .is_none());
    }

    #[test]
    fn written_documents_commit_together() {
        let store = MemoryStore::new();
        let guild = GuildId::new("g");
        let mut txn = GuildTxn::new(&store, &guild, Utc::now());
        txn.write::<AccountBook>()
            .expect("accounts")
            .0
            .entry(UserId::new("u"))
            .or_default();
        txn.write::<CharacterBook>().expect("characters");
        txn.commit().expect("commit");

        assert!(store
            .load_collection(Collection::Users, "g")
            .expect("load")
            .is_some());
        assert!(store
            .load_collection(Collection::Characters, "g")
            .expect("load")
            .is_some());
    }

    #[test]
    fn dropped_txn_writes_nothing() {
        let store = MemoryStore::new();
        let guild = GuildId::new("g");
        {
            let mut txn = GuildTxn::new(&store, &guild, Utc::now());
            txn.write::<AccountBook>().expect("accounts");
        }
        assert!(store
            .load_collection(Collection::Users, "g")
            .expect("load")
            .is_none());
    }

    #[test]
    fn same_guild_shares_a_lock() {
        let locks = GuildLocks::default();
        let a = locks.handle(&GuildId::new("g")).expect("lock");
        let b = locks.handle(&GuildId::new("g")).expect("lock");
        let c = locks.handle(&GuildId::new("other")).expect("lock");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
