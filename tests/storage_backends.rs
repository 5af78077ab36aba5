//! The economy survives a restart on each durable backend.

mod common;

use std::sync::Arc;

use common::*;
use guildvault::config::{Config, StorageBackend};
use guildvault::economy::{EntryKind, NewItem, Stock};
use guildvault::storage::{JsonFileStore, PersistenceProvider, SledStore};
use guildvault::validation::safe_filename;
use tempfile::TempDir;

/// Run a small session: currency, a purchase and a check-in.
fn play_session(store: Arc<dyn PersistenceProvider>) {
    let (economy, _) = economy_on(store);
    with_gold(&economy);
    let mut potion = NewItem::new("Potion", 30, "gold");
    potion.stock = 4;
    let (shop, item) = armory(&economy, "smith", potion);
    economy
        .ledger()
        .credit(&guild(), &"alice".into(), "gold", 100)
        .unwrap();
    economy
        .shops()
        .purchase(&member("alice"), &shop, &item, 3)
        .unwrap();
    economy.checkin().claim(&member("alice"), None).unwrap();
}

fn verify_session(store: Arc<dyn PersistenceProvider>) {
    let (economy, _) = economy_on(store);
    let currencies = economy.currencies().list(&guild()).unwrap();
    assert_eq!(currencies.len(), 1);
    assert_eq!(currencies[0].name, "Gold");

    // 100 credited, 90 spent, 100 from the check-in.
    assert_eq!(
        economy
            .ledger()
            .balance(&guild(), &"alice".into(), "gold")
            .unwrap(),
        110
    );
    let shops = economy.shops().list_shops(&guild(), None).unwrap();
    assert_eq!(shops.len(), 1);
    let item = shops[0].items.values().next().unwrap();
    assert_eq!(item.stock, Stock::Limited(1));

    let stacks = economy
        .inventory()
        .inventory(&guild(), &"alice".into(), None)
        .unwrap();
    assert_eq!(stacks.len(), 1);
    assert_eq!(stacks[0].quantity, 3);

    // The check-in for today is already on record.
    let err = economy.checkin().claim(&member("alice"), None).unwrap_err();
    assert_eq!(err.kind(), guildvault::economy::ErrorKind::Conflict);

    let history = economy
        .ledger()
        .history(&guild(), Some(&"alice".into()), 10)
        .unwrap();
    let kinds: Vec<EntryKind> = history.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EntryKind::CheckIn, EntryKind::Purchase, EntryKind::Credit]
    );
}

#[test]
fn json_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    play_session(Arc::new(JsonFileStore::open(dir.path()).unwrap()));
    let users_file = format!("{}.json", safe_filename(GUILD));
    assert!(dir.path().join("users").join(users_file).exists());
    verify_session(Arc::new(JsonFileStore::open(dir.path()).unwrap()));
}

#[test]
fn sled_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sled");
    play_session(Arc::new(SledStore::open(&path).unwrap()));
    verify_session(Arc::new(SledStore::open(&path).unwrap()));
}

#[test]
fn config_selects_the_backend() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();

    config.storage.backend = StorageBackend::Json;
    play_session(config.open_store().unwrap());
    verify_session(config.open_store().unwrap());

    config.storage.backend = StorageBackend::Memory;
    let store = config.open_store().unwrap();
    assert!(store
        .load_collection(guildvault::storage::Collection::Users, GUILD)
        .unwrap()
        .is_none());
}
