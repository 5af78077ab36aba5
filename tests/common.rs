//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use guildvault::config::EconomyConfig;
use guildvault::economy::{Caller, Economy, FixedClock, GuildId, NewItem, ShopKey};
use guildvault::storage::{MemoryStore, PersistenceProvider};

pub const GUILD: &str = "guild-int";

pub fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(n)
}

pub fn guild() -> GuildId {
    GuildId::new(GUILD)
}

pub fn admin() -> Caller {
    Caller::new(GUILD, "admin").platform_admin()
}

pub fn member(user: &str) -> Caller {
    Caller::new(GUILD, user)
}

/// In-memory economy on a clock pinned to `day(0)`.
pub fn memory_economy() -> (Economy, Arc<FixedClock>) {
    economy_on(Arc::new(MemoryStore::new()))
}

pub fn economy_on(store: Arc<dyn PersistenceProvider>) -> (Economy, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(day(0)));
    let economy = Economy::with_clock(store, EconomyConfig::default(), clock.clone());
    (economy, clock)
}

/// Creates the `gold` currency.
pub fn with_gold(economy: &Economy) {
    economy
        .currencies()
        .create(&admin(), "gold", "Gold", Some("G"), None)
        .unwrap();
}

/// Opens `owner`'s `armory` shop with one item and returns its key and item id.
pub fn armory(economy: &Economy, owner: &str, item: NewItem) -> (ShopKey, String) {
    let shop = economy
        .shops()
        .create_shop(&member(owner), "armory", "Armory", None, None)
        .unwrap();
    let created = economy
        .shops()
        .add_item(&member(owner), &shop.key, item)
        .unwrap();
    (shop.key, created.id.as_str().to_string())
}
