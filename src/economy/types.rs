//! Records and identifiers shared by every economy component.
//!
//! Platform identities (guild, user, role) are opaque strings. Economy-owned identifiers
//! (currency, shop, item) are slugs and can only be built through `parse`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::EconomyError;
use super::keyed;
use crate::validation::{self, ValidationError};

macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

macro_rules! slug_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate `raw` against the slug rule.
            pub fn parse(raw: &str) -> Result<Self, EconomyError> {
                validation::validate_slug(raw)
                    .map(Self)
                    .map_err(|_| EconomyError::InvalidId {
                        kind: $kind,
                        value: raw.to_string(),
                    })
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

platform_id!(
    /// Community/tenant scope.
    GuildId
);
platform_id!(UserId);
platform_id!(RoleId);

slug_id!(CurrencyId, "currency");
slug_id!(ShopId, "shop");
slug_id!(ItemId, "item");

impl ItemId {
    /// Sequential id handed out when the owner does not choose one.
    pub(crate) fn sequential(n: usize) -> Self {
        Self(format!("item_{n}"))
    }
}

/// A platform role as the Command Layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
}

impl RoleRef {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identity of whoever invoked an operation, resolved by the Command Layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub guild: GuildId,
    pub user: UserId,
    /// Whether the platform itself grants this user administrator rights.
    pub platform_admin: bool,
    pub roles: Vec<RoleRef>,
}

impl Caller {
    pub fn new(guild: impl Into<GuildId>, user: impl Into<UserId>) -> Self {
        Self {
            guild: guild.into(),
            user: user.into(),
            platform_admin: false,
            roles: Vec::new(),
        }
    }

    pub fn platform_admin(mut self) -> Self {
        self.platform_admin = true;
        self
    }

    pub fn with_role(mut self, role: RoleRef) -> Self {
        self.roles.push(role);
        self
    }
}

// ============================================================================
// Composite keys
// ============================================================================

/// A shop within a guild: owners choose their own shop ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShopKey {
    pub owner: UserId,
    pub shop: ShopId,
}

impl ShopKey {
    pub fn new(owner: impl Into<UserId>, shop: ShopId) -> Self {
        Self {
            owner: owner.into(),
            shop,
        }
    }
}

impl fmt::Display for ShopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.shop)
    }
}

/// Identifies one inventory stack: the shop item it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackKey {
    pub shop: ShopKey,
    pub item: ItemId,
}

impl StackKey {
    pub fn new(shop: ShopKey, item: ItemId) -> Self {
        Self { shop, item }
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shop, self.item)
    }
}

/// One check-in streak per user and currency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckinKey {
    pub user: UserId,
    pub currency: CurrencyId,
}

// ============================================================================
// Guild configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Daily bonuses a platform role adds to check-in rewards, per currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIncome {
    pub role_id: RoleId,
    /// Cached display name, refreshed on every write.
    pub role_name: String,
    #[serde(default)]
    pub currencies: BTreeMap<CurrencyId, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinSettings {
    pub base_amount: i64,
    pub success_message: String,
    pub already_claimed_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default)]
    pub currencies: BTreeMap<CurrencyId, Currency>,
    #[serde(default)]
    pub income_roles: BTreeMap<RoleId, RoleIncome>,
    #[serde(default)]
    pub checkin_settings: BTreeMap<CurrencyId, CheckinSettings>,
    #[serde(default)]
    pub bot_admins: BTreeSet<UserId>,
}

impl GuildConfig {
    /// Currencies in registration order (oldest first, ties broken by id).
    pub fn currencies_in_order(&self) -> Vec<&Currency> {
        let mut list: Vec<&Currency> = self.currencies.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub(crate) fn currency(&self, id: &CurrencyId) -> Result<&Currency, EconomyError> {
        self.currencies
            .get(id)
            .ok_or_else(|| EconomyError::CurrencyNotFound(id.clone()))
    }
}

// ============================================================================
// Shops
// ============================================================================

/// Shop stock: unlimited, or a finite count that purchases draw down.
///
/// Stored as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Stock {
    Unlimited,
    Limited(u32),
}

impl Stock {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Stock::Unlimited)
    }

    /// Whether `quantity` units can be taken right now.
    pub fn covers(self, quantity: u32) -> bool {
        match self {
            Stock::Unlimited => true,
            Stock::Limited(remaining) => remaining >= quantity,
        }
    }
}

impl TryFrom<i64> for Stock {
    type Error = ValidationError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Stock::Unlimited),
            n if n >= 0 && n <= i64::from(u32::MAX) => Ok(Stock::Limited(n as u32)),
            value => Err(ValidationError::InvalidStock { value }),
        }
    }
}

impl From<Stock> for i64 {
    fn from(stock: Stock) -> Self {
        match stock {
            Stock::Unlimited => -1,
            Stock::Limited(n) => i64::from(n),
        }
    }
}

impl fmt::Display for Stock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stock::Unlimited => f.write_str("unlimited"),
            Stock::Limited(n) => write!(f, "{n}"),
        }
    }
}

/// The boolean switches an owner can flip on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFlag {
    Usable,
    Resellable,
    Consumable,
}

impl std::str::FromStr for ItemFlag {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usable" => Ok(ItemFlag::Usable),
            "resellable" => Ok(ItemFlag::Resellable),
            "consumable" => Ok(ItemFlag::Consumable),
            other => Err(EconomyError::InvalidId {
                kind: "flag",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: ItemId,
    pub name: String,
    /// Zero marks a display-only item that cannot be bought.
    pub price: i64,
    pub currency: CurrencyId,
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub stock: Stock,
    pub usable: bool,
    pub resellable: bool,
    pub consumable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ShopItem {
    pub fn is_purchasable(&self) -> bool {
        self.price > 0
    }

    pub fn flag(&self, flag: ItemFlag) -> bool {
        match flag {
            ItemFlag::Usable => self.usable,
            ItemFlag::Resellable => self.resellable,
            ItemFlag::Consumable => self.consumable,
        }
    }

    pub(crate) fn flag_mut(&mut self, flag: ItemFlag) -> &mut bool {
        match flag {
            ItemFlag::Usable => &mut self.usable,
            ItemFlag::Resellable => &mut self.resellable,
            ItemFlag::Consumable => &mut self.consumable,
        }
    }

    /// Text shown when the item is used.
    pub fn effect_text(&self) -> &str {
        self.use_description
            .as_deref()
            .unwrap_or(self.description.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub key: ShopKey,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<ItemId, ShopItem>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Accounts and inventory
// ============================================================================

/// A quantity-bearing holding of one shop item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: ItemId,
    /// Item name at the time the stack was created.
    pub name: String,
    pub quantity: u32,
    pub source: ShopKey,
    /// Copy of the item definition taken when the stack was created.
    pub snapshot: ShopItem,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(default)]
    pub balances: BTreeMap<CurrencyId, i64>,
    #[serde(default, with = "keyed")]
    pub inventory: BTreeMap<StackKey, ItemStack>,
}

impl UserAccount {
    pub fn balance(&self, currency: &CurrencyId) -> i64 {
        self.balances.get(currency).copied().unwrap_or(0)
    }
}

// ============================================================================
// Check-ins and characters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub last_claimed: NaiveDate,
    pub streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub hp: u32,
    pub max_hp: u32,
    pub mp: u32,
    pub max_mp: u32,
    pub attack: u32,
    pub defense: u32,
    /// Cached; always re-derived from `exp` on write and on view.
    pub level: u32,
    pub exp: u64,
    pub created_at: DateTime<Utc>,
}
