//! User-owned shops and the purchase protocol.
//!
//! A purchase validates everything first (item, price, stock, currency, funds), then in
//! one commit decrements finite stock, debits the buyer and merges the units into the
//! buyer's inventory stack.

use log::{debug, info};

use super::errors::EconomyError;
use super::inventory::add_to_stack;
use super::ledger::{balance_in, burn, EntryKind};
use super::txn::{AccountBook, ShopBook};
use super::types::{
    Caller, CurrencyId, GuildConfig, GuildId, ItemFlag, ItemId, Shop, ShopId, ShopItem, ShopKey,
    Stock, UserId,
};
use super::Economy;
use crate::logutil::escape_log;
use crate::metrics;
use crate::validation;

const DEFAULT_CATEGORY: &str = "General";

/// Parameters for a new shop item. Flags default to `true`, stock to unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Owner-chosen slug; `item_{n}` is assigned when absent.
    pub id: Option<String>,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// `-1` for unlimited.
    pub stock: i64,
    pub usable: bool,
    pub resellable: bool,
    pub consumable: bool,
    pub use_description: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, price: i64, currency: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            currency: currency.into(),
            category: None,
            description: None,
            image_url: None,
            stock: -1,
            usable: true,
            resellable: true,
            consumable: true,
            use_description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub item: ItemId,
    pub name: String,
    pub quantity: u32,
    pub currency: CurrencyId,
    pub total_price: i64,
    pub balance: i64,
    pub stock: Stock,
    /// Units held in the buyer's stack after the purchase.
    pub owned: u32,
}

fn shop_mut<'s>(book: &'s mut ShopBook, key: &ShopKey) -> Result<&'s mut Shop, EconomyError> {
    book.0
        .get_mut(key)
        .ok_or_else(|| EconomyError::ShopNotFound(key.clone()))
}

fn require_owner(caller: &Caller, key: &ShopKey) -> Result<(), EconomyError> {
    if caller.user != key.owner {
        return Err(EconomyError::Forbidden(format!(
            "only the owner can manage shop '{}'",
            key.shop
        )));
    }
    Ok(())
}

fn item_mut<'s>(shop: &'s mut Shop, item: &ItemId) -> Result<&'s mut ShopItem, EconomyError> {
    shop.items
        .get_mut(item)
        .ok_or_else(|| EconomyError::ItemNotFound(item.to_string()))
}

pub struct ShopCatalog<'a> {
    economy: &'a Economy,
}

impl<'a> ShopCatalog<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    pub fn create_shop(
        &self,
        caller: &Caller,
        shop_id: &str,
        name: &str,
        description: Option<&str>,
        banner_url: Option<&str>,
    ) -> Result<Shop, EconomyError> {
        let key = ShopKey::new(caller.user.clone(), ShopId::parse(shop_id)?);
        let name = validation::validate_name("shop name", name)?;
        let description = validation::validate_text("description", description)?
            .unwrap_or_else(|| format!("{name}'s shop"));
        let banner_url = validation::validate_text("banner url", banner_url)?;
        let limit = self.economy.config().max_shops_per_owner;

        self.economy.with_guild(&caller.guild, |txn| {
            let book = txn.read::<ShopBook>()?;
            if book.0.contains_key(&key) {
                return Err(EconomyError::DuplicateId {
                    kind: "shop",
                    id: key.shop.to_string(),
                });
            }
            let owned = book.0.keys().filter(|k| k.owner == caller.user).count();
            if owned >= limit {
                return Err(EconomyError::LimitReached {
                    what: "shops per owner",
                    max: limit,
                });
            }

            let shop = Shop {
                key: key.clone(),
                name,
                description,
                banner_url,
                items: Default::default(),
                created_at: txn.now(),
            };
            txn.write::<ShopBook>()?.0.insert(key.clone(), shop.clone());
            info!(
                "guild={} user={} opened shop {} ({})",
                caller.guild,
                caller.user,
                key.shop,
                escape_log(&shop.name)
            );
            Ok(shop)
        })
    }

    pub fn add_item(
        &self,
        caller: &Caller,
        shop: &ShopKey,
        item: NewItem,
    ) -> Result<ShopItem, EconomyError> {
        require_owner(caller, shop)?;
        let explicit_id = item.id.as_deref().map(ItemId::parse).transpose()?;
        let currency = CurrencyId::parse(&item.currency)?;
        let name = validation::validate_name("item name", &item.name)?;
        let price = validation::validate_non_negative("price", item.price)?;
        let stock = Stock::try_from(item.stock)?;
        let category = validation::validate_text("category", item.category.as_deref())?
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let description = validation::validate_text("description", item.description.as_deref())?
            .unwrap_or_default();
        let image_url = validation::validate_text("image url", item.image_url.as_deref())?;
        let use_description =
            validation::validate_text("use description", item.use_description.as_deref())?;
        let limit = self.economy.config().max_items_per_shop;

        self.economy.with_guild(&caller.guild, |txn| {
            txn.read::<GuildConfig>()?.currency(&currency)?;
            let now = txn.now();
            let target = shop_mut(txn.write::<ShopBook>()?, shop)?;
            if target.items.len() >= limit {
                return Err(EconomyError::LimitReached {
                    what: "items per shop",
                    max: limit,
                });
            }

            let id = match explicit_id {
                Some(id) if target.items.contains_key(&id) => {
                    return Err(EconomyError::DuplicateId {
                        kind: "item",
                        id: id.to_string(),
                    })
                }
                Some(id) => id,
                None => {
                    let mut n = target.items.len() + 1;
                    while target.items.contains_key(&ItemId::sequential(n)) {
                        n += 1;
                    }
                    ItemId::sequential(n)
                }
            };

            let created = ShopItem {
                id: id.clone(),
                name,
                price,
                currency,
                category,
                description,
                image_url,
                stock,
                usable: item.usable,
                resellable: item.resellable,
                consumable: item.consumable,
                use_description,
                created_at: now,
            };
            target.items.insert(id.clone(), created.clone());
            info!(
                "guild={} shop {} added item {} ({}) price {} {} stock {}",
                caller.guild,
                shop,
                id,
                escape_log(&created.name),
                created.price,
                created.currency,
                created.stock
            );
            Ok(created)
        })
    }

    /// Buy `quantity` units of `item` from `shop` for the caller.
    pub fn purchase(
        &self,
        caller: &Caller,
        shop: &ShopKey,
        item: &str,
        quantity: u32,
    ) -> Result<PurchaseReceipt, EconomyError> {
        let item_id = ItemId::parse(item)?;
        if quantity == 0 {
            return Err(validation::ValidationError::NotPositive {
                field: "quantity",
                value: 0,
            }
            .into());
        }

        let receipt = self.economy.with_guild(&caller.guild, |txn| {
            let listed = txn
                .read::<ShopBook>()?
                .0
                .get(shop)
                .ok_or_else(|| EconomyError::ShopNotFound(shop.clone()))?
                .items
                .get(&item_id)
                .cloned()
                .ok_or_else(|| EconomyError::ItemNotFound(item_id.to_string()))?;

            if !listed.is_purchasable() {
                return Err(EconomyError::NotPurchasable(item_id.clone()));
            }
            if let Stock::Limited(remaining) = listed.stock {
                if remaining < quantity {
                    return Err(EconomyError::InsufficientStock {
                        item: item_id.clone(),
                        requested: quantity,
                        remaining,
                    });
                }
            }
            let total_price = listed
                .price
                .checked_mul(i64::from(quantity))
                .ok_or(EconomyError::Overflow)?;
            txn.read::<GuildConfig>()?.currency(&listed.currency)?;
            let available = balance_in(txn, &caller.user, &listed.currency)?;
            if available < total_price {
                return Err(EconomyError::InsufficientFunds {
                    currency: listed.currency.clone(),
                    needed: total_price,
                    available,
                });
            }

            // Every precondition holds; apply all effects.
            let stock = match listed.stock {
                Stock::Unlimited => Stock::Unlimited,
                Stock::Limited(remaining) => Stock::Limited(remaining - quantity),
            };
            let book = txn.write::<ShopBook>()?;
            item_mut(shop_mut(book, shop)?, &item_id)?.stock = stock;

            let balance = burn(
                txn,
                &caller.user,
                &listed.currency,
                total_price,
                EntryKind::Purchase,
                Some(format!("{} x{} from {}", item_id, quantity, shop)),
            )?;

            let now = txn.now();
            let account = txn
                .write::<AccountBook>()?
                .0
                .entry(caller.user.clone())
                .or_default();
            let owned = add_to_stack(account, shop, &listed, quantity, now)?;

            info!(
                "guild={} user={} bought {} x{} from {} for {} {}",
                caller.guild, caller.user, item_id, quantity, shop, total_price, listed.currency
            );
            Ok(PurchaseReceipt {
                item: item_id.clone(),
                name: listed.name.clone(),
                quantity,
                currency: listed.currency.clone(),
                total_price,
                balance,
                stock,
                owned,
            })
        })?;
        metrics::inc_purchase(quantity);
        Ok(receipt)
    }

    /// Add `amount` units to a finite stock.
    pub fn restock(
        &self,
        caller: &Caller,
        shop: &ShopKey,
        item: &str,
        amount: u32,
    ) -> Result<Stock, EconomyError> {
        require_owner(caller, shop)?;
        let item_id = ItemId::parse(item)?;
        if amount == 0 {
            return Err(validation::ValidationError::NotPositive {
                field: "amount",
                value: 0,
            }
            .into());
        }
        self.economy.with_guild(&caller.guild, |txn| {
            let target = item_mut(shop_mut(txn.write::<ShopBook>()?, shop)?, &item_id)?;
            let stock = match target.stock {
                Stock::Unlimited => return Err(EconomyError::UnlimitedStock(item_id.clone())),
                Stock::Limited(n) => Stock::Limited(n.checked_add(amount).ok_or(EconomyError::Overflow)?),
            };
            target.stock = stock;
            info!("guild={} shop {} restocked {} to {}", caller.guild, shop, item_id, stock);
            Ok(stock)
        })
    }

    /// Flip one of an item's flags; returns the new value.
    pub fn toggle_flag(
        &self,
        caller: &Caller,
        shop: &ShopKey,
        item: &str,
        flag: ItemFlag,
    ) -> Result<bool, EconomyError> {
        require_owner(caller, shop)?;
        let item_id = ItemId::parse(item)?;
        self.economy.with_guild(&caller.guild, |txn| {
            let target = item_mut(shop_mut(txn.write::<ShopBook>()?, shop)?, &item_id)?;
            let value = target.flag_mut(flag);
            *value = !*value;
            let value = *value;
            info!("guild={} shop {} item {} {:?} -> {}", caller.guild, shop, item_id, flag, value);
            Ok(value)
        })
    }

    /// Set or clear (`None`/blank) the text shown when the item is used.
    pub fn set_use_description(
        &self,
        caller: &Caller,
        shop: &ShopKey,
        item: &str,
        text: Option<&str>,
    ) -> Result<ShopItem, EconomyError> {
        require_owner(caller, shop)?;
        let item_id = ItemId::parse(item)?;
        let text = validation::validate_text("use description", text)?;
        self.economy.with_guild(&caller.guild, |txn| {
            let target = item_mut(shop_mut(txn.write::<ShopBook>()?, shop)?, &item_id)?;
            target.use_description = text;
            Ok(target.clone())
        })
    }

    /// Shops in the guild, optionally only those of `owner`.
    pub fn list_shops(
        &self,
        guild: &GuildId,
        owner: Option<&UserId>,
    ) -> Result<Vec<Shop>, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            let shops: Vec<Shop> = txn
                .read::<ShopBook>()?
                .0
                .values()
                .filter(|shop| owner.map_or(true, |o| &shop.key.owner == o))
                .cloned()
                .collect();
            debug!("guild={} listing {} shop(s)", guild, shops.len());
            Ok(shops)
        })
    }

    pub fn shop(&self, guild: &GuildId, key: &ShopKey) -> Result<Shop, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            txn.read::<ShopBook>()?
                .0
                .get(key)
                .cloned()
                .ok_or_else(|| EconomyError::ShopNotFound(key.clone()))
        })
    }

    pub fn list_items(
        &self,
        guild: &GuildId,
        key: &ShopKey,
        category: Option<&str>,
    ) -> Result<Vec<ShopItem>, EconomyError> {
        let shop = self.shop(guild, key)?;
        Ok(shop
            .items
            .into_values()
            .filter(|item| category.map_or(true, |c| item.category.eq_ignore_ascii_case(c)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::economy::{ErrorKind, StackKey};

    fn setup() -> (Economy, ShopKey) {
        let (economy, _) = with_gold();
        let shop = economy
            .shops()
            .create_shop(&member("owner"), "s1", "Armory", None, None)
            .unwrap();
        (economy, shop.key)
    }

    fn sword(stock: i64) -> NewItem {
        let mut item = NewItem::new("Sword", 10, "gold");
        item.id = Some("sword".into());
        item.category = Some("Weapons".into());
        item.stock = stock;
        item
    }

    fn state(economy: &Economy, shop: &ShopKey, buyer: &str) -> (i64, Stock, usize) {
        let balance = economy
            .ledger()
            .balance(&guild(), &buyer.into(), "gold")
            .unwrap();
        let stock = economy.shops().shop(&guild(), shop).unwrap().items
            [&ItemId::parse("sword").unwrap()]
            .stock;
        let stacks = economy
            .inventory()
            .inventory(&guild(), &buyer.into(), None)
            .unwrap()
            .len();
        (balance, stock, stacks)
    }

    #[test]
    fn shop_ids_are_unique_per_owner() {
        let (economy, _) = setup();
        let err = economy
            .shops()
            .create_shop(&member("owner"), "s1", "Again", None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        // Another owner may reuse the id.
        economy
            .shops()
            .create_shop(&member("other"), "s1", "Mine", None, None)
            .unwrap();
        assert_eq!(economy.shops().list_shops(&guild(), None).unwrap().len(), 2);
        assert_eq!(
            economy
                .shops()
                .list_shops(&guild(), Some(&"other".into()))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn shop_limit_per_owner() {
        let (economy, _) = with_gold();
        let limit = economy.config().max_shops_per_owner;
        for n in 0..limit {
            economy
                .shops()
                .create_shop(&member("owner"), &format!("s{n}"), "Shop", None, None)
                .unwrap();
        }
        let err = economy
            .shops()
            .create_shop(&member("owner"), "extra", "Shop", None, None)
            .unwrap_err();
        assert!(matches!(err, EconomyError::LimitReached { .. }));
    }

    #[test]
    fn auto_ids_are_sequential_and_flags_default_true() {
        let (economy, shop) = setup();
        let owner = member("owner");
        let first = economy
            .shops()
            .add_item(&owner, &shop, NewItem::new("Apple", 1, "gold"))
            .unwrap();
        let second = economy
            .shops()
            .add_item(&owner, &shop, NewItem::new("Pear", 1, "gold"))
            .unwrap();
        assert_eq!(first.id.as_str(), "item_1");
        assert_eq!(second.id.as_str(), "item_2");
        assert!(first.usable && first.resellable && first.consumable);
        assert_eq!(first.category, "General");
        assert!(first.stock.is_unlimited());
    }

    #[test]
    fn add_item_validation() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(2)).unwrap();

        let err = economy.shops().add_item(&owner, &shop, sword(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut unknown = NewItem::new("Gem", 1, "silver");
        unknown.id = Some("gem".into());
        let err = economy.shops().add_item(&owner, &shop, unknown).unwrap_err();
        assert!(matches!(err, EconomyError::CurrencyNotFound(_)));

        let mut bad_stock = NewItem::new("Gem", 1, "gold");
        bad_stock.stock = -2;
        let err = economy.shops().add_item(&owner, &shop, bad_stock).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = economy
            .shops()
            .add_item(&member("stranger"), &shop, NewItem::new("Gem", 1, "gold"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn gold_and_sword_scenario() {
        let (economy, shop) = setup();
        economy
            .shops()
            .add_item(&member("owner"), &shop, sword(2))
            .unwrap();
        economy
            .ledger()
            .credit(&guild(), &"buyer".into(), "gold", 25)
            .unwrap();

        let receipt = economy
            .shops()
            .purchase(&member("buyer"), &shop, "sword", 1)
            .unwrap();
        assert_eq!(receipt.balance, 15);
        assert_eq!(receipt.stock, Stock::Limited(1));
        assert_eq!(receipt.owned, 1);
        assert_eq!(state(&economy, &shop, "buyer"), (15, Stock::Limited(1), 1));

        let err = economy
            .shops()
            .purchase(&member("buyer"), &shop, "sword", 2)
            .unwrap_err();
        assert!(matches!(
            err,
            EconomyError::InsufficientStock {
                requested: 2,
                remaining: 1,
                ..
            }
        ));
        assert_eq!(state(&economy, &shop, "buyer"), (15, Stock::Limited(1), 1));
    }

    #[test]
    fn failed_purchases_change_nothing() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(5)).unwrap();
        let mut relic = NewItem::new("Relic", 0, "gold");
        relic.id = Some("relic".into());
        economy.shops().add_item(&owner, &shop, relic).unwrap();
        economy
            .ledger()
            .credit(&guild(), &"buyer".into(), "gold", 15)
            .unwrap();
        let before = state(&economy, &shop, "buyer");

        let buyer = member("buyer");
        let funds = economy.shops().purchase(&buyer, &shop, "sword", 2).unwrap_err();
        assert_eq!(funds.kind(), ErrorKind::InsufficientFunds);
        let display = economy.shops().purchase(&buyer, &shop, "relic", 1).unwrap_err();
        assert_eq!(display.kind(), ErrorKind::FlagGated);
        let missing = economy.shops().purchase(&buyer, &shop, "axe", 1).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        let zero = economy.shops().purchase(&buyer, &shop, "sword", 0).unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::Validation);

        assert_eq!(state(&economy, &shop, "buyer"), before);
    }

    #[test]
    fn purchase_with_deleted_currency_fails() {
        let (economy, shop) = setup();
        economy
            .shops()
            .add_item(&member("owner"), &shop, sword(-1))
            .unwrap();
        economy
            .ledger()
            .credit(&guild(), &"buyer".into(), "gold", 50)
            .unwrap();
        economy.currencies().delete(&admin(), "gold").unwrap();
        let err = economy
            .shops()
            .purchase(&member("buyer"), &shop, "sword", 1)
            .unwrap_err();
        assert!(matches!(err, EconomyError::CurrencyNotFound(_)));
    }

    #[test]
    fn repeat_purchase_keeps_first_snapshot() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(-1)).unwrap();
        economy
            .ledger()
            .credit(&guild(), &"buyer".into(), "gold", 100)
            .unwrap();
        economy
            .shops()
            .purchase(&member("buyer"), &shop, "sword", 1)
            .unwrap();
        economy
            .shops()
            .toggle_flag(&owner, &shop, "sword", ItemFlag::Usable)
            .unwrap();
        let receipt = economy
            .shops()
            .purchase(&member("buyer"), &shop, "sword", 2)
            .unwrap();
        assert_eq!(receipt.owned, 3);
        assert!(receipt.stock.is_unlimited());

        let key = StackKey::new(shop.clone(), ItemId::parse("sword").unwrap());
        let stack = economy
            .inventory()
            .stack(&guild(), &"buyer".into(), &key)
            .unwrap();
        assert!(stack.snapshot.usable);
    }

    #[test]
    fn restock_rules() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(1)).unwrap();
        let mut staff = sword(-1);
        staff.id = Some("staff".into());
        economy.shops().add_item(&owner, &shop, staff).unwrap();

        assert_eq!(
            economy.shops().restock(&owner, &shop, "sword", 4).unwrap(),
            Stock::Limited(5)
        );
        let err = economy.shops().restock(&owner, &shop, "staff", 4).unwrap_err();
        assert!(matches!(err, EconomyError::UnlimitedStock(_)));
        let staff = economy.shops().shop(&guild(), &shop).unwrap().items
            [&ItemId::parse("staff").unwrap()]
            .stock;
        assert_eq!(staff, Stock::Unlimited);

        let err = economy.shops().restock(&owner, &shop, "bow", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn only_owner_toggles_flags() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(1)).unwrap();
        let err = economy
            .shops()
            .toggle_flag(&member("mallory"), &shop, "sword", ItemFlag::Resellable)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(!economy
            .shops()
            .toggle_flag(&owner, &shop, "sword", ItemFlag::Resellable)
            .unwrap());
        assert!(economy
            .shops()
            .toggle_flag(&owner, &shop, "sword", ItemFlag::Resellable)
            .unwrap());
    }

    #[test]
    fn list_items_by_category() {
        let (economy, shop) = setup();
        let owner = member("owner");
        economy.shops().add_item(&owner, &shop, sword(1)).unwrap();
        economy
            .shops()
            .add_item(&owner, &shop, NewItem::new("Bread", 2, "gold"))
            .unwrap();
        let weapons = economy
            .shops()
            .list_items(&guild(), &shop, Some("weapons"))
            .unwrap();
        assert_eq!(weapons.len(), 1);
        assert_eq!(weapons[0].name, "Sword");
        assert_eq!(economy.shops().list_items(&guild(), &shop, None).unwrap().len(), 2);
    }
}
