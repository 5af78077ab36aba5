use chrono::{DateTime, Utc};
use log::{debug, info};

use super::errors::EconomyError;
use super::txn::AccountBook;
use super::types::{Caller, GuildId, ItemStack, ShopItem, ShopKey, StackKey, UserAccount, UserId};
use super::Economy;
use crate::logutil::escape_log;
use crate::metrics;

impl ItemStack {
    pub fn key(&self) -> StackKey {
        StackKey::new(self.source.clone(), self.item_id.clone())
    }

    pub fn category(&self) -> &str {
        &self.snapshot.category
    }
}

/// Result of using an inventory item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseOutcome {
    pub name: String,
    /// `use_description` of the owned snapshot, falling back to its description.
    pub effect: String,
    pub image_url: Option<String>,
    pub consumed: bool,
    /// Quantity left in the stack; zero means the stack was removed.
    pub remaining: u32,
}

/// Merge `quantity` units of `item` into the account's stack for it.
///
/// A new stack captures a snapshot of the item definition. An existing stack only grows:
/// its snapshot stays as first captured.
pub(crate) fn add_to_stack(
    account: &mut UserAccount,
    shop: &ShopKey,
    item: &ShopItem,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<u32, EconomyError> {
    let key = StackKey::new(shop.clone(), item.id.clone());
    let stack = account.inventory.entry(key).or_insert_with(|| ItemStack {
        item_id: item.id.clone(),
        name: item.name.clone(),
        quantity: 0,
        source: shop.clone(),
        snapshot: item.clone(),
        acquired_at: now,
    });
    stack.quantity = stack
        .quantity
        .checked_add(quantity)
        .ok_or(EconomyError::Overflow)?;
    Ok(stack.quantity)
}

pub struct InventoryManager<'a> {
    economy: &'a Economy,
}

impl<'a> InventoryManager<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    /// Owned stacks, optionally restricted to one snapshot category.
    pub fn inventory(
        &self,
        guild: &GuildId,
        user: &UserId,
        category: Option<&str>,
    ) -> Result<Vec<ItemStack>, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            let stacks: Vec<ItemStack> = txn
                .read::<AccountBook>()?
                .0
                .get(user)
                .map(|account| {
                    account
                        .inventory
                        .values()
                        .filter(|stack| stack.quantity > 0)
                        .filter(|stack| category.map_or(true, |c| stack.category().eq_ignore_ascii_case(c)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            debug!("guild={} user={} holds {} stack(s)", guild, user, stacks.len());
            Ok(stacks)
        })
    }

    pub fn stack(
        &self,
        guild: &GuildId,
        user: &UserId,
        key: &StackKey,
    ) -> Result<ItemStack, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            txn.read::<AccountBook>()?
                .0
                .get(user)
                .and_then(|account| account.inventory.get(key))
                .cloned()
                .ok_or_else(|| EconomyError::StackNotFound(key.clone()))
        })
    }

    /// Use one unit of a stack. Consumable items are decremented and the stack is removed
    /// when it runs out; other usable items stay as they are.
    pub fn use_item(&self, caller: &Caller, key: &StackKey) -> Result<UseOutcome, EconomyError> {
        let outcome = self.economy.with_guild(&caller.guild, |txn| {
            let stack = txn
                .read::<AccountBook>()?
                .0
                .get(&caller.user)
                .and_then(|account| account.inventory.get(key))
                .filter(|stack| stack.quantity > 0)
                .cloned()
                .ok_or_else(|| EconomyError::StackNotFound(key.clone()))?;
            if !stack.snapshot.usable {
                return Err(EconomyError::NotUsable(stack.name.clone()));
            }

            let consumed = stack.snapshot.consumable;
            let mut remaining = stack.quantity;
            if consumed {
                remaining -= 1;
                let account = txn
                    .write::<AccountBook>()?
                    .0
                    .entry(caller.user.clone())
                    .or_default();
                if remaining == 0 {
                    account.inventory.remove(key);
                } else if let Some(owned) = account.inventory.get_mut(key) {
                    owned.quantity = remaining;
                }
            }

            info!(
                "guild={} user={} used {} (consumed: {}, remaining: {})",
                caller.guild,
                caller.user,
                escape_log(&stack.name),
                consumed,
                remaining
            );
            Ok(UseOutcome {
                name: stack.name.clone(),
                effect: stack.snapshot.effect_text().to_string(),
                image_url: stack.snapshot.image_url.clone(),
                consumed,
                remaining,
            })
        })?;
        metrics::inc_item_used();
        Ok(outcome)
    }
}
