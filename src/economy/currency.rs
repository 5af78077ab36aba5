use log::{debug, info};

use super::admin::require_admin;
use super::errors::EconomyError;
use super::types::{Caller, Currency, CurrencyId, GuildConfig, GuildId};
use super::Economy;
use crate::logutil::escape_log;
use crate::validation;

/// Per-guild currency definitions.
///
/// Deleting a currency does not cascade: balances, shop items and role bonuses that refer
/// to it are left in place.
pub struct CurrencyRegistry<'a> {
    economy: &'a Economy,
}

impl<'a> CurrencyRegistry<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    pub fn create(
        &self,
        caller: &Caller,
        id: &str,
        name: &str,
        symbol: Option<&str>,
        description: Option<&str>,
    ) -> Result<Currency, EconomyError> {
        let id = CurrencyId::parse(id)?;
        let name = validation::validate_name("currency name", name)?;
        let defaults = self.economy.config();
        let symbol = validation::validate_text("symbol", symbol)?
            .unwrap_or_else(|| defaults.default_currency_symbol.clone());
        let description = validation::validate_text("description", description)?
            .unwrap_or_else(|| defaults.default_currency_description.clone());

        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "create_currency")?;
            if txn.read::<GuildConfig>()?.currencies.contains_key(&id) {
                return Err(EconomyError::DuplicateId {
                    kind: "currency",
                    id: id.to_string(),
                });
            }
            let currency = Currency {
                id: id.clone(),
                name,
                symbol,
                description,
                created_at: txn.now(),
            };
            txn.write::<GuildConfig>()?
                .currencies
                .insert(id.clone(), currency.clone());
            info!(target: "security", "guild={} user={} created currency {} ({})", caller.guild, caller.user, id, escape_log(&currency.name));
            Ok(currency)
        })
    }

    /// Remove a currency and its check-in settings.
    pub fn delete(&self, caller: &Caller, id: &str) -> Result<Currency, EconomyError> {
        let id = CurrencyId::parse(id)?;
        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "delete_currency")?;
            txn.read::<GuildConfig>()?.currency(&id)?;
            let config = txn.write::<GuildConfig>()?;
            config.checkin_settings.remove(&id);
            let removed = config
                .currencies
                .remove(&id)
                .ok_or_else(|| EconomyError::CurrencyNotFound(id.clone()))?;
            info!(target: "security", "guild={} user={} deleted currency {}", caller.guild, caller.user, id);
            Ok(removed)
        })
    }

    pub fn get(&self, guild: &GuildId, id: &str) -> Result<Currency, EconomyError> {
        let id = CurrencyId::parse(id)?;
        self.economy
            .with_guild(guild, |txn| Ok(txn.read::<GuildConfig>()?.currency(&id)?.clone()))
    }

    /// All currencies, oldest first.
    pub fn list(&self, guild: &GuildId) -> Result<Vec<Currency>, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            let list: Vec<Currency> = txn
                .read::<GuildConfig>()?
                .currencies_in_order()
                .into_iter()
                .cloned()
                .collect();
            debug!("guild {} has {} currencies", guild, list.len());
            Ok(list)
        })
    }

    /// The first registered currency, used when a command names none.
    pub fn first(&self, guild: &GuildId) -> Result<Currency, EconomyError> {
        self.list(guild)?
            .into_iter()
            .next()
            .ok_or(EconomyError::NoCurrency)
    }
}
