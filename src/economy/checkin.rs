//! Daily check-in rewards with streaks.
//!
//! Per (user, currency) a record moves from never-claimed to `Claimed(date, streak)`.
//! Claiming the day after the last claim extends the streak; any other gap, including a
//! record dated in the future, restarts it at 1. Calendar days come from the [`Clock`].
//!
//! [`Clock`]: super::Clock

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::info;

use super::admin::require_admin;
use super::errors::EconomyError;
use super::ledger::{mint, EntryKind};
use super::txn::{CheckinBook, GuildTxn};
use super::types::{
    Caller, CheckinKey, CheckinRecord, CheckinSettings, Currency, CurrencyId, GuildConfig, GuildId,
    RoleId, UserId,
};
use super::Economy;
use crate::config::EconomyConfig;
use crate::metrics;
use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBonus {
    pub role_id: RoleId,
    pub role_name: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinReceipt {
    pub currency: CurrencyId,
    pub symbol: String,
    pub base: i64,
    pub bonuses: Vec<RoleBonus>,
    pub total: i64,
    pub streak: u32,
    pub balance: i64,
    /// Configured success message with placeholders filled in.
    pub message: String,
    pub background_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinStatus {
    pub currency: CurrencyId,
    pub last_claimed: Option<NaiveDate>,
    pub streak: u32,
    pub claimed_today: bool,
    /// Whether claiming today would extend the streak rather than restart it.
    pub streak_alive: bool,
}

/// Partial update for a currency's check-in settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinSettingsUpdate {
    pub base_amount: Option<i64>,
    pub success_message: Option<String>,
    pub already_claimed_message: Option<String>,
    /// `Some(None)` clears the background image.
    pub background_image_url: Option<Option<String>>,
}

fn default_settings(config: &EconomyConfig) -> CheckinSettings {
    CheckinSettings {
        base_amount: config.default_checkin_amount,
        success_message: config.checkin_success_message.clone(),
        already_claimed_message: config.checkin_already_claimed_message.clone(),
        background_image_url: None,
    }
}

/// Fill `{amount}`, `{streak}`, `{symbol}` and `{currency}` in a message template.
pub(crate) fn render(template: &str, amount: i64, streak: u32, currency: &Currency) -> String {
    template
        .replace("{amount}", &amount.to_string())
        .replace("{streak}", &streak.to_string())
        .replace("{symbol}", &currency.symbol)
        .replace("{currency}", &currency.name)
}

/// The streak a claim on `today` produces after `previous`.
fn next_streak(previous: Option<&CheckinRecord>, today: NaiveDate) -> u32 {
    match previous {
        Some(record) if record.last_claimed.succ_opt() == Some(today) => {
            record.streak.saturating_add(1)
        }
        _ => 1,
    }
}

pub struct CheckInEngine<'a> {
    economy: &'a Economy,
}

impl<'a> CheckInEngine<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    /// Resolve the explicit currency, or the guild's first one when `None`.
    fn resolve(
        txn: &mut GuildTxn<'_>,
        currency: Option<&CurrencyId>,
    ) -> Result<Currency, EconomyError> {
        let config = txn.read::<GuildConfig>()?;
        match currency {
            Some(id) => config.currency(id).cloned(),
            None => config
                .currencies_in_order()
                .first()
                .map(|c| (*c).clone())
                .ok_or(EconomyError::NoCurrency),
        }
    }

    fn effective_settings(&self, txn: &mut GuildTxn<'_>, currency: &CurrencyId) -> Result<CheckinSettings, EconomyError> {
        Ok(txn
            .read::<GuildConfig>()?
            .checkin_settings
            .get(currency)
            .cloned()
            .unwrap_or_else(|| default_settings(self.economy.config())))
    }

    /// Claim today's reward: the configured base plus the bonus of every caller role
    /// that has one for this currency.
    pub fn claim(&self, caller: &Caller, currency: Option<&str>) -> Result<CheckinReceipt, EconomyError> {
        let requested = currency.map(CurrencyId::parse).transpose()?;
        let today = self.economy.clock().today();

        let receipt = self.economy.with_guild(&caller.guild, |txn| {
            let currency = Self::resolve(txn, requested.as_ref())?;
            let settings = self.effective_settings(txn, &currency.id)?;
            let key = CheckinKey {
                user: caller.user.clone(),
                currency: currency.id.clone(),
            };
            let previous = txn.read::<CheckinBook>()?.0.get(&key).copied();

            if let Some(record) = previous.filter(|r| r.last_claimed == today) {
                return Err(EconomyError::AlreadyClaimed {
                    streak: record.streak,
                    message: render(&settings.already_claimed_message, 0, record.streak, &currency),
                });
            }

            // A role listed twice still pays once.
            let mut seen: BTreeSet<&RoleId> = BTreeSet::new();
            let income = &txn.read::<GuildConfig>()?.income_roles;
            let bonuses: Vec<RoleBonus> = caller
                .roles
                .iter()
                .filter(|role| seen.insert(&role.id))
                .filter_map(|role| {
                    let amount = *income.get(&role.id)?.currencies.get(&currency.id)?;
                    (amount > 0).then(|| RoleBonus {
                        role_id: role.id.clone(),
                        role_name: role.name.clone(),
                        amount,
                    })
                })
                .collect();

            let total = bonuses
                .iter()
                .try_fold(settings.base_amount, |sum, bonus| sum.checked_add(bonus.amount))
                .ok_or(EconomyError::Overflow)?;
            let streak = next_streak(previous.as_ref(), today);

            let balance = if total > 0 {
                mint(
                    txn,
                    &caller.user,
                    &currency.id,
                    total,
                    EntryKind::CheckIn,
                    Some(format!("streak {streak}")),
                )?
            } else {
                super::ledger::balance_in(txn, &caller.user, &currency.id)?
            };
            txn.write::<CheckinBook>()?.0.insert(
                key,
                CheckinRecord {
                    last_claimed: today,
                    streak,
                },
            );

            info!(
                "guild={} user={} checked in for {} {} (base {}, {} bonus role(s), streak {})",
                caller.guild,
                caller.user,
                total,
                currency.id,
                settings.base_amount,
                bonuses.len(),
                streak
            );
            Ok(CheckinReceipt {
                message: render(&settings.success_message, total, streak, &currency),
                currency: currency.id.clone(),
                symbol: currency.symbol.clone(),
                base: settings.base_amount,
                bonuses,
                total,
                streak,
                balance,
                background_image_url: settings.background_image_url.clone(),
            })
        })?;
        metrics::inc_checkin();
        Ok(receipt)
    }

    /// Read-only view of a user's streak in `currency`.
    pub fn status(&self, guild: &GuildId, user: &UserId, currency: &str) -> Result<CheckinStatus, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let today = self.economy.clock().today();
        self.economy.with_guild(guild, |txn| {
            let key = CheckinKey {
                user: user.clone(),
                currency: currency.clone(),
            };
            let record = txn.read::<CheckinBook>()?.0.get(&key).copied();
            let claimed_today = record.is_some_and(|r| r.last_claimed == today);
            let streak_alive =
                record.is_some_and(|r| r.last_claimed == today || r.last_claimed.succ_opt() == Some(today));
            Ok(CheckinStatus {
                currency: currency.clone(),
                last_claimed: record.map(|r| r.last_claimed),
                streak: record.map_or(0, |r| r.streak),
                claimed_today,
                streak_alive,
            })
        })
    }

    /// Settings in effect for `currency`, with configured defaults for anything unset.
    pub fn settings(&self, guild: &GuildId, currency: &str) -> Result<CheckinSettings, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        self.economy.with_guild(guild, |txn| {
            txn.read::<GuildConfig>()?.currency(&currency)?;
            self.effective_settings(txn, &currency)
        })
    }

    pub fn configure(
        &self,
        caller: &Caller,
        currency: &str,
        update: CheckinSettingsUpdate,
    ) -> Result<CheckinSettings, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let base_amount = update
            .base_amount
            .map(|amount| validation::validate_non_negative("base amount", amount))
            .transpose()?;
        let success_message = update
            .success_message
            .as_deref()
            .map(|text| validation::validate_message("success message", text))
            .transpose()?;
        let already_claimed_message = update
            .already_claimed_message
            .as_deref()
            .map(|text| validation::validate_message("already claimed message", text))
            .transpose()?;
        let background_image_url = update
            .background_image_url
            .map(|url| validation::validate_text("background image url", url.as_deref()))
            .transpose()?;

        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "configure_checkin")?;
            txn.read::<GuildConfig>()?.currency(&currency)?;
            let mut settings = self.effective_settings(txn, &currency)?;
            if let Some(amount) = base_amount {
                settings.base_amount = amount;
            }
            if let Some(message) = success_message {
                settings.success_message = message;
            }
            if let Some(message) = already_claimed_message {
                settings.already_claimed_message = message;
            }
            if let Some(url) = background_image_url {
                settings.background_image_url = url;
            }
            txn.write::<GuildConfig>()?
                .checkin_settings
                .insert(currency.clone(), settings.clone());
            info!(target: "security", "guild={} user={} configured check-in for {} (base {})", caller.guild, caller.user, currency, settings.base_amount);
            Ok(settings)
        })
    }
}
