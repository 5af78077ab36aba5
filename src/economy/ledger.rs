//! Balances and the append-only ledger journal.
//!
//! Minting (`credit`, check-in rewards, positive admin adjustments) and burning (`debit`,
//! purchases, negative adjustments) are the only ways the supply of a currency changes.
//! `transfer` moves funds between two accounts in one commit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::admin::require_admin;
use super::errors::EconomyError;
use super::txn::{AccountBook, GuildTxn};
use super::types::{Caller, CurrencyId, GuildConfig, GuildId, UserId};
use super::Economy;
use crate::metrics;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
    Transfer,
    Purchase,
    CheckIn,
    Adjustment,
}

/// One journal line. Mints have only `to`, burns only `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: EntryKind,
    pub currency: CurrencyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl LedgerEntry {
    pub fn involves(&self, user: &UserId) -> bool {
        self.from.as_ref() == Some(user) || self.to.as_ref() == Some(user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub currency: CurrencyId,
    pub amount: i64,
    pub from_balance: i64,
    pub to_balance: i64,
}

/// Add `amount` to a balance inside an open unit of work and journal it.
pub(crate) fn mint(
    txn: &mut GuildTxn<'_>,
    user: &UserId,
    currency: &CurrencyId,
    amount: i64,
    kind: EntryKind,
    memo: Option<String>,
) -> Result<i64, EconomyError> {
    let accounts = txn.write::<AccountBook>()?;
    let balance = accounts
        .0
        .entry(user.clone())
        .or_default()
        .balances
        .entry(currency.clone())
        .or_insert(0);
    *balance = balance.checked_add(amount).ok_or(EconomyError::Overflow)?;
    let new_balance = *balance;
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        at: txn.now(),
        kind,
        currency: currency.clone(),
        from: None,
        to: Some(user.clone()),
        amount,
        memo,
    };
    txn.record(entry);
    Ok(new_balance)
}

/// Remove `amount` from a balance, failing without change if it would go negative.
pub(crate) fn burn(
    txn: &mut GuildTxn<'_>,
    user: &UserId,
    currency: &CurrencyId,
    amount: i64,
    kind: EntryKind,
    memo: Option<String>,
) -> Result<i64, EconomyError> {
    let available = balance_in(txn, user, currency)?;
    if available < amount {
        return Err(EconomyError::InsufficientFunds {
            currency: currency.clone(),
            needed: amount,
            available,
        });
    }
    let new_balance = available - amount;
    txn.write::<AccountBook>()?
        .0
        .entry(user.clone())
        .or_default()
        .balances
        .insert(currency.clone(), new_balance);
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        at: txn.now(),
        kind,
        currency: currency.clone(),
        from: Some(user.clone()),
        to: None,
        amount,
        memo,
    };
    txn.record(entry);
    Ok(new_balance)
}

pub(crate) fn balance_in(
    txn: &mut GuildTxn<'_>,
    user: &UserId,
    currency: &CurrencyId,
) -> Result<i64, EconomyError> {
    Ok(txn
        .read::<AccountBook>()?
        .0
        .get(user)
        .map(|account| account.balance(currency))
        .unwrap_or(0))
}

fn require_currency(txn: &mut GuildTxn<'_>, currency: &CurrencyId) -> Result<(), EconomyError> {
    txn.read::<GuildConfig>()?.currency(currency).map(|_| ())
}

pub struct Ledger<'a> {
    economy: &'a Economy,
}

impl<'a> Ledger<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    /// Balance of `user` in `currency`; zero when never set.
    pub fn balance(&self, guild: &GuildId, user: &UserId, currency: &str) -> Result<i64, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        self.economy
            .with_guild(guild, |txn| balance_in(txn, user, &currency))
    }

    /// Every stored balance of `user`, including currencies since deleted.
    pub fn balances(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<BTreeMap<CurrencyId, i64>, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            Ok(txn
                .read::<AccountBook>()?
                .0
                .get(user)
                .map(|account| account.balances.clone())
                .unwrap_or_default())
        })
    }

    /// Mint `amount` into `user`'s balance. Each call adds once.
    pub fn credit(
        &self,
        guild: &GuildId,
        user: &UserId,
        currency: &str,
        amount: i64,
    ) -> Result<i64, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let amount = validation::validate_positive("amount", amount)?;
        self.economy.with_guild(guild, |txn| {
            require_currency(txn, &currency)?;
            let balance = mint(txn, user, &currency, amount, EntryKind::Credit, None)?;
            info!("guild={} credited {} {} to {}", guild, amount, currency, user);
            Ok(balance)
        })
    }

    /// Burn `amount` from `user`'s balance, all or nothing.
    pub fn debit(
        &self,
        guild: &GuildId,
        user: &UserId,
        currency: &str,
        amount: i64,
    ) -> Result<i64, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let amount = validation::validate_positive("amount", amount)?;
        self.economy.with_guild(guild, |txn| {
            require_currency(txn, &currency)?;
            let balance = burn(txn, user, &currency, amount, EntryKind::Debit, None)?;
            info!("guild={} debited {} {} from {}", guild, amount, currency, user);
            Ok(balance)
        })
    }

    pub fn transfer(
        &self,
        guild: &GuildId,
        from: &UserId,
        to: &UserId,
        currency: &str,
        amount: i64,
    ) -> Result<TransferReceipt, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let amount = validation::validate_positive("amount", amount)?;
        if from == to {
            return Err(EconomyError::InvalidTarget(
                "cannot transfer to yourself".to_string(),
            ));
        }

        let receipt = self.economy.with_guild(guild, |txn| {
            require_currency(txn, &currency)?;
            let available = balance_in(txn, from, &currency)?;
            let receiver = balance_in(txn, to, &currency)?;
            if available < amount {
                return Err(EconomyError::InsufficientFunds {
                    currency: currency.clone(),
                    needed: amount,
                    available,
                });
            }
            let to_balance = receiver.checked_add(amount).ok_or(EconomyError::Overflow)?;
            let from_balance = available - amount;

            let accounts = &mut txn.write::<AccountBook>()?.0;
            accounts
                .entry(from.clone())
                .or_default()
                .balances
                .insert(currency.clone(), from_balance);
            accounts
                .entry(to.clone())
                .or_default()
                .balances
                .insert(currency.clone(), to_balance);

            let entry = LedgerEntry {
                id: Uuid::new_v4(),
                at: txn.now(),
                kind: EntryKind::Transfer,
                currency: currency.clone(),
                from: Some(from.clone()),
                to: Some(to.clone()),
                amount,
                memo: None,
            };
            txn.record(entry);
            info!("guild={} transfer {} {} from {} to {}", guild, amount, currency, from, to);
            Ok(TransferReceipt {
                currency: currency.clone(),
                amount,
                from_balance,
                to_balance,
            })
        })?;
        metrics::inc_transfer();
        Ok(receipt)
    }

    /// Administrator grant (`delta > 0`) or removal (`delta < 0`).
    pub fn adjust(
        &self,
        caller: &Caller,
        user: &UserId,
        currency: &str,
        delta: i64,
    ) -> Result<i64, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        if delta == 0 {
            return Err(validation::ValidationError::NotPositive {
                field: "adjustment",
                value: 0,
            }
            .into());
        }
        let amount = delta.checked_abs().ok_or(EconomyError::Overflow)?;
        let memo = Some(format!("by {}", caller.user));

        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "adjust_balance")?;
            require_currency(txn, &currency)?;
            let balance = if delta > 0 {
                mint(txn, user, &currency, amount, EntryKind::Adjustment, memo)?
            } else {
                burn(txn, user, &currency, amount, EntryKind::Adjustment, memo)?
            };
            info!(target: "security", "guild={} user={} adjusted {} of {} by {}", caller.guild, caller.user, currency, user, delta);
            Ok(balance)
        })
    }

    /// Journal entries, newest first, optionally only those touching `user`.
    pub fn history(
        &self,
        guild: &GuildId,
        user: Option<&UserId>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, EconomyError> {
        let lines = self.economy.store().read_journal(guild.as_str())?;
        let mut entries = Vec::new();
        for line in lines.iter().rev() {
            if entries.len() >= limit {
                break;
            }
            let entry: LedgerEntry = match serde_json::from_slice(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable journal line in guild {}: {}", guild, e);
                    continue;
                }
            };
            if user.map_or(true, |u| entry.involves(u)) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::economy::ErrorKind;

    fn bal(economy: &Economy, user: &str) -> i64 {
        economy
            .ledger()
            .balance(&guild(), &user.into(), "gold")
            .unwrap()
    }

    #[test]
    fn unset_balance_is_zero() {
        let (economy, _) = with_gold();
        assert_eq!(bal(&economy, "nobody"), 0);
    }

    #[test]
    fn credit_and_debit() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        assert_eq!(ledger.credit(&guild(), &"a".into(), "gold", 30).unwrap(), 30);
        assert_eq!(ledger.debit(&guild(), &"a".into(), "gold", 12).unwrap(), 18);

        let err = ledger.debit(&guild(), &"a".into(), "gold", 19).unwrap_err();
        assert!(matches!(
            err,
            EconomyError::InsufficientFunds {
                needed: 19,
                available: 18,
                ..
            }
        ));
        assert_eq!(bal(&economy, "a"), 18);
    }

    #[test]
    fn amounts_must_be_positive() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        for amount in [0, -5] {
            let err = ledger
                .credit(&guild(), &"a".into(), "gold", amount)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(bal(&economy, "a"), 0);
    }

    #[test]
    fn credit_requires_registered_currency() {
        let (economy, _) = with_gold();
        let err = economy
            .ledger()
            .credit(&guild(), &"a".into(), "silver", 5)
            .unwrap_err();
        assert!(matches!(err, EconomyError::CurrencyNotFound(_)));
    }

    #[test]
    fn transfer_conserves_supply() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        ledger.credit(&guild(), &"a".into(), "gold", 50).unwrap();
        ledger.credit(&guild(), &"b".into(), "gold", 5).unwrap();

        let receipt = ledger
            .transfer(&guild(), &"a".into(), &"b".into(), "gold", 20)
            .unwrap();
        assert_eq!(receipt.from_balance, 30);
        assert_eq!(receipt.to_balance, 25);
        assert_eq!(bal(&economy, "a") + bal(&economy, "b"), 55);
    }

    #[test]
    fn failed_transfers_change_nothing() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        ledger.credit(&guild(), &"a".into(), "gold", 10).unwrap();

        let err = ledger
            .transfer(&guild(), &"a".into(), &"b".into(), "gold", 11)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        let err = ledger
            .transfer(&guild(), &"a".into(), &"a".into(), "gold", 1)
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidTarget(_)));
        let err = ledger
            .transfer(&guild(), &"a".into(), &"b".into(), "silver", 1)
            .unwrap_err();
        assert!(matches!(err, EconomyError::CurrencyNotFound(_)));

        assert_eq!(bal(&economy, "a"), 10);
        assert_eq!(bal(&economy, "b"), 0);
    }

    #[test]
    fn adjust_is_admin_only_and_never_goes_negative() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        let err = ledger
            .adjust(&member("a"), &"a".into(), "gold", 100)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert_eq!(ledger.adjust(&admin(), &"a".into(), "gold", 100).unwrap(), 100);
        assert_eq!(ledger.adjust(&admin(), &"a".into(), "gold", -40).unwrap(), 60);
        let err = ledger
            .adjust(&admin(), &"a".into(), "gold", -61)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(bal(&economy, "a"), 60);
    }

    #[test]
    fn history_is_newest_first_and_filterable() {
        let (economy, _) = with_gold();
        let ledger = economy.ledger();
        ledger.credit(&guild(), &"a".into(), "gold", 10).unwrap();
        ledger.credit(&guild(), &"b".into(), "gold", 10).unwrap();
        ledger
            .transfer(&guild(), &"a".into(), &"b".into(), "gold", 4)
            .unwrap();
        // Rejected operations leave no journal entry.
        let _ = ledger.debit(&guild(), &"a".into(), "gold", 1_000);

        let all = ledger.history(&guild(), None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].kind, EntryKind::Transfer);

        let only_a = ledger.history(&guild(), Some(&"a".into()), 10).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|e| e.involves(&"a".into())));

        assert_eq!(ledger.history(&guild(), None, 1).unwrap().len(), 1);
    }
}
