//! Bot administrators and role income.
//!
//! A user is authorised for admin operations when the platform says they are an
//! administrator or when their id is in the guild's bot-admin set. Every decision is
//! logged under the `security` target.

use log::{info, warn};

use super::errors::EconomyError;
use super::txn::GuildTxn;
use super::types::{Caller, CurrencyId, GuildConfig, GuildId, RoleId, RoleIncome, RoleRef, UserId};
use super::Economy;
use crate::logutil::escape_log;
use crate::validation;

pub struct AdminRoles<'a> {
    economy: &'a Economy,
}

/// Fail with `Forbidden` unless `caller` may perform `action`.
pub(crate) fn require_admin(
    txn: &mut GuildTxn<'_>,
    caller: &Caller,
    action: &str,
) -> Result<(), EconomyError> {
    let listed = txn.read::<GuildConfig>()?.bot_admins.contains(&caller.user);
    if caller.platform_admin || listed {
        info!(target: "security", "guild={} user={} action={} authorized", caller.guild, caller.user, action);
        Ok(())
    } else {
        warn!(target: "security", "guild={} user={} action={} denied", caller.guild, caller.user, action);
        Err(EconomyError::Forbidden(format!("{action} requires an administrator")))
    }
}

impl<'a> AdminRoles<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    pub fn is_authorized(
        &self,
        guild: &GuildId,
        user: &UserId,
        platform_admin: bool,
    ) -> Result<bool, EconomyError> {
        if platform_admin {
            return Ok(true);
        }
        self.economy.with_guild(guild, |txn| {
            Ok(txn.read::<GuildConfig>()?.bot_admins.contains(user))
        })
    }

    /// Returns `false` if the user was already an admin.
    pub fn add_bot_admin(&self, caller: &Caller, user: &UserId) -> Result<bool, EconomyError> {
        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "add_bot_admin")?;
            let added = txn.write::<GuildConfig>()?.bot_admins.insert(user.clone());
            if added {
                info!(target: "security", "guild={} user={} granted bot admin to {}", caller.guild, caller.user, user);
            }
            Ok(added)
        })
    }

    /// Returns `false` if the user was not an admin.
    pub fn remove_bot_admin(&self, caller: &Caller, user: &UserId) -> Result<bool, EconomyError> {
        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "remove_bot_admin")?;
            let removed = txn.write::<GuildConfig>()?.bot_admins.remove(user);
            if removed {
                info!(target: "security", "guild={} user={} revoked bot admin from {}", caller.guild, caller.user, user);
            }
            Ok(removed)
        })
    }

    pub fn list_bot_admins(&self, caller: &Caller) -> Result<Vec<UserId>, EconomyError> {
        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "list_bot_admins")?;
            Ok(txn.read::<GuildConfig>()?.bot_admins.iter().cloned().collect())
        })
    }

    /// Set the daily bonus `role` adds to check-ins in `currency`.
    ///
    /// A bonus of zero removes that currency from the role, and a role left without any
    /// currency is dropped. Returns the role's entry after the change, if any.
    pub fn set_role_income(
        &self,
        caller: &Caller,
        role: &RoleRef,
        currency: &str,
        bonus: i64,
    ) -> Result<Option<RoleIncome>, EconomyError> {
        let currency = CurrencyId::parse(currency)?;
        let bonus = validation::validate_non_negative("bonus", bonus)?;
        let role_name = validation::validate_name("role name", &role.name)?;

        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "set_role_income")?;
            txn.read::<GuildConfig>()?.currency(&currency)?;

            let config = txn.write::<GuildConfig>()?;
            let entry = config
                .income_roles
                .entry(role.id.clone())
                .or_insert_with(|| RoleIncome {
                    role_id: role.id.clone(),
                    role_name: role_name.clone(),
                    currencies: Default::default(),
                });
            entry.role_name = role_name.clone();
            if bonus == 0 {
                entry.currencies.remove(&currency);
            } else {
                entry.currencies.insert(currency.clone(), bonus);
            }

            info!(
                "guild={} role {} ({}) income in {} set to {}",
                caller.guild,
                role.id,
                escape_log(&role_name),
                currency,
                bonus
            );

            if entry.currencies.is_empty() {
                config.income_roles.remove(&role.id);
                Ok(None)
            } else {
                Ok(Some(entry.clone()))
            }
        })
    }

    /// Remove one currency from a role's income, or the whole role when `currency` is `None`.
    /// Returns whether anything was removed.
    pub fn remove_role_income(
        &self,
        caller: &Caller,
        role: &RoleId,
        currency: Option<&str>,
    ) -> Result<bool, EconomyError> {
        let currency = currency.map(CurrencyId::parse).transpose()?;
        self.economy.with_guild(&caller.guild, |txn| {
            require_admin(txn, caller, "remove_role_income")?;
            if !txn.read::<GuildConfig>()?.income_roles.contains_key(role) {
                return Ok(false);
            }
            let config = txn.write::<GuildConfig>()?;
            let removed = match &currency {
                None => config.income_roles.remove(role).is_some(),
                Some(currency) => {
                    let removed = config
                        .income_roles
                        .get_mut(role)
                        .map(|entry| entry.currencies.remove(currency).is_some())
                        .unwrap_or(false);
                    if config
                        .income_roles
                        .get(role)
                        .is_some_and(|entry| entry.currencies.is_empty())
                    {
                        config.income_roles.remove(role);
                    }
                    removed
                }
            };
            Ok(removed)
        })
    }

    pub fn list_income_roles(&self, guild: &GuildId) -> Result<Vec<RoleIncome>, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            Ok(txn
                .read::<GuildConfig>()?
                .income_roles
                .values()
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::economy::ErrorKind;

    #[test]
    fn platform_admin_or_listed_user_is_authorized() {
        let (economy, _) = economy();
        let admin = economy.admin();
        let g = guild();
        assert!(admin.is_authorized(&g, &"anyone".into(), true).unwrap());
        assert!(!admin.is_authorized(&g, &"mod".into(), false).unwrap());

        admin.add_bot_admin(&super::super::testutil::admin(), &"mod".into()).unwrap();
        assert!(admin.is_authorized(&g, &"mod".into(), false).unwrap());
    }

    #[test]
    fn listed_bot_admin_can_use_admin_operations() {
        let (economy, _) = economy();
        economy
            .admin()
            .add_bot_admin(&super::super::testutil::admin(), &"mod".into())
            .unwrap();
        economy
            .currencies()
            .create(&member("mod"), "gems", "Gems", None, None)
            .expect("bot admin creates currency");
    }

    #[test]
    fn members_cannot_manage_admins() {
        let (economy, _) = economy();
        let err = economy
            .admin()
            .add_bot_admin(&member("alice"), &"alice".into())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(economy
            .admin()
            .list_bot_admins(&super::super::testutil::admin())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn role_income_is_set_incrementally() {
        let (economy, _) = with_gold();
        let admin_caller = super::super::testutil::admin();
        economy
            .currencies()
            .create(&admin_caller, "gems", "Gems", None, None)
            .unwrap();
        let roles = economy.admin();
        let vip = RoleRef::new("r1", "VIP");

        roles.set_role_income(&admin_caller, &vip, "gold", 50).unwrap();
        let entry = roles
            .set_role_income(&admin_caller, &RoleRef::new("r1", "Very Important"), "gems", 5)
            .unwrap()
            .expect("entry");
        assert_eq!(entry.role_name, "Very Important");
        assert_eq!(entry.currencies.len(), 2);

        // Zero removes a single currency; the last one removes the role.
        roles.set_role_income(&admin_caller, &vip, "gold", 0).unwrap();
        let left = roles.set_role_income(&admin_caller, &vip, "gems", 0).unwrap();
        assert!(left.is_none());
        assert!(roles.list_income_roles(&guild()).unwrap().is_empty());
    }

    #[test]
    fn role_income_requires_known_currency_and_non_negative_bonus() {
        let (economy, _) = with_gold();
        let admin_caller = super::super::testutil::admin();
        let vip = RoleRef::new("r1", "VIP");
        let err = economy
            .admin()
            .set_role_income(&admin_caller, &vip, "silver", 5)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = economy
            .admin()
            .set_role_income(&admin_caller, &vip, "gold", -5)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn remove_role_income_by_currency_or_whole_role() {
        let (economy, _) = with_gold();
        let admin_caller = super::super::testutil::admin();
        let roles = economy.admin();
        roles
            .set_role_income(&admin_caller, &RoleRef::new("r1", "VIP"), "gold", 10)
            .unwrap();
        roles
            .set_role_income(&admin_caller, &RoleRef::new("r2", "Booster"), "gold", 3)
            .unwrap();

        assert!(roles
            .remove_role_income(&admin_caller, &RoleId::new("r1"), Some("gold"))
            .unwrap());
        assert!(roles
            .remove_role_income(&admin_caller, &RoleId::new("r2"), None)
            .unwrap());
        assert!(!roles
            .remove_role_income(&admin_caller, &RoleId::new("r2"), None)
            .unwrap());
        assert!(roles.list_income_roles(&guild()).unwrap().is_empty());
    }
}
