use log::info;

use super::errors::EconomyError;
use super::leveling::{exp_for_level, level_from_exp};
use super::txn::CharacterBook;
use super::types::{Character, GuildId, UserId};
use super::Economy;
use crate::logutil::escape_log;
use crate::validation;

/// Starting stats for a new character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseStats {
    pub hp: u32,
    pub mp: u32,
    pub attack: u32,
    pub defense: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub old_level: u32,
    pub new_level: u32,
    pub exp: u64,
}

impl LevelChange {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterView {
    pub character: Character,
    /// Experience needed to reach the next level.
    pub next_level_exp: u64,
}

pub struct CharacterSheets<'a> {
    economy: &'a Economy,
}

impl<'a> CharacterSheets<'a> {
    pub(crate) fn new(economy: &'a Economy) -> Self {
        Self { economy }
    }

    /// One character per user per guild.
    pub fn create(
        &self,
        guild: &GuildId,
        user: &UserId,
        name: &str,
        stats: BaseStats,
    ) -> Result<Character, EconomyError> {
        let name = validation::validate_name("character name", name)?;
        validation::validate_positive("hp", i64::from(stats.hp))?;

        self.economy.with_guild(guild, |txn| {
            if txn.read::<CharacterBook>()?.0.contains_key(user) {
                return Err(EconomyError::CharacterExists);
            }
            let character = Character {
                name,
                hp: stats.hp,
                max_hp: stats.hp,
                mp: stats.mp,
                max_mp: stats.mp,
                attack: stats.attack,
                defense: stats.defense,
                level: 1,
                exp: 0,
                created_at: txn.now(),
            };
            txn.write::<CharacterBook>()?
                .0
                .insert(user.clone(), character.clone());
            info!("guild={} user={} created character {}", guild, user, escape_log(&character.name));
            Ok(character)
        })
    }

    pub fn add_experience(
        &self,
        guild: &GuildId,
        user: &UserId,
        amount: u64,
    ) -> Result<LevelChange, EconomyError> {
        if amount == 0 {
            return Err(validation::ValidationError::NotPositive {
                field: "experience",
                value: 0,
            }
            .into());
        }
        self.economy.with_guild(guild, |txn| {
            if !txn.read::<CharacterBook>()?.0.contains_key(user) {
                return Err(EconomyError::NoCharacter(user.clone()));
            }
            let character = txn
                .write::<CharacterBook>()?
                .0
                .get_mut(user)
                .ok_or_else(|| EconomyError::NoCharacter(user.clone()))?;
            let old_level = level_from_exp(character.exp);
            character.exp = character.exp.checked_add(amount).ok_or(EconomyError::Overflow)?;
            character.level = level_from_exp(character.exp);
            let change = LevelChange {
                old_level,
                new_level: character.level,
                exp: character.exp,
            };
            if change.leveled_up() {
                info!("guild={} user={} reached level {}", guild, user, change.new_level);
            }
            Ok(change)
        })
    }

    /// Current sheet. A cached level that disagrees with the experience curve is corrected
    /// and saved.
    pub fn view(&self, guild: &GuildId, user: &UserId) -> Result<CharacterView, EconomyError> {
        self.economy.with_guild(guild, |txn| {
            let mut character = txn
                .read::<CharacterBook>()?
                .0
                .get(user)
                .cloned()
                .ok_or_else(|| EconomyError::NoCharacter(user.clone()))?;
            let level = level_from_exp(character.exp);
            if character.level != level {
                character.level = level;
                txn.write::<CharacterBook>()?
                    .0
                    .insert(user.clone(), character.clone());
            }
            Ok(CharacterView {
                next_level_exp: exp_for_level(level.saturating_add(1)),
                character,
            })
        })
    }
}
