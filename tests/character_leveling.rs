//! Character experience against the level curve.

mod common;

use common::*;
use guildvault::economy::leveling::{exp_for_level, level_from_exp, MAX_LEVEL};
use guildvault::economy::{BaseStats, ErrorKind};

const STATS: BaseStats = BaseStats {
    hp: 120,
    mp: 40,
    attack: 12,
    defense: 9,
};

#[test]
fn curve_matches_known_thresholds() {
    assert_eq!(exp_for_level(1), 100);
    assert_eq!(exp_for_level(2), 282);
    assert_eq!(exp_for_level(3), 519);
    assert_eq!(exp_for_level(4), 800);
    assert_eq!(exp_for_level(100), 100_000);
}

#[test]
fn level_is_the_highest_one_reached() {
    for level in 2..=200 {
        let needed = exp_for_level(level);
        assert_eq!(level_from_exp(needed), level);
        assert_eq!(level_from_exp(needed - 1), level - 1);
    }
    assert_eq!(level_from_exp(0), 1);
    assert_eq!(level_from_exp(u64::MAX), MAX_LEVEL);
}

#[test]
fn experience_accumulates_across_level_ups() {
    let (economy, _) = memory_economy();
    let sheets = economy.characters();
    sheets.create(&guild(), &"alice".into(), "Aria", STATS).unwrap();

    let change = sheets.add_experience(&guild(), &"alice".into(), 100).unwrap();
    assert_eq!(change.new_level, 1);

    let change = sheets.add_experience(&guild(), &"alice".into(), 700).unwrap();
    assert_eq!(change.old_level, 1);
    assert_eq!(change.new_level, 4);
    assert_eq!(change.exp, 800);

    let view = sheets.view(&guild(), &"alice".into()).unwrap();
    assert_eq!(view.character.level, 4);
    assert_eq!(view.character.max_hp, 120);
    assert_eq!(view.next_level_exp, exp_for_level(5));
}

#[test]
fn missing_character_is_not_found() {
    let (economy, _) = memory_economy();
    let err = economy
        .characters()
        .view(&guild(), &"ghost".into())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
