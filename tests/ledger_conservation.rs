//! Transfers move funds without creating or destroying supply.

mod common;

use common::*;
use guildvault::economy::{EntryKind, ErrorKind, UserId};

fn total_supply(economy: &guildvault::economy::Economy, users: &[&str]) -> i64 {
    users
        .iter()
        .map(|u| {
            economy
                .ledger()
                .balance(&guild(), &UserId::new(*u), "gold")
                .unwrap()
        })
        .sum()
}

#[test]
fn transfers_conserve_total_supply() {
    let (economy, _) = memory_economy();
    with_gold(&economy);
    let ledger = economy.ledger();
    ledger.credit(&guild(), &"alice".into(), "gold", 500).unwrap();
    ledger.credit(&guild(), &"bob".into(), "gold", 120).unwrap();

    let users = ["alice", "bob", "carol"];
    let before = total_supply(&economy, &users);

    let moves = [
        ("alice", "bob", 75),
        ("bob", "carol", 150),
        ("carol", "alice", 20),
        ("alice", "carol", 405),
    ];
    for (from, to, amount) in moves {
        ledger
            .transfer(&guild(), &from.into(), &to.into(), "gold", amount)
            .unwrap();
        assert_eq!(total_supply(&economy, &users), before);
    }

    // A rejected transfer leaves every balance untouched.
    let err = ledger
        .transfer(&guild(), &"alice".into(), &"bob".into(), "gold", 1_000)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(total_supply(&economy, &users), before);
    assert_eq!(ledger.balance(&guild(), &"carol".into(), "gold").unwrap(), 535);
}

#[test]
fn transfer_receipt_reports_both_sides() {
    let (economy, _) = memory_economy();
    with_gold(&economy);
    let ledger = economy.ledger();
    ledger.credit(&guild(), &"alice".into(), "gold", 100).unwrap();

    let receipt = ledger
        .transfer(&guild(), &"alice".into(), &"bob".into(), "gold", 40)
        .unwrap();
    assert_eq!(receipt.from_balance, 60);
    assert_eq!(receipt.to_balance, 40);

    let history = ledger.history(&guild(), Some(&"bob".into()), 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Transfer);
    assert_eq!(history[0].amount, 40);
}

#[test]
fn invalid_transfers_are_rejected() {
    let (economy, _) = memory_economy();
    with_gold(&economy);
    let ledger = economy.ledger();
    ledger.credit(&guild(), &"alice".into(), "gold", 100).unwrap();

    for amount in [0, -5] {
        let err = ledger
            .transfer(&guild(), &"alice".into(), &"bob".into(), "gold", amount)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let err = ledger
        .transfer(&guild(), &"alice".into(), &"alice".into(), "gold", 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = ledger
        .transfer(&guild(), &"alice".into(), &"bob".into(), "silver", 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn admin_adjustments_are_gated_and_floored() {
    let (economy, _) = memory_economy();
    with_gold(&economy);
    let ledger = economy.ledger();

    let err = ledger
        .adjust(&member("mallory"), &"mallory".into(), "gold", 1_000)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert_eq!(ledger.adjust(&admin(), &"bob".into(), "gold", 300).unwrap(), 300);
    assert_eq!(ledger.adjust(&admin(), &"bob".into(), "gold", -100).unwrap(), 200);
    let err = ledger
        .adjust(&admin(), &"bob".into(), "gold", -500)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.balance(&guild(), &"bob".into(), "gold").unwrap(), 200);
}

#[test]
fn guilds_do_not_share_balances() {
    let (economy, _) = memory_economy();
    with_gold(&economy);
    economy
        .ledger()
        .credit(&guild(), &"alice".into(), "gold", 100)
        .unwrap();

    let other = guildvault::economy::GuildId::new("another-guild");
    assert_eq!(
        economy.ledger().balance(&other, &"alice".into(), "gold").unwrap(),
        0
    );
    let err = economy
        .ledger()
        .credit(&other, &"alice".into(), "gold", 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
