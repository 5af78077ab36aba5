//! # Guildvault - guild-scoped virtual economy
//!
//! Guildvault keeps the economic state of chat communities ("guilds"): currencies,
//! balances, user-run shops with stock, inventories, daily check-in rewards with streaks
//! and simple RPG character sheets. A chat bot (or the bundled CLI) acts as the Command
//! Layer: it resolves who is calling and renders results, while every rule lives here.
//!
//! ## Features
//!
//! - **Multi-currency ledger**: per-guild currencies, transfers that conserve supply, admin
//!   grants, and an append-only journal of every mint, burn and transfer.
//! - **Shops and inventory**: finite or unlimited stock, all-or-nothing purchases,
//!   consumable and reusable items.
//! - **Daily check-ins**: configurable base reward plus stacking role bonuses, streaks that
//!   continue on consecutive days.
//! - **Characters**: stats and an experience curve of `floor(100 * level^1.5)`.
//! - **Pluggable persistence**: JSON files, sled, or in-memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guildvault::config::Config;
//! use guildvault::economy::{Caller, Economy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("guildvault.toml").await?;
//!     let economy = Economy::new(config.open_store()?, config.economy.clone());
//!
//!     let member = Caller::new("my-guild", "alice");
//!     let receipt = economy.checkin().claim(&member, None)?;
//!     println!("{}", receipt.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`economy`] - the core: components, records and errors
//! - [`storage`] - the persistence provider trait and its backends
//! - [`config`] - TOML configuration
//! - [`validation`] - id, amount and text rules
//! - [`logutil`] - single-line log sanitising
//! - [`metrics`] - process-local counters

pub mod config;
pub mod economy;
pub mod logutil;
pub mod metrics;
pub mod storage;
pub mod validation;
