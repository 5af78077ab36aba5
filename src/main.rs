//! Binary entrypoint for the guildvault CLI.
//!
//! The CLI is a reference Command Layer: each subcommand maps to one core operation.
//! Identity comes from global flags: `--guild`, `--user`, `--admin` (platform administrator)
//! and repeatable `--role <id>:<name>`.
//!
//! Commands:
//! - `init` - write a starter `guildvault.toml` and create the data directory
//! - `status` - storage backend, guild summary and operation counters
//! - `currency`, `balance`, `give`, `grant`, `history` - currencies and the ledger
//! - `shop`, `buy`, `inventory`, `use` - shops, purchases and items
//! - `checkin`, `roles`, `admins`, `character` - rewards, administration and characters
//!
//! See the library crate docs for module-level details: `guildvault::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use guildvault::config::Config;
use guildvault::economy::{
    BaseStats, Caller, CheckinSettingsUpdate, Economy, EconomyError, ErrorKind, GuildId, ItemFlag,
    ItemId, NewItem, RoleId, RoleRef, ShopId, ShopKey, StackKey, UserId,
};
use guildvault::metrics;

#[derive(Parser)]
#[command(name = "guildvault")]
#[command(about = "Guild-scoped virtual economy: currencies, shops, check-ins and characters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "guildvault.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Guild the command applies to
    #[arg(long, default_value = "default", global = true)]
    guild: String,

    /// User issuing the command
    #[arg(long, default_value = "local", global = true)]
    user: String,

    /// Treat the user as a platform administrator
    #[arg(long, global = true)]
    admin: bool,

    /// Platform role held by the user, as `<id>:<name>` (repeatable)
    #[arg(long = "role", value_parser = parse_role, global = true)]
    roles: Vec<RoleRef>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and create the data directory
    Init,
    /// Show storage, guild summary and counters
    Status,
    /// Manage currencies
    #[command(subcommand)]
    Currency(CurrencyCmd),
    /// Show balances (yours, or another user's)
    Balance {
        #[arg(long)]
        of: Option<String>,
    },
    /// Transfer funds to another user
    Give {
        to: String,
        currency: String,
        amount: i64,
    },
    /// Admin: add (or with a negative amount, remove) funds
    Grant {
        user: String,
        currency: String,
        #[arg(allow_hyphen_values = true)]
        amount: i64,
    },
    /// Recent ledger entries
    History {
        /// Show every user's entries, not just yours
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage and browse shops
    #[command(subcommand)]
    Shop(ShopCmd),
    /// Buy an item from a shop
    Buy {
        owner: String,
        shop: String,
        item: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// List your items
    Inventory {
        #[arg(long)]
        category: Option<String>,
    },
    /// Use an item from your inventory
    Use {
        owner: String,
        shop: String,
        item: String,
    },
    /// Daily check-in
    #[command(subcommand)]
    Checkin(CheckinCmd),
    /// Admin: role income bonuses
    #[command(subcommand)]
    Roles(RolesCmd),
    /// Admin: bot administrators
    #[command(subcommand)]
    Admins(AdminsCmd),
    /// Character sheets
    #[command(subcommand)]
    Character(CharacterCmd),
}

#[derive(Subcommand)]
enum CurrencyCmd {
    Create {
        id: String,
        name: String,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
    List,
}

#[derive(Subcommand)]
enum ShopCmd {
    Create {
        id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        banner: Option<String>,
    },
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    Show {
        owner: String,
        shop: String,
        #[arg(long)]
        category: Option<String>,
    },
    AddItem {
        shop: String,
        name: String,
        price: i64,
        currency: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<String>,
        /// -1 for unlimited
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        stock: i64,
        #[arg(long)]
        not_usable: bool,
        #[arg(long)]
        not_resellable: bool,
        #[arg(long)]
        not_consumable: bool,
        #[arg(long)]
        use_description: Option<String>,
    },
    Restock {
        shop: String,
        item: String,
        amount: u32,
    },
    Toggle {
        shop: String,
        item: String,
        /// usable, resellable or consumable
        flag: String,
    },
    UseText {
        shop: String,
        item: String,
        /// Omit to clear
        text: Option<String>,
    },
}

#[derive(Subcommand)]
enum CheckinCmd {
    Claim {
        #[arg(long)]
        currency: Option<String>,
    },
    Status {
        currency: String,
    },
    Configure {
        currency: String,
        #[arg(long)]
        base: Option<i64>,
        #[arg(long)]
        success_message: Option<String>,
        #[arg(long)]
        already_claimed_message: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long, conflicts_with = "background")]
        clear_background: bool,
    },
}

#[derive(Subcommand)]
enum RolesCmd {
    Set {
        role: String,
        name: String,
        currency: String,
        bonus: i64,
    },
    Remove {
        role: String,
        #[arg(long)]
        currency: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum AdminsCmd {
    Add { user: String },
    Remove { user: String },
    List,
}

#[derive(Subcommand)]
enum CharacterCmd {
    Create {
        name: String,
        hp: u32,
        mp: u32,
        attack: u32,
        defense: u32,
    },
    Exp {
        amount: u64,
        #[arg(long)]
        of: Option<String>,
    },
    Show {
        #[arg(long)]
        of: Option<String>,
    },
}

fn parse_role(raw: &str) -> std::result::Result<RoleRef, String> {
    match raw.split_once(':') {
        Some((id, name)) if !id.is_empty() && !name.is_empty() => Ok(RoleRef::new(id, name)),
        _ => Err(format!("expected <id>:<name>, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new guildvault configuration");
        Config::create_default(&cli.config).await?;
        let config = Config::load(&cli.config).await?;
        tokio::fs::create_dir_all(&config.storage.data_dir).await?;
        println!(
            "Configuration written to {} (data in {})",
            cli.config, config.storage.data_dir
        );
        return Ok(());
    }

    let config = match Config::load(&cli.config).await {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("{e}; using built-in defaults");
            None
        }
    };
    init_logging(&config, cli.verbose);
    let config = config.unwrap_or_default();
    let economy = Economy::new(config.open_store()?, config.economy.clone());

    let mut caller = Caller::new(cli.guild.as_str(), cli.user.as_str());
    caller.platform_admin = cli.admin;
    caller.roles = cli.roles.clone();

    if let Commands::Status = cli.command {
        print_status(&config, &economy, &caller.guild);
        return Ok(());
    }

    if let Err(e) = run(cli.command, &economy, &caller) {
        warn!("command failed: {}", e);
        eprintln!("{}: {}", describe(e.kind()), e);
        std::process::exit(1);
    }
    Ok(())
}

fn describe(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "invalid input",
        ErrorKind::NotFound => "not found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::InsufficientFunds => "insufficient funds",
        ErrorKind::InsufficientStock => "out of stock",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::FlagGated => "not allowed for this item",
        ErrorKind::Internal => "internal error",
    }
}

fn user_or_self(of: Option<String>, caller: &Caller) -> UserId {
    of.map(UserId::from).unwrap_or_else(|| caller.user.clone())
}

fn shop_key(owner: &str, shop: &str) -> std::result::Result<ShopKey, EconomyError> {
    Ok(ShopKey::new(owner, ShopId::parse(shop)?))
}

fn run(command: Commands, economy: &Economy, caller: &Caller) -> std::result::Result<(), EconomyError> {
    let guild = &caller.guild;
    match command {
        Commands::Init | Commands::Status => {}
        Commands::Currency(cmd) => match cmd {
            CurrencyCmd::Create {
                id,
                name,
                symbol,
                description,
            } => {
                let currency = economy.currencies().create(
                    caller,
                    &id,
                    &name,
                    symbol.as_deref(),
                    description.as_deref(),
                )?;
                println!("Created {} {} ({})", currency.symbol, currency.name, currency.id);
            }
            CurrencyCmd::Delete { id } => {
                let currency = economy.currencies().delete(caller, &id)?;
                println!("Deleted {} ({}); existing balances are kept", currency.name, currency.id);
            }
            CurrencyCmd::List => {
                for currency in economy.currencies().list(guild)? {
                    println!(
                        "{:<16} {} {} - {}",
                        currency.id, currency.symbol, currency.name, currency.description
                    );
                }
            }
        },
        Commands::Balance { of } => {
            let user = user_or_self(of, caller);
            let currencies = economy.currencies().list(guild)?;
            let balances = economy.ledger().balances(guild, &user)?;
            println!("Balances of {user}:");
            for currency in &currencies {
                let amount = balances.get(&currency.id).copied().unwrap_or(0);
                println!("  {} {:>10} {}", currency.symbol, amount, currency.name);
            }
            for (id, amount) in balances
                .iter()
                .filter(|(id, _)| !currencies.iter().any(|c| &c.id == *id))
            {
                println!("  ? {:>10} {} (deleted currency)", amount, id);
            }
        }
        Commands::Give {
            to,
            currency,
            amount,
        } => {
            let receipt =
                economy
                    .ledger()
                    .transfer(guild, &caller.user, &UserId::from(to.clone()), &currency, amount)?;
            println!(
                "Sent {} {} to {}; your balance is now {}",
                receipt.amount, receipt.currency, to, receipt.from_balance
            );
        }
        Commands::Grant {
            user,
            currency,
            amount,
        } => {
            let balance = economy
                .ledger()
                .adjust(caller, &UserId::from(user.clone()), &currency, amount)?;
            println!("{user} now has {balance} {currency}");
        }
        Commands::History { all, limit } => {
            let user = (!all).then(|| caller.user.clone());
            for entry in economy.ledger().history(guild, user.as_ref(), limit)? {
                println!(
                    "{} {:<10} {:>8} {:<12} {} -> {} {}",
                    entry.at.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", entry.kind),
                    entry.amount,
                    entry.currency,
                    entry.from.as_ref().map_or("-", |u| u.as_str()),
                    entry.to.as_ref().map_or("-", |u| u.as_str()),
                    entry.memo.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Shop(cmd) => run_shop(cmd, economy, caller)?,
        Commands::Buy {
            owner,
            shop,
            item,
            quantity,
        } => {
            let key = shop_key(&owner, &shop)?;
            let receipt = economy.shops().purchase(caller, &key, &item, quantity)?;
            println!(
                "Bought {} x{} for {} {}. Balance: {}. You own {}. Stock left: {}",
                receipt.name,
                receipt.quantity,
                receipt.total_price,
                receipt.currency,
                receipt.balance,
                receipt.owned,
                receipt.stock
            );
        }
        Commands::Inventory { category } => {
            let stacks = economy
                .inventory()
                .inventory(guild, &caller.user, category.as_deref())?;
            if stacks.is_empty() {
                println!("Your inventory is empty.");
            }
            for stack in stacks {
                println!(
                    "{:<24} x{:<4} [{}] from {}",
                    stack.name,
                    stack.quantity,
                    stack.category(),
                    stack.source
                );
            }
        }
        Commands::Use { owner, shop, item } => {
            let key = StackKey::new(shop_key(&owner, &shop)?, ItemId::parse(&item)?);
            let outcome = economy.inventory().use_item(caller, &key)?;
            println!("You used {}: {}", outcome.name, outcome.effect);
            if outcome.consumed {
                println!("Remaining: {}", outcome.remaining);
            }
        }
        Commands::Checkin(cmd) => run_checkin(cmd, economy, caller)?,
        Commands::Roles(cmd) => match cmd {
            RolesCmd::Set {
                role,
                name,
                currency,
                bonus,
            } => {
                let entry = economy.admin().set_role_income(
                    caller,
                    &RoleRef::new(role.as_str(), name),
                    &currency,
                    bonus,
                )?;
                match entry {
                    Some(entry) => println!(
                        "{} now earns {} currencies daily",
                        entry.role_name,
                        entry.currencies.len()
                    ),
                    None => println!("Role {role} no longer has any income"),
                }
            }
            RolesCmd::Remove { role, currency } => {
                let removed = economy.admin().remove_role_income(
                    caller,
                    &RoleId::from(role.as_str()),
                    currency.as_deref(),
                )?;
                println!("{}", if removed { "Removed" } else { "Nothing to remove" });
            }
            RolesCmd::List => {
                for role in economy.admin().list_income_roles(guild)? {
                    let parts: Vec<String> = role
                        .currencies
                        .iter()
                        .map(|(currency, bonus)| format!("+{bonus} {currency}"))
                        .collect();
                    println!("{} ({}): {}", role.role_name, role.role_id, parts.join(", "));
                }
            }
        },
        Commands::Admins(cmd) => match cmd {
            AdminsCmd::Add { user } => {
                let added = economy.admin().add_bot_admin(caller, &UserId::from(user.clone()))?;
                println!("{user} {}", if added { "is now a bot admin" } else { "was already a bot admin" });
            }
            AdminsCmd::Remove { user } => {
                let removed = economy
                    .admin()
                    .remove_bot_admin(caller, &UserId::from(user.clone()))?;
                println!("{user} {}", if removed { "is no longer a bot admin" } else { "was not a bot admin" });
            }
            AdminsCmd::List => {
                for user in economy.admin().list_bot_admins(caller)? {
                    println!("{user}");
                }
            }
        },
        Commands::Character(cmd) => match cmd {
            CharacterCmd::Create {
                name,
                hp,
                mp,
                attack,
                defense,
            } => {
                let stats = BaseStats {
                    hp,
                    mp,
                    attack,
                    defense,
                };
                let character = economy
                    .characters()
                    .create(guild, &caller.user, &name, stats)?;
                println!("Created {} (level {})", character.name, character.level);
            }
            CharacterCmd::Exp { amount, of } => {
                let user = user_or_self(of, caller);
                let change = economy.characters().add_experience(guild, &user, amount)?;
                if change.leveled_up() {
                    println!("Level up! {} -> {}", change.old_level, change.new_level);
                } else {
                    println!("Experience: {} (level {})", change.exp, change.new_level);
                }
            }
            CharacterCmd::Show { of } => {
                let user = user_or_self(of, caller);
                let view = economy.characters().view(guild, &user)?;
                let c = &view.character;
                println!("{} - level {}", c.name, c.level);
                println!("  HP {}/{}  MP {}/{}", c.hp, c.max_hp, c.mp, c.max_mp);
                println!("  ATK {}  DEF {}", c.attack, c.defense);
                println!("  EXP {}/{}", c.exp, view.next_level_exp);
            }
        },
    }
    Ok(())
}

fn run_shop(cmd: ShopCmd, economy: &Economy, caller: &Caller) -> std::result::Result<(), EconomyError> {
    let shops = economy.shops();
    let own = |shop: &str| shop_key(caller.user.as_str(), shop);
    match cmd {
        ShopCmd::Create {
            id,
            name,
            description,
            banner,
        } => {
            let shop = shops.create_shop(caller, &id, &name, description.as_deref(), banner.as_deref())?;
            println!("Opened {} ({})", shop.name, shop.key);
        }
        ShopCmd::List { owner } => {
            let owner = owner.map(UserId::from);
            for shop in shops.list_shops(&caller.guild, owner.as_ref())? {
                println!("{:<24} {:<20} {} item(s)", shop.key, shop.name, shop.items.len());
            }
        }
        ShopCmd::Show {
            owner,
            shop,
            category,
        } => {
            let key = shop_key(&owner, &shop)?;
            let info = shops.shop(&caller.guild, &key)?;
            println!("{} - {}", info.name, info.description);
            for item in shops.list_items(&caller.guild, &key, category.as_deref())? {
                let price = if item.is_purchasable() {
                    format!("{} {}", item.price, item.currency)
                } else {
                    "not for sale".to_string()
                };
                println!(
                    "  {:<12} {:<20} [{}] {} (stock {})",
                    item.id, item.name, item.category, price, item.stock
                );
            }
        }
        ShopCmd::AddItem {
            shop,
            name,
            price,
            currency,
            id,
            category,
            description,
            image,
            stock,
            not_usable,
            not_resellable,
            not_consumable,
            use_description,
        } => {
            let mut item = NewItem::new(name, price, currency);
            item.id = id;
            item.category = category;
            item.description = description;
            item.image_url = image;
            item.stock = stock;
            item.usable = !not_usable;
            item.resellable = !not_resellable;
            item.consumable = !not_consumable;
            item.use_description = use_description;
            let created = shops.add_item(caller, &own(&shop)?, item)?;
            println!("Added {} as {}", created.name, created.id);
        }
        ShopCmd::Restock { shop, item, amount } => {
            let stock = shops.restock(caller, &own(&shop)?, &item, amount)?;
            println!("Stock of {item} is now {stock}");
        }
        ShopCmd::Toggle { shop, item, flag } => {
            let flag: ItemFlag = flag.parse()?;
            let value = shops.toggle_flag(caller, &own(&shop)?, &item, flag)?;
            println!("{item}: {flag:?} = {value}");
        }
        ShopCmd::UseText { shop, item, text } => {
            let updated = shops.set_use_description(caller, &own(&shop)?, &item, text.as_deref())?;
            println!("{}: {}", updated.name, updated.effect_text());
        }
    }
    Ok(())
}

fn run_checkin(cmd: CheckinCmd, economy: &Economy, caller: &Caller) -> std::result::Result<(), EconomyError> {
    let engine = economy.checkin();
    match cmd {
        CheckinCmd::Claim { currency } => match engine.claim(caller, currency.as_deref()) {
            Ok(receipt) => {
                println!("{}", receipt.message);
                println!("  base {}", receipt.base);
                for bonus in &receipt.bonuses {
                    println!("  +{} from {}", bonus.amount, bonus.role_name);
                }
                println!(
                    "  total {} {}, streak {} day(s), balance {}",
                    receipt.total, receipt.symbol, receipt.streak, receipt.balance
                );
            }
            Err(EconomyError::AlreadyClaimed { streak, message }) => {
                println!("{message} (streak {streak})");
            }
            Err(e) => return Err(e),
        },
        CheckinCmd::Status { currency } => {
            let status = engine.status(&caller.guild, &caller.user, &currency)?;
            match status.last_claimed {
                Some(date) => println!(
                    "Last check-in {}; streak {}{}",
                    date,
                    status.streak,
                    if status.claimed_today {
                        " (claimed today)"
                    } else if status.streak_alive {
                        " (claim today to continue)"
                    } else {
                        " (broken)"
                    }
                ),
                None => println!("Never checked in for {}", status.currency),
            }
        }
        CheckinCmd::Configure {
            currency,
            base,
            success_message,
            already_claimed_message,
            background,
            clear_background,
        } => {
            let update = CheckinSettingsUpdate {
                base_amount: base,
                success_message,
                already_claimed_message,
                background_image_url: if clear_background {
                    Some(None)
                } else {
                    background.map(Some)
                },
            };
            let settings = engine.configure(caller, &currency, update)?;
            println!(
                "Check-in for {currency}: base {}, message \"{}\"",
                settings.base_amount, settings.success_message
            );
        }
    }
    Ok(())
}

fn print_status(config: &Config, economy: &Economy, guild: &GuildId) {
    println!("guildvault v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Storage: {:?} at {}",
        config.storage.backend, config.storage.data_dir
    );
    match economy.currencies().list(guild) {
        Ok(currencies) => println!("Guild {}: {} currencies", guild, currencies.len()),
        Err(e) => println!("Guild {}: unavailable ({})", guild, e),
    }
    match economy.shops().list_shops(guild, None) {
        Ok(shops) => println!("Guild {}: {} shops", guild, shops.len()),
        Err(e) => println!("Guild {}: shops unavailable ({})", guild, e),
    }
    let snapshot = metrics::snapshot();
    println!(
        "This process: {} purchases ({} units), {} check-ins, {} transfers, {} items used, {} rejected",
        snapshot.purchases,
        snapshot.units_sold,
        snapshot.checkins,
        snapshot.transfers,
        snapshot.items_used,
        snapshot.total_rejected()
    );
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Warn);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config.as_ref().and_then(|cfg| {
        cfg.logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        })
    });
    let security_path = config
        .as_ref()
        .and_then(|cfg| cfg.logging.security_file.clone());

    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when someone is watching it
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
