//! Binary entrypoint for the shardkeep CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and create the data directory
//! - `run` - load the shard and autosave until Ctrl-C, then save and exit
//! - `seed-demo` - add a small demo population and save
//! - `inspect [--json]` - load the save and print what is in it
//! - `verify` - load every record, report the ones that fail
//! - `migrate` - load older records and rewrite the save at current versions
//! - `backup {create,list,verify,restore}` - manage save archives
//! - `account {create,list,ban,unban,level}` - manage accounts
//! - `firewall {add,remove,list}` - manage blocked addresses
//!
//! See the library crate docs for module-level details: `shardkeep::`.
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::Mutex;

use shardkeep::config::Config;
use shardkeep::content::seed_demo;
use shardkeep::services::{AccessLevel, Actor, Shard};
use shardkeep::storage::autosave::{start_autosave, AutoSave};
use shardkeep::storage::backup::{BackupManager, BackupType};
use shardkeep::storage::SaveStore;
use shardkeep::world::{LoadPolicy, LoadReport};

#[derive(Parser)]
#[command(name = "shardkeep")]
#[command(about = "World persistence and administration for Ultima Online compatible shards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration and data directory
    Init,
    /// Run the shard: load, autosave on schedule, save on Ctrl-C
    Run,
    /// Add a demo population (animals, vendors, items) and save
    SeedDemo,
    /// Print the contents of the current save
    Inspect {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Check every record of the current save
    Verify,
    /// Rewrite the current save at the current schema versions
    Migrate,
    /// Manage save backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Manage the address firewall
    Firewall {
        #[command(subcommand)]
        action: FirewallAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Archive the current save
    Create {
        #[arg(short, long)]
        name: Option<String>,
    },
    List,
    /// Check an archive against its recorded checksum
    Verify { id: String },
    /// Replace the current save with an archive
    Restore { id: String },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create an account (prompts for the password)
    Create {
        name: String,
        #[arg(short, long, default_value = "Player")]
        level: AccessLevel,
    },
    List {
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },
    Ban { name: String },
    Unban { name: String },
    /// Set an account's access level
    Level { name: String, level: AccessLevel },
}

#[derive(Subcommand)]
enum FirewallAction {
    /// Block an address or pattern such as 10.0.*.*
    Add { entry: String },
    Remove { entry: String },
    List {
        /// Only entries containing this text
        filter: Option<String>,
    },
}

const ACCOUNTS_PER_PAGE: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new shard configuration");
        Config::create_default(&cli.config).await?;
        let config = Config::load(&cli.config).await?;
        SaveStore::open(config.data_dir()).await?;
        info!(
            "Configuration file created at {}; data directory {}",
            cli.config,
            config.data_dir().display()
        );
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(&Some(config.clone()), cli.verbose);
    let store = SaveStore::open(config.data_dir())
        .await
        .with_context(|| format!("opening data directory {}", config.data_dir().display()))?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Run => run(config, store).await?,
        Commands::SeedDemo => {
            let (mut shard, _) = Shard::load(&config, &store).await?;
            let created = seed_demo(&mut shard.world, &mut rand::thread_rng())?;
            shard.save(&store).await?;
            println!("Added {} demo entities.", created);
        }
        Commands::Inspect { json } => {
            let (shard, report) = Shard::load(&config, &store).await?;
            print_inspect(&shard, report.as_ref(), json)?;
        }
        Commands::Verify => {
            let Some(image) = store.load().await? else {
                println!("No save to verify.");
                return Ok(());
            };
            let mut shard = Shard::new(&config)?;
            let report = shard.world.restore(&image, LoadPolicy::Skip)?;
            println!(
                "{} item(s), {} mobile(s) loaded; {} record(s) from older versions.",
                report.items_loaded, report.mobiles_loaded, report.migrated
            );
            if report.skipped.is_empty() {
                println!("All records are intact.");
            } else {
                for skipped in &report.skipped {
                    println!("  {} {}: {}", skipped.serial, skipped.type_name, skipped.reason);
                }
                bail!("{} record(s) failed to load", report.skipped.len());
            }
        }
        Commands::Migrate => {
            let (mut shard, report) = Shard::load(&config, &store).await?;
            let Some(report) = report else {
                println!("No save to migrate.");
                return Ok(());
            };
            if !report.has_older_versions() {
                println!("Save is already at the current versions.");
                return Ok(());
            }
            let mut backups = backup_manager(&config, &store)?;
            let meta = backups.create_backup(Some("pre-migrate".to_string()), BackupType::Manual)?;
            info!("previous save archived as {}", meta.id);
            shard.save(&store).await?;
            println!(
                "Rewrote {} entit{} from older versions (backup {}).",
                report.migrated,
                if report.migrated == 1 { "y" } else { "ies" },
                meta.id
            );
            if report.manifest_migrated {
                println!("Rewrote world.meta at the current version.");
            }
        }
        Commands::Backup { action } => backup_command(&config, &store, action).await?,
        Commands::Account { action } => account_command(&config, &store, action).await?,
        Commands::Firewall { action } => firewall_command(&config, &store, action).await?,
    }

    Ok(())
}

async fn run(config: Config, store: SaveStore) -> Result<()> {
    info!("Starting shardkeep v{} for '{}'", env!("CARGO_PKG_VERSION"), config.shard.name);
    let (shard, report) = Shard::load(&config, &store).await?;
    if let Some(report) = &report {
        log_report(report);
    }
    let autosave = AutoSave::new(&config, &store)?;
    info!(
        "Autosave: {}",
        if config.autosave.enabled {
            config.autosave.frequency.description()
        } else {
            "Disabled"
        }
    );
    let shard = Arc::new(Mutex::new(shard));
    let handle = start_autosave(autosave, shard, Arc::new(store));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.shutdown().await;
    info!("Shard stopped");
    Ok(())
}

fn log_report(report: &LoadReport) {
    info!(
        "World loaded: {} item(s), {} mobile(s)",
        report.items_loaded, report.mobiles_loaded
    );
    if report.migrated > 0 {
        info!("{} entit(ies) were read from older schema versions", report.migrated);
    }
    if report.dangling_cleared > 0 {
        warn!("{} reference(s) to missing entities were cleared", report.dangling_cleared);
    }
    for skipped in &report.skipped {
        warn!("skipped {} {}: {}", skipped.serial, skipped.type_name, skipped.reason);
    }
}

fn print_inspect(shard: &Shard, report: Option<&LoadReport>, json: bool) -> Result<()> {
    let mut types: BTreeMap<&str, usize> = BTreeMap::new();
    for item in shard.world.items() {
        *types.entry(item.type_name()).or_default() += 1;
    }
    for mobile in shard.world.mobiles() {
        *types.entry(mobile.type_name()).or_default() += 1;
    }
    let stats = shard.stats();
    let serials = shard.world.serials();

    if json {
        let payload = serde_json::json!({
            "stats": stats,
            "types": types,
            "saved_at": shard.world.last_saved(),
            "next_mobile_serial": format!("0x{:08X}", serials.peek_next_mobile()),
            "next_item_serial": format!("0x{:08X}", serials.peek_next_item()),
            "migrated": report.map_or(0, |r| r.migrated),
            "dangling_cleared": report.map_or(0, |r| r.dangling_cleared),
            "skipped": report.map(|r| r.skipped.iter().map(|s| serde_json::json!({
                "serial": s.serial.to_string(),
                "type": s.type_name,
                "reason": s.reason,
            })).collect::<Vec<_>>()).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match shard.world.last_saved() {
        Some(at) => println!("Saved at:     {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Saved at:     (never)"),
    }
    println!("Items:        {}", stats.items);
    println!("Mobiles:      {}", stats.mobiles);
    println!("Accounts:     {} active, {} banned", stats.active_accounts, stats.banned_accounts);
    println!("Firewalled:   {}", stats.firewalled);
    println!("Next serials: mobile 0x{:08X}, item 0x{:08X}", serials.peek_next_mobile(), serials.peek_next_item());
    if let Some(report) = report {
        if report.migrated > 0 {
            println!("Migrated:     {} (run `shardkeep migrate` to rewrite)", report.migrated);
        }
    }
    if !types.is_empty() {
        println!();
        for (name, count) in types {
            println!("  {:<24} {}", name, count);
        }
    }
    Ok(())
}

fn backup_manager(config: &Config, store: &SaveStore) -> Result<BackupManager> {
    BackupManager::new(
        store.current_dir(),
        config.backup_dir(),
        config.autosave.retention.clone(),
    )
    .with_context(|| format!("opening backup directory {}", config.backup_dir().display()))
}

async fn backup_command(config: &Config, store: &SaveStore, action: BackupAction) -> Result<()> {
    let mut backups = backup_manager(config, store)?;
    match action {
        BackupAction::Create { name } => {
            let meta = backups.create_backup(name, BackupType::Manual)?;
            println!("Created backup {} ({} bytes)", meta.id, meta.size_bytes);
        }
        BackupAction::List => {
            let list = backups.list_backups();
            if list.is_empty() {
                println!("No backups.");
            }
            for meta in list {
                println!(
                    "{}  {:<9} {:>10} bytes  {}{}",
                    meta.created_at.format("%Y-%m-%d %H:%M:%S"),
                    format!("{:?}", meta.backup_type),
                    meta.size_bytes,
                    meta.id,
                    if meta.verified { "  (verified)" } else { "" }
                );
            }
        }
        BackupAction::Verify { id } => {
            if backups.verify_backup(&id)? {
                println!("Backup {} is intact.", id);
            } else {
                bail!("backup {} does not match its checksum", id);
            }
        }
        BackupAction::Restore { id } => {
            if !backups.verify_backup(&id)? {
                bail!("backup {} does not match its checksum; not restoring", id);
            }
            let scratch = store.root().join("restore");
            let restored = backups.restore_backup(&id, &scratch)?;
            store.install(&restored).await?;
            tokio::fs::remove_dir_all(&scratch).await?;
            println!("Backup {} is now the current save.", id);
        }
    }
    Ok(())
}

async fn account_command(config: &Config, store: &SaveStore, action: AccountAction) -> Result<()> {
    let (mut shard, _) = Shard::load(config, store).await?;
    let console = Actor::console();
    match action {
        AccountAction::Create { name, level } => {
            let pass1 = rpassword::prompt_password("New password: ")?;
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                bail!("passwords do not match");
            }
            let username = shard.accounts.create(&name, &pass1)?.username.clone();
            if level != AccessLevel::Player {
                shard.accounts.set_access_level(&username, level)?;
            }
            println!("Created account '{}' ({}).", username, level);
        }
        AccountAction::List { page } => {
            let accounts = shard
                .accounts
                .list(page.saturating_sub(1), ACCOUNTS_PER_PAGE);
            if accounts.is_empty() {
                println!("No accounts on page {}.", page);
            }
            for account in accounts {
                println!(
                    "{:<16} {:<13} last login {}{}",
                    account.username,
                    account.access_level.to_string(),
                    account.last_login.format("%Y-%m-%d %H:%M"),
                    if account.banned { "  BANNED" } else { "" }
                );
            }
            return Ok(());
        }
        AccountAction::Ban { name } => {
            shard.ban_account(&console, &name)?;
            println!("Banned '{}'.", name);
        }
        AccountAction::Unban { name } => {
            shard.unban_account(&console, &name)?;
            println!("Unbanned '{}'.", name);
        }
        AccountAction::Level { name, level } => {
            shard.accounts.set_access_level(&name, level)?;
            console_log(&shard, &format!("set access level of '{}' to {}", name, level));
            println!("'{}' is now {}.", name, level);
        }
    }
    shard
        .accounts
        .save(&store.accounts_path())
        .await
        .context("saving accounts")?;
    Ok(())
}

async fn firewall_command(config: &Config, store: &SaveStore, action: FirewallAction) -> Result<()> {
    let (mut shard, _) = Shard::load(config, store).await?;
    let console = Actor::console();
    match action {
        FirewallAction::Add { entry } => {
            if shard.firewall_address(&console, &entry)? {
                println!("{} : Added to firewall.", entry.trim());
            } else {
                println!("{} is already firewalled.", entry.trim());
            }
        }
        FirewallAction::Remove { entry } => {
            if !shard.firewall.remove(&entry)? {
                return Err(anyhow!("{} is not in the firewall", entry.trim()));
            }
            console_log(&shard, &format!("removed {} from the firewall", entry.trim()));
            println!("{} : Removed from firewall.", entry.trim());
        }
        FirewallAction::List { filter } => {
            let entries = match &filter {
                Some(needle) => shard.firewall.search(needle),
                None => shard.firewall.entries().iter().collect(),
            };
            if entries.is_empty() {
                println!("The firewall list is empty.");
            }
            for entry in entries {
                println!("{}", entry);
            }
            return Ok(());
        }
    }
    shard
        .firewall
        .save(&store.firewall_path())
        .await
        .context("saving firewall")?;
    Ok(())
}

fn console_log(shard: &Shard, text: &str) {
    let console = Actor::console();
    shard
        .commands
        .write_line(&console, &format!("{} {} {}", console.access_level, console, text));
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);

        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());

            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }

            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
