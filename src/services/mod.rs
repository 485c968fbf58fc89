//! # Shard services
//!
//! The world plus the server-wide tables that live next to it. [`Shard`] owns
//! them all, so every operation that touches more than one (banning an account
//! and kicking its clients, duping an item and logging it) is a method on one
//! value rather than a reach into global state.
//!
//! - [`accounts`] - account registry with Argon2id password hashes
//! - [`firewall`] - blocked addresses and patterns
//! - [`netstate`] - live client connections
//! - [`command_log`] - per-day and per-account staff command log
//! - [`admin`] - the operations an administration UI invokes

pub mod accounts;
pub mod admin;
pub mod command_log;
pub mod firewall;
pub mod netstate;

use anyhow::{Context, Result};
use log::info;

use crate::config::Config;
use crate::storage::SaveStore;
use crate::world::{LoadReport, World};

pub use accounts::{AccessLevel, Account, AccountError, AccountRegistry};
pub use admin::{AdminError, ServerStats};
pub use command_log::{Actor, CommandLog};
pub use firewall::{Firewall, FirewallEntry, FirewallError};
pub use netstate::{ConnectionId, NetState, NetStateRegistry};

pub struct Shard {
    pub world: World,
    pub accounts: AccountRegistry,
    pub firewall: Firewall,
    pub netstates: NetStateRegistry,
    pub commands: CommandLog,
}

impl Shard {
    /// An empty shard with no accounts.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            world: World::new().context("registering content types")?,
            accounts: AccountRegistry::new(&config.accounts),
            firewall: Firewall::new(),
            netstates: NetStateRegistry::new(),
            commands: CommandLog::new(config.command_log_dir(), config.commands.log_enabled),
        })
    }

    /// Load everything persisted in `store`. The report is `None` for a data
    /// directory that has never been saved.
    pub async fn load(config: &Config, store: &SaveStore) -> Result<(Self, Option<LoadReport>)> {
        let mut shard = Self::new(config)?;
        let report = match store.load().await.context("reading current save")? {
            Some(image) => Some(
                shard
                    .world
                    .restore(&image, config.persistence.load_policy)
                    .context("loading world")?,
            ),
            None => {
                info!("no save in {}; starting an empty world", store.root().display());
                None
            }
        };
        shard.accounts = AccountRegistry::load(&store.accounts_path(), &config.accounts)
            .await
            .context("loading accounts")?;
        shard.firewall = Firewall::load(&store.firewall_path())
            .await
            .context("loading firewall")?;
        info!(
            "loaded {} item(s), {} mobile(s), {} account(s), {} firewall entries",
            shard.world.item_count(),
            shard.world.mobile_count(),
            shard.accounts.len(),
            shard.firewall.len()
        );
        Ok((shard, report))
    }

    /// Save the world, accounts and firewall.
    pub async fn save(&mut self, store: &SaveStore) -> Result<()> {
        let image = self.world.save_image();
        store.save(&image).await.context("saving world")?;
        self.accounts
            .save(&store.accounts_path())
            .await
            .context("saving accounts")?;
        self.firewall
            .save(&store.firewall_path())
            .await
            .context("saving firewall")?;
        info!(
            "world saved: {} item(s), {} mobile(s)",
            self.world.item_count(),
            self.world.mobile_count()
        );
        Ok(())
    }
}
