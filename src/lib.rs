//! # Shardkeep - world persistence for Ultima Online compatible shards
//!
//! Shardkeep stores a running shard's world (every item and mobile) in the
//! classic binary save layout and reloads it across restarts and across
//! schema changes. Every class level of an entity writes its own version
//! number, and every version ever written stays readable.
//!
//! ## Features
//!
//! - **Versioned codec**: per-layer `[version][fields]` records with explicit
//!   decode tables; older layouts load with documented defaults.
//! - **Type catalogs**: persisted type names resolve to constructors at load.
//! - **Never-reused serials**: the serial pool is saved with the world.
//! - **Integrity**: CRC-32 per record; corrupt records abort the load or are
//!   skipped, per configuration.
//! - **Atomic saves**: staged and swapped in, with tar.gz backups and retention.
//! - **Admin services**: accounts (Argon2id), firewall, connections, command log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shardkeep::config::Config;
//! use shardkeep::services::Shard;
//! use shardkeep::storage::SaveStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = SaveStore::open(config.data_dir()).await?;
//!     let (mut shard, _report) = Shard::load(&config, &store).await?;
//!
//!     println!("{} items", shard.world.item_count());
//!     shard.save(&store).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`persist`] - binary codec, versioned layers, serials, type catalogs
//! - [`world`] - entities, the world container, save/load, dupe, properties
//! - [`content`] - the concrete item and mobile types
//! - [`services`] - accounts, firewall, connections, command log, admin operations
//! - [`storage`] - save directory, backups, autosave
//! - [`config`] - TOML configuration
//! - [`validation`] - account name rules and path-safe names
//! - [`logutil`] - single-line escaping for user text in logs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Services     │ ← accounts, firewall, admin operations
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  World/Content  │ ← entities and their layers
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Persist      │ ← versioned binary codec
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Storage      │ ← save directory, backups
//! └─────────────────┘
//! ```

pub mod config;
pub mod content;
pub mod logutil;
pub mod persist;
pub mod services;
pub mod storage;
pub mod validation;
pub mod world;
