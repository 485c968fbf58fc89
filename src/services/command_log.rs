//! Staff command log.
//!
//! Every command is written twice: to a shared daily file and to a per-account
//! file grouped by access level:
//!
//! ```text
//! Logs/Commands/
//! ├── 2024-03-25.log
//! └── GameMaster/
//!     └── _pix.log
//! ```
//!
//! Each line is `timestamp: actor: text`. Account names get a leading `_` and
//! unsafe characters replaced so they can never name a device file.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::warn;

use crate::logutil::escape_log;
use crate::persist::Serial;
use crate::services::accounts::AccessLevel;
use crate::validation::account_log_name;

/// Who issued a command.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Character name, used when there is no account.
    pub name: String,
    pub account: Option<String>,
    pub access_level: AccessLevel,
    pub address: Option<IpAddr>,
}

impl Actor {
    pub fn new(name: &str, account: Option<&str>, access_level: AccessLevel) -> Self {
        Self {
            name: name.to_string(),
            account: account.map(str::to_string),
            access_level,
            address: None,
        }
    }

    /// The console: an owner-level actor with no account.
    pub fn console() -> Self {
        Self::new("console", None, AccessLevel::Owner)
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    fn log_name(&self) -> &str {
        self.account.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(address) = self.address {
            write!(f, "{} ", address)?;
        }
        match &self.account {
            Some(account) => write!(f, "{} ('{}')", self.name, account),
            None => write!(f, "{} (no account)", self.name),
        }
    }
}

/// `0x40000001 (BallOfSummoning)`
pub fn format_entity(serial: Serial, type_name: &str) -> String {
    format!("{} ({})", serial, type_name)
}

#[derive(Debug, Clone)]
pub struct CommandLog {
    dir: PathBuf,
    enabled: bool,
}

impl CommandLog {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn daily_path(&self, at: DateTime<Local>) -> PathBuf {
        self.dir.join(format!("{}.log", at.format("%Y-%m-%d")))
    }

    pub fn account_path(&self, actor: &Actor) -> PathBuf {
        self.dir
            .join(actor.access_level.to_string())
            .join(account_log_name(actor.log_name()))
    }

    /// Record one command. Failures are logged, never returned.
    pub fn write_line(&self, actor: &Actor, text: &str) {
        if !self.enabled {
            return;
        }
        let now = Local::now();
        let line = format!(
            "{}: {}: {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            actor,
            escape_log(text)
        );
        for path in [self.daily_path(now), self.account_path(actor)] {
            if let Err(e) = append(&path, &line) {
                warn!("command log {}: {}", path.display(), e);
            }
        }
    }
}

fn append(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
