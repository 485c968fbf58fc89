//! World autosave.
//!
//! Saves run on wall-clock boundaries (every 15 minutes means :00, :15, :30
//! and :45 UTC) rather than on a timer from startup. A boundary minute is
//! only ever saved once even though the task ticks several times inside it.
//!
//! Before each save the previous one is archived as an automatic backup and
//! retention is applied afterwards. The background task holds the shard lock
//! for the whole save, so nothing mutates the world mid-serialization.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};

use super::backup::{BackupManager, BackupType};
use super::SaveStore;
use crate::config::Config;
use crate::services::Shard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SaveFrequency {
    Disabled,
    /// :00, :05, :10, ...
    Every5Minutes,
    #[default]
    Every15Minutes,
    Every30Minutes,
    /// Top of every hour
    Hourly,
    /// 00:00, 06:00, 12:00, 18:00 UTC
    Every6Hours,
    /// Midnight UTC
    Daily,
}

impl SaveFrequency {
    pub fn minutes(&self) -> u32 {
        match self {
            SaveFrequency::Disabled => 0,
            SaveFrequency::Every5Minutes => 5,
            SaveFrequency::Every15Minutes => 15,
            SaveFrequency::Every30Minutes => 30,
            SaveFrequency::Hourly => 60,
            SaveFrequency::Every6Hours => 360,
            SaveFrequency::Daily => 1440,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SaveFrequency::Disabled => "Disabled",
            SaveFrequency::Every5Minutes => "Every 5 minutes",
            SaveFrequency::Every15Minutes => "Every 15 minutes",
            SaveFrequency::Every30Minutes => "Every 30 minutes",
            SaveFrequency::Hourly => "Every hour",
            SaveFrequency::Every6Hours => "Every 6 hours",
            SaveFrequency::Daily => "Daily at midnight UTC",
        }
    }

    /// True if `now` falls in a scheduled minute.
    pub fn is_boundary(&self, now: &DateTime<Utc>) -> bool {
        let period = self.minutes();
        if period == 0 {
            return false;
        }
        let minute_of_day = now.hour() * 60 + now.minute();
        minute_of_day % period == 0
    }
}

impl FromStr for SaveFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(SaveFrequency::Disabled),
            "5m" | "every5minutes" => Ok(SaveFrequency::Every5Minutes),
            "15m" | "every15minutes" => Ok(SaveFrequency::Every15Minutes),
            "30m" | "every30minutes" => Ok(SaveFrequency::Every30Minutes),
            "hourly" | "1h" | "60m" => Ok(SaveFrequency::Hourly),
            "6h" | "every6hours" => Ok(SaveFrequency::Every6Hours),
            "daily" | "1d" | "24h" => Ok(SaveFrequency::Daily),
            other => Err(format!("unknown save frequency '{}'", other)),
        }
    }
}

/// Autosave schedule and the backups it feeds.
pub struct AutoSave {
    enabled: bool,
    frequency: SaveFrequency,
    archive_previous: bool,
    backups: BackupManager,
    last_boundary_minute: Option<i64>,
    last_save: Option<DateTime<Utc>>,
}

impl AutoSave {
    pub fn new(config: &Config, store: &SaveStore) -> Result<Self> {
        let backups = BackupManager::new(
            store.current_dir(),
            config.backup_dir(),
            config.autosave.retention.clone(),
        )
        .with_context(|| format!("opening backup directory {}", config.backup_dir().display()))?;
        Ok(Self {
            enabled: config.autosave.enabled,
            frequency: config.autosave.frequency,
            archive_previous: config.autosave.archive_previous,
            backups,
            last_boundary_minute: None,
            last_save: None,
        })
    }

    pub fn frequency(&self) -> SaveFrequency {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: SaveFrequency) {
        self.frequency = frequency;
        info!("Autosave frequency set to: {}", frequency.description());
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!("Autosave {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.last_save
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// True if a save is due at `now` and none has run in this minute yet.
    pub fn should_save_now(&self, now: &DateTime<Utc>) -> bool {
        if !self.enabled || !self.frequency.is_boundary(now) {
            return false;
        }
        self.last_boundary_minute != Some(now.timestamp() / 60)
    }

    /// Save if `now` is a due boundary. Returns whether a save ran.
    pub async fn check_and_save(
        &mut self,
        shard: &mut Shard,
        store: &SaveStore,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !self.should_save_now(&now) {
            return Ok(false);
        }
        self.last_boundary_minute = Some(now.timestamp() / 60);
        info!("Autosave ({})", self.frequency.description());
        self.save(shard, store, BackupType::Automatic).await?;
        Ok(true)
    }

    /// Archive the current save as `kind`, save the shard, then apply retention.
    pub async fn save(&mut self, shard: &mut Shard, store: &SaveStore, kind: BackupType) -> Result<()> {
        if self.archive_previous && store.has_save() {
            let name = format!("{}_{}", kind.prefix(), Utc::now().format("%Y%m%d_%H%M%S"));
            match self.backups.create_backup(Some(name), kind) {
                Ok(meta) => debug!("archived previous save as {}", meta.id),
                Err(e) => warn!("could not archive previous save: {}", e),
            }
        }
        shard.save(store).await?;
        self.last_save = Some(Utc::now());
        let deleted = self.backups.apply_retention_policy()?;
        if !deleted.is_empty() {
            info!("Retention policy deleted {} old backup(s)", deleted.len());
        }
        Ok(())
    }
}

enum AutoSaveCommand {
    SaveNow(oneshot::Sender<Result<(), String>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running autosave task.
#[derive(Clone)]
pub struct AutoSaveHandle {
    tx: mpsc::UnboundedSender<AutoSaveCommand>,
}

impl AutoSaveHandle {
    /// Save immediately, outside the schedule.
    pub async fn save_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(AutoSaveCommand::SaveNow(tx))
            .map_err(|_| anyhow::anyhow!("autosave task has stopped"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("autosave task has stopped"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Run the final save and stop the task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(AutoSaveCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

const TICK: Duration = Duration::from_secs(5);

pub fn start_autosave(
    mut autosave: AutoSave,
    shard: Arc<Mutex<Shard>>,
    store: Arc<SaveStore>,
) -> AutoSaveHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<AutoSaveCommand>();
    let handle = AutoSaveHandle { tx };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let done = loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(AutoSaveCommand::SaveNow(resp)) => {
                        let mut shard = shard.lock().await;
                        let result = autosave
                            .save(&mut shard, &store, BackupType::Automatic)
                            .await
                            .map_err(|e| format!("{:#}", e));
                        let _ = resp.send(result);
                    }
                    Some(AutoSaveCommand::Shutdown(done)) => break Some(done),
                    None => break None,
                },
                _ = interval.tick() => {
                    let mut shard = shard.lock().await;
                    if let Err(e) = autosave.check_and_save(&mut shard, &store, Utc::now()).await {
                        error!("Autosave failed: {:#}", e);
                    }
                }
            }
        };

        info!("Saving world before shutdown");
        let mut shard = shard.lock().await;
        if let Err(e) = autosave.save(&mut shard, &store, BackupType::Shutdown).await {
            error!("Shutdown save failed: {:#}", e);
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 25, h, m, s).unwrap()
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("off".parse::<SaveFrequency>(), Ok(SaveFrequency::Disabled));
        assert_eq!("15m".parse::<SaveFrequency>(), Ok(SaveFrequency::Every15Minutes));
        assert_eq!("Every6Hours".parse::<SaveFrequency>(), Ok(SaveFrequency::Every6Hours));
        assert!("fortnightly".parse::<SaveFrequency>().is_err());
    }

    #[test]
    fn test_boundaries() {
        let f = SaveFrequency::Every15Minutes;
        assert!(f.is_boundary(&at(3, 45, 10)));
        assert!(!f.is_boundary(&at(3, 46, 0)));
        assert!(SaveFrequency::Every6Hours.is_boundary(&at(18, 0, 0)));
        assert!(!SaveFrequency::Every6Hours.is_boundary(&at(19, 0, 0)));
        assert!(SaveFrequency::Daily.is_boundary(&at(0, 0, 59)));
        assert!(!SaveFrequency::Disabled.is_boundary(&at(0, 0, 0)));
        assert_eq!(SaveFrequency::default(), SaveFrequency::Every15Minutes);
    }
}
