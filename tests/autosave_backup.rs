//! Scheduled saves archive the previous save, and archives restore cleanly.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shardkeep::content::seed_demo;
use shardkeep::services::Shard;
use shardkeep::storage::autosave::{start_autosave, AutoSave};
use shardkeep::storage::backup::{BackupManager, BackupType};
use shardkeep::storage::SaveStore;
use shardkeep::world::entity::Entity;
use tempfile::tempdir;
use tokio::sync::Mutex;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, h, m, s).unwrap()
}

#[tokio::test]
async fn boundary_saves_once_and_archives_the_previous_save() {
    let tmp = tempdir().unwrap();
    let config = common::test_config(tmp.path());
    let store = SaveStore::open(config.data_dir()).await.unwrap();
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(3)).unwrap();

    let mut autosave = AutoSave::new(&config, &store).unwrap();

    // nothing to archive on the very first save
    assert!(autosave.check_and_save(&mut shard, &store, at(12, 15, 2)).await.unwrap());
    assert!(autosave.backups().list_backups().is_empty());
    assert!(store.has_save());

    // same minute again, then an off-schedule minute
    assert!(!autosave.check_and_save(&mut shard, &store, at(12, 15, 40)).await.unwrap());
    assert!(!autosave.check_and_save(&mut shard, &store, at(12, 16, 0)).await.unwrap());

    assert!(autosave.check_and_save(&mut shard, &store, at(12, 30, 0)).await.unwrap());
    let backups = autosave.backups().list_backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].backup_type, BackupType::Automatic);
    assert!(autosave.last_save().is_some());
}

#[tokio::test]
async fn an_archived_save_can_be_restored() {
    let tmp = tempdir().unwrap();
    let config = common::test_config(tmp.path());
    let store = SaveStore::open(config.data_dir()).await.unwrap();
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(9)).unwrap();
    let seeded_items = shard.world.item_count();
    shard.save(&store).await.unwrap();

    let mut autosave = AutoSave::new(&config, &store).unwrap();
    let victim = shard.world.items().map(|i| i.serial()).min().unwrap();
    shard.world.delete(victim);
    autosave
        .save(&mut shard, &store, BackupType::Manual)
        .await
        .unwrap();
    let archived = autosave.backups().list_backups();
    assert_eq!(archived.len(), 1);
    let id = archived[0].id.clone();

    let mut manager = BackupManager::new(
        store.current_dir(),
        config.backup_dir(),
        config.autosave.retention.clone(),
    )
    .unwrap();
    assert!(manager.verify_backup(&id).unwrap());
    let restored = manager
        .restore_backup(&id, &store.root().join("restore"))
        .unwrap();
    store.install(&restored).await.unwrap();

    let (reloaded, report) = Shard::load(&config, &store).await.unwrap();
    assert!(report.unwrap().skipped.is_empty());
    assert_eq!(reloaded.world.item_count(), seeded_items);
    assert!(reloaded.world.is_live(victim));
}

#[tokio::test]
async fn shutdown_runs_a_final_save() {
    let tmp = tempdir().unwrap();
    let mut config = common::test_config(tmp.path());
    config.autosave.archive_previous = false;
    let store = Arc::new(SaveStore::open(config.data_dir()).await.unwrap());
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(5)).unwrap();
    let items = shard.world.item_count();

    let autosave = AutoSave::new(&config, &store).unwrap();
    let shard = Arc::new(Mutex::new(shard));
    let handle = start_autosave(autosave, shard.clone(), store.clone());

    handle.save_now().await.unwrap();
    assert!(store.has_save());
    handle.shutdown().await;
    assert!(handle.save_now().await.is_err());

    let (reloaded, _) = Shard::load(&config, &store).await.unwrap();
    assert_eq!(reloaded.world.item_count(), items);
}

#[tokio::test]
async fn on_demand_saves_archive_under_the_automatic_limit() {
    let tmp = tempdir().unwrap();
    let mut config = common::test_config(tmp.path());
    config.autosave.archive_previous = true;
    config.autosave.retention.automatic_count = 2;
    let store = Arc::new(SaveStore::open(config.data_dir()).await.unwrap());
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(8)).unwrap();

    let autosave = AutoSave::new(&config, &store).unwrap();
    let shard = Arc::new(Mutex::new(shard));
    let handle = start_autosave(autosave, shard.clone(), store.clone());
    for _ in 0..5 {
        handle.save_now().await.unwrap();
    }

    let manager = BackupManager::new(
        store.current_dir(),
        config.backup_dir(),
        config.autosave.retention.clone(),
    )
    .unwrap();
    let backups = manager.list_backups();
    assert_eq!(backups.len(), 2);
    assert!(backups
        .iter()
        .all(|b| b.backup_type == BackupType::Automatic));
    handle.shutdown().await;
}
