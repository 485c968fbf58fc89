//! # Storage
//!
//! On-disk home of a shard. [`SaveStore`] owns the data directory:
//!
//! ```text
//! data/
//! ├── .lock           ← held exclusively while a store is open
//! ├── current/        ← the latest complete world save
//! ├── accounts.bin    ← account registry
//! ├── firewall.cfg    ← one address or pattern per line
//! ├── backups/        ← tar.gz archives (see [`backup`])
//! └── Logs/Commands/  ← staff command log
//! ```
//!
//! A save is written to `staging/` and swapped in with two renames, so a crash
//! leaves either the old save or the new one, never a mix. A crash between the
//! renames leaves `previous/` behind, and the next open puts it back.

pub mod autosave;
pub mod backup;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{info, warn};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::persist::PersistError;
use crate::world::SaveImage;

const LOCK_FILE: &str = ".lock";
const CURRENT_DIR: &str = "current";
const STAGING_DIR: &str = "staging";
const PREVIOUS_DIR: &str = "previous";
pub const ACCOUNTS_FILE: &str = "accounts.bin";
pub const FIREWALL_FILE: &str = "firewall.cfg";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data directory {} is in use by another process", .0.display())]
    Locked(PathBuf),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Write `bytes` to `path` and flush them to the device.
pub async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Flush the entries of `dir` so renames into it survive a crash. Best effort.
pub async fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir).await {
        let _ = handle.sync_all().await;
    }
}

pub async fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        sync_dir(parent).await;
    }
}

pub struct SaveStore {
    root: PathBuf,
    _lock: File,
}

impl SaveStore {
    /// Open (creating if needed) the data directory and take its lock.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(root));
        }

        let store = Self { root, _lock: lock };
        store.recover().await?;
        Ok(store)
    }

    /// Undo a swap that stopped between its two renames.
    async fn recover(&self) -> Result<(), StoreError> {
        let current = self.current_dir();
        let previous = self.root.join(PREVIOUS_DIR);
        if previous.is_dir() {
            if current.is_dir() {
                fs::remove_dir_all(&previous).await?;
            } else {
                warn!("restoring {} left by an interrupted save", previous.display());
                fs::rename(&previous, &current).await?;
            }
        }
        let staging = self.root.join(STAGING_DIR);
        if staging.is_dir() {
            fs::remove_dir_all(&staging).await?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root.join(CURRENT_DIR)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.root.join(ACCOUNTS_FILE)
    }

    pub fn firewall_path(&self) -> PathBuf {
        self.root.join(FIREWALL_FILE)
    }

    pub fn has_save(&self) -> bool {
        self.current_dir().is_dir()
    }

    /// Write `image` and make it the current save.
    pub async fn save(&self, image: &SaveImage) -> Result<(), StoreError> {
        let staging = self.root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }
        image.write_to(&staging).await?;
        self.install(&staging).await?;
        info!("save of {} byte(s) is now current", image.total_bytes());
        Ok(())
    }

    /// Make the save at `dir` current, moving it into the store.
    pub async fn install(&self, dir: &Path) -> Result<(), StoreError> {
        let current = self.current_dir();
        let previous = self.root.join(PREVIOUS_DIR);
        if previous.exists() {
            fs::remove_dir_all(&previous).await?;
        }
        if current.exists() {
            fs::rename(&current, &previous).await?;
        }
        fs::rename(dir, &current).await?;
        sync_dir(&self.root).await;
        if previous.exists() {
            fs::remove_dir_all(&previous).await?;
            sync_dir(&self.root).await;
        }
        Ok(())
    }

    /// The current save, or `None` for a fresh data directory.
    pub async fn load(&self) -> Result<Option<SaveImage>, StoreError> {
        if !self.has_save() {
            return Ok(None);
        }
        Ok(Some(SaveImage::read_from(&self.current_dir()).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image(marker: u8) -> SaveImage {
        let mut image = SaveImage::default();
        for rel in crate::world::save::save_files() {
            image.insert(rel, vec![marker]);
        }
        image
    }

    #[tokio::test]
    async fn save_then_load_returns_the_same_bytes() {
        let temp = TempDir::new().unwrap();
        let store = SaveStore::open(temp.path()).await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        store.save(&image(1)).await.unwrap();
        store.save(&image(2)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(image(2)));
        assert!(!temp.path().join(STAGING_DIR).exists());
        assert!(!temp.path().join(PREVIOUS_DIR).exists());
    }

    #[tokio::test]
    async fn synced_writes_replace_the_whole_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("accounts.bin");
        write_synced(&path, b"a longer first version").await.unwrap();
        write_synced(&path, b"short").await.unwrap();
        sync_parent(&path).await;
        assert_eq!(std::fs::read(&path).unwrap(), b"short");
    }

    #[tokio::test]
    async fn second_open_is_refused() {
        let temp = TempDir::new().unwrap();
        let _store = SaveStore::open(temp.path()).await.unwrap();
        assert!(matches!(
            SaveStore::open(temp.path()).await,
            Err(StoreError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn interrupted_swap_is_rolled_back_on_open() {
        let temp = TempDir::new().unwrap();
        {
            let store = SaveStore::open(temp.path()).await.unwrap();
            store.save(&image(7)).await.unwrap();
        }
        std::fs::rename(temp.path().join(CURRENT_DIR), temp.path().join(PREVIOUS_DIR)).unwrap();

        let store = SaveStore::open(temp.path()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(image(7)));
    }

    #[tokio::test]
    async fn missing_stream_is_an_incomplete_save() {
        let temp = TempDir::new().unwrap();
        let store = SaveStore::open(temp.path()).await.unwrap();
        store.save(&image(1)).await.unwrap();
        std::fs::remove_file(store.current_dir().join("Mobiles/Mobiles.idx")).unwrap();
        assert!(matches!(
            store.load().await,
            Err(StoreError::Persist(PersistError::IncompleteSave(_)))
        ));
    }
}
