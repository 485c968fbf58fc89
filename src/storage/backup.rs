//! Save archives.
//!
//! An archive is a tar.gz of the current save directory, stored under `save/`
//! inside the tarball, plus a SHA-256 of the compressed file. The catalog of
//! archives lives in `backups.json` beside them.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};
use thiserror::Error;

use crate::world::save::MANIFEST_FILE;

/// Directory the save sits under inside every archive.
pub const ARCHIVE_ROOT: &str = "save";
const CATALOG_FILE: &str = "backups.json";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("backup catalog is unreadable: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("there is no save at {}", .0.display())]
    NoSave(PathBuf),

    #[error("no backup named '{0}'")]
    NotFound(String),

    #[error("archive for backup '{0}' is missing")]
    MissingArchive(String),

    #[error("backup '{0}' does not match its checksum")]
    ChecksumMismatch(String),

    #[error("backup '{0}' does not contain a world save")]
    NotASave(String),

    #[error("manual backup '{0}' is kept by the retention policy")]
    Protected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub backup_type: BackupType,
    /// Compressed size on disk.
    pub size_bytes: u64,
    /// Size of the save before compression.
    pub save_bytes: u64,
    pub files: usize,
    /// Hex SHA-256 of the archive file.
    pub checksum: String,
    pub verified: bool,
    /// Archive file, relative to the backup directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupType {
    /// Made by an operator.
    Manual,
    /// Made by autosave before overwriting the previous save.
    Automatic,
    /// Made by the final save at shutdown.
    Shutdown,
}

impl BackupType {
    /// Prefix of generated archive names.
    pub fn prefix(self) -> &'static str {
        match self {
            BackupType::Manual => "manual",
            BackupType::Automatic => "auto",
            BackupType::Shutdown => "shutdown",
        }
    }
}

/// How many archives of each kind to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub automatic_count: usize,
    pub shutdown_count: usize,
    /// Never prune or delete manual archives.
    pub keep_manual: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            automatic_count: 24,
            shutdown_count: 7,
            keep_manual: true,
        }
    }
}

impl RetentionPolicy {
    /// Archives of `kind` to keep, or `None` for no limit.
    pub fn limit(&self, kind: BackupType) -> Option<usize> {
        match kind {
            BackupType::Automatic => Some(self.automatic_count),
            BackupType::Shutdown => Some(self.shutdown_count),
            BackupType::Manual => None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BackupStats {
    pub total_backups: usize,
    pub total_size_bytes: u64,
    pub manual_count: usize,
    pub automatic_count: usize,
    pub shutdown_count: usize,
    pub verified_count: usize,
    pub latest_backup: Option<DateTime<Utc>>,
}

/// Archives of one save directory.
pub struct BackupManager {
    save_path: PathBuf,
    backup_path: PathBuf,
    retention: RetentionPolicy,
    /// Keyed by id; ids sort by creation time.
    backups: BTreeMap<String, BackupMetadata>,
}

impl BackupManager {
    pub fn new(save_path: PathBuf, backup_path: PathBuf, retention: RetentionPolicy) -> Result<Self, BackupError> {
        fs::create_dir_all(&backup_path)?;
        let catalog = backup_path.join(CATALOG_FILE);
        let backups = if catalog.exists() {
            serde_json::from_slice(&fs::read(&catalog)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            save_path,
            backup_path,
            retention,
            backups,
        })
    }

    pub fn set_retention(&mut self, retention: RetentionPolicy) {
        self.retention = retention;
    }

    fn write_catalog(&self) -> Result<(), BackupError> {
        let tmp = self.backup_path.join(format!("{}.tmp", CATALOG_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(&self.backups)?)?;
        fs::rename(&tmp, self.backup_path.join(CATALOG_FILE))?;
        Ok(())
    }

    fn next_id(&self, kind: BackupType, at: DateTime<Utc>) -> String {
        let base = format!("{}-{}", kind.prefix(), at.format("%Y%m%dT%H%M%S%3f"));
        let mut id = base.clone();
        let mut n = 2;
        while self.backups.contains_key(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    /// Archive the save directory.
    pub fn create_backup(&mut self, name: Option<String>, backup_type: BackupType) -> Result<BackupMetadata, BackupError> {
        if !self.save_path.join(MANIFEST_FILE).is_file() {
            return Err(BackupError::NoSave(self.save_path.clone()));
        }
        let created_at = Utc::now();
        let id = self.next_id(backup_type, created_at);
        let file_name = PathBuf::from(format!("{}.tar.gz", id));
        let target = self.backup_path.join(&file_name);
        let partial = target.with_extension("part");

        let (files, save_bytes) = tree_size(&self.save_path)?;
        let mut tar = Builder::new(GzEncoder::new(File::create(&partial)?, Compression::default()));
        tar.append_dir_all(ARCHIVE_ROOT, &self.save_path)?;
        tar.into_inner()?.finish()?.sync_all()?;
        fs::rename(&partial, &target)?;

        let metadata = BackupMetadata {
            id: id.clone(),
            name,
            created_at,
            backup_type,
            size_bytes: fs::metadata(&target)?.len(),
            save_bytes,
            files,
            checksum: sha256_file(&target)?,
            verified: false,
            path: file_name,
        };
        self.backups.insert(id, metadata.clone());
        self.write_catalog()?;
        info!(
            "backup {} created: {} file(s), {} -> {} bytes",
            metadata.id, files, save_bytes, metadata.size_bytes
        );
        Ok(metadata)
    }

    fn archive_file(&self, backup_id: &str) -> Result<(PathBuf, &BackupMetadata), BackupError> {
        let meta = self
            .backups
            .get(backup_id)
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;
        let file = self.backup_path.join(&meta.path);
        if !file.is_file() {
            return Err(BackupError::MissingArchive(backup_id.to_string()));
        }
        Ok((file, meta))
    }

    /// Recompute an archive's checksum. A match marks it verified.
    pub fn verify_backup(&mut self, backup_id: &str) -> Result<bool, BackupError> {
        let (file, meta) = self.archive_file(backup_id)?;
        let intact = sha256_file(&file)? == meta.checksum;
        if !intact {
            warn!("backup {} failed verification", backup_id);
            return Ok(false);
        }
        if let Some(meta) = self.backups.get_mut(backup_id) {
            if !meta.verified {
                meta.verified = true;
                self.write_catalog()?;
            }
        }
        debug!("backup {} verified", backup_id);
        Ok(true)
    }

    /// Unpack an archive under `restore_path` and return the save directory
    /// inside it, ready for [`SaveStore::install`](super::SaveStore::install).
    pub fn restore_backup(&self, backup_id: &str, restore_path: &Path) -> Result<PathBuf, BackupError> {
        let (file, meta) = self.archive_file(backup_id)?;
        if sha256_file(&file)? != meta.checksum {
            return Err(BackupError::ChecksumMismatch(backup_id.to_string()));
        }
        if restore_path.exists() {
            fs::remove_dir_all(restore_path)?;
        }
        fs::create_dir_all(restore_path)?;
        Archive::new(GzDecoder::new(File::open(&file)?)).unpack(restore_path)?;

        let save = restore_path.join(ARCHIVE_ROOT);
        if !save.join(MANIFEST_FILE).is_file() {
            return Err(BackupError::NotASave(backup_id.to_string()));
        }
        info!("backup {} unpacked to {}", backup_id, save.display());
        Ok(save)
    }

    /// Prune the oldest archives beyond each kind's limit. Returns the ids removed.
    pub fn apply_retention_policy(&mut self) -> Result<Vec<String>, BackupError> {
        let mut doomed = Vec::new();
        for kind in [BackupType::Automatic, BackupType::Shutdown, BackupType::Manual] {
            let Some(keep) = self.retention.limit(kind) else {
                continue;
            };
            // ids ascend with time, so newest are last
            let ids: Vec<&String> = self
                .backups
                .values()
                .filter(|m| m.backup_type == kind)
                .map(|m| &m.id)
                .collect();
            let excess = ids.len().saturating_sub(keep);
            doomed.extend(ids.into_iter().take(excess).cloned());
        }
        for id in &doomed {
            self.remove(id)?;
        }
        if !doomed.is_empty() {
            self.write_catalog()?;
        }
        Ok(doomed)
    }

    fn remove(&mut self, backup_id: &str) -> Result<(), BackupError> {
        if let Some(meta) = self.backups.remove(backup_id) {
            let file = self.backup_path.join(&meta.path);
            if file.exists() {
                fs::remove_file(&file)?;
            }
            info!("backup {} deleted", backup_id);
        }
        Ok(())
    }

    /// All backups, newest first.
    pub fn list_backups(&self) -> Vec<BackupMetadata> {
        let mut list: Vec<_> = self.backups.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        list
    }

    pub fn get_backup(&self, backup_id: &str) -> Option<&BackupMetadata> {
        self.backups.get(backup_id)
    }

    pub fn delete_backup(&mut self, backup_id: &str) -> Result<(), BackupError> {
        let meta = self
            .backups
            .get(backup_id)
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;
        if meta.backup_type == BackupType::Manual && self.retention.keep_manual {
            return Err(BackupError::Protected(backup_id.to_string()));
        }
        self.remove(backup_id)?;
        self.write_catalog()
    }

    pub fn get_stats(&self) -> BackupStats {
        self.backups.values().fold(BackupStats::default(), |mut stats, m| {
            stats.total_backups += 1;
            stats.total_size_bytes += m.size_bytes;
            match m.backup_type {
                BackupType::Manual => stats.manual_count += 1,
                BackupType::Automatic => stats.automatic_count += 1,
                BackupType::Shutdown => stats.shutdown_count += 1,
            }
            stats.verified_count += m.verified as usize;
            stats.latest_backup = stats.latest_backup.max(Some(m.created_at));
            stats
        })
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// File count and total bytes under `dir`.
fn tree_size(dir: &Path) -> io::Result<(usize, u64)> {
    let mut files = 0;
    let mut bytes = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            let (f, b) = tree_size(&entry.path())?;
            files += f;
            bytes += b;
        } else {
            files += 1;
            bytes += meta.len();
        }
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_save(path: &Path) {
        fs::create_dir_all(path.join("Items")).unwrap();
        fs::write(path.join(MANIFEST_FILE), b"\x01\x00\x00\x00").unwrap();
        fs::write(path.join("Items/Items.bin"), b"record bytes").unwrap();
    }

    fn manager(temp: &TempDir, retention: RetentionPolicy) -> BackupManager {
        let save_path = temp.path().join("current");
        write_save(&save_path);
        BackupManager::new(save_path, temp.path().join("backups"), retention).unwrap()
    }

    #[test]
    fn archive_verify_and_restore() {
        let temp = TempDir::new().unwrap();
        let mut backups = manager(&temp, RetentionPolicy::default());

        let meta = backups
            .create_backup(Some("before patch".to_string()), BackupType::Manual)
            .unwrap();
        assert!(meta.id.starts_with("manual-"));
        assert_eq!(meta.files, 2);
        assert_eq!(meta.save_bytes, 16);
        assert!(backups.verify_backup(&meta.id).unwrap());
        assert!(backups.get_backup(&meta.id).unwrap().verified);

        let restored = backups
            .restore_backup(&meta.id, &temp.path().join("restore"))
            .unwrap();
        assert_eq!(fs::read(restored.join("Items/Items.bin")).unwrap(), b"record bytes");

        // the catalog survives reopening
        let reopened = BackupManager::new(
            temp.path().join("current"),
            temp.path().join("backups"),
            RetentionPolicy::default(),
        )
        .unwrap();
        assert!(reopened.get_backup(&meta.id).unwrap().verified);
    }

    #[test]
    fn nothing_to_archive_without_a_save() {
        let temp = TempDir::new().unwrap();
        let mut backups = BackupManager::new(
            temp.path().join("nothing"),
            temp.path().join("backups"),
            RetentionPolicy::default(),
        )
        .unwrap();
        assert!(matches!(
            backups.create_backup(None, BackupType::Manual),
            Err(BackupError::NoSave(_))
        ));
    }

    #[test]
    fn tampered_archive_is_refused() {
        let temp = TempDir::new().unwrap();
        let mut backups = manager(&temp, RetentionPolicy::default());
        let meta = backups.create_backup(None, BackupType::Manual).unwrap();
        let file = temp.path().join("backups").join(&meta.path);
        let mut bytes = fs::read(&file).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&file, bytes).unwrap();

        assert!(!backups.verify_backup(&meta.id).unwrap());
        assert!(matches!(
            backups.restore_backup(&meta.id, &temp.path().join("restore")),
            Err(BackupError::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn retention_prunes_oldest_and_spares_manual() {
        let temp = TempDir::new().unwrap();
        let policy = RetentionPolicy {
            automatic_count: 2,
            shutdown_count: 1,
            keep_manual: true,
        };
        let mut backups = manager(&temp, policy);

        let first = backups.create_backup(None, BackupType::Automatic).unwrap();
        for _ in 0..3 {
            backups.create_backup(None, BackupType::Automatic).unwrap();
        }
        let manual = backups.create_backup(None, BackupType::Manual).unwrap();
        assert_eq!(backups.list_backups().len(), 5);

        let deleted = backups.apply_retention_policy().unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(deleted.contains(&first.id));
        let stats = backups.get_stats();
        assert_eq!(stats.automatic_count, 2);
        assert_eq!(stats.manual_count, 1);

        assert!(matches!(
            backups.delete_backup(&manual.id),
            Err(BackupError::Protected(_))
        ));
    }
}
