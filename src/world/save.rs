//! World save images and the stop-the-world load.
//!
//! A save is a small set of files:
//!
//! ```text
//! <save>/
//! ├── world.meta          ← manifest: time, counts, serial high-water marks
//! ├── Items/
//! │   ├── Items.tdb       ← [count:i32][type name]*
//! │   ├── Items.idx       ← [count:i32] then [type:i32][serial:i32][offset:i64][len:i32][crc32:u32]*
//! │   └── Items.bin       ← records, back to back
//! └── Mobiles/            ← same three files for mobiles
//! ```
//!
//! Records carry no type tag or serial; both live in the index. Saving builds
//! a [`SaveImage`] in memory, and [`crate::storage::SaveStore`] puts it on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use crc::{Crc, CRC_32_ISO_HDLC};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::persist::{
    decode_layer, decode_record, decode_record_upgraded, encode_layer, encode_record, Catalog,
    CorruptKind, Decoder, GenericReader, GenericWriter, Layer, PersistError, Serial, SerialPool,
};
use crate::persist;
use crate::storage::{sync_dir, write_synced};
use crate::world::entity::Entity;
use crate::world::World;

pub const MANIFEST_FILE: &str = "world.meta";

const RECORD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// On-disk streams of one entity category.
#[derive(Debug, Clone, Copy)]
struct Category {
    name: &'static str,
    dir: &'static str,
}

const ITEMS: Category = Category {
    name: "items",
    dir: "Items",
};

const MOBILES: Category = Category {
    name: "mobiles",
    dir: "Mobiles",
};

impl Category {
    fn path(self, ext: &str) -> String {
        format!("{}/{}.{}", self.dir, self.dir, ext)
    }
}

/// Every file a complete save consists of, relative to the save directory.
pub fn save_files() -> Vec<String> {
    let mut files = vec![MANIFEST_FILE.to_string()];
    for category in [ITEMS, MOBILES] {
        for ext in ["tdb", "idx", "bin"] {
            files.push(category.path(ext));
        }
    }
    files
}

/// The bytes of one save, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveImage {
    files: BTreeMap<String, Vec<u8>>,
}

impl SaveImage {
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.keys().map(|k| k.as_str())
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(|v| v.len()).sum()
    }

    fn require(&self, path: &str) -> Result<&[u8], PersistError> {
        self.get(path)
            .ok_or_else(|| PersistError::IncompleteSave(format!("missing {}", path)))
    }

    /// Write every file under `dir`, creating subdirectories as needed.
    /// Files and directories are synced before this returns.
    pub async fn write_to(&self, dir: &Path) -> Result<(), PersistError> {
        let mut dirs = BTreeSet::new();
        dirs.insert(dir.to_path_buf());
        for (rel, bytes) in &self.files {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
                dirs.insert(parent.to_path_buf());
            }
            write_synced(&path, bytes).await?;
        }
        // deepest first, so each new entry is durable before its parent
        for d in dirs.iter().rev() {
            sync_dir(d).await;
        }
        debug!("wrote {} save file(s) to {}", self.files.len(), dir.display());
        Ok(())
    }

    /// Read a complete save from `dir`. A missing stream is [`PersistError::IncompleteSave`].
    pub async fn read_from(dir: &Path) -> Result<Self, PersistError> {
        let mut image = SaveImage::default();
        for rel in save_files() {
            let path = dir.join(&rel);
            match fs::read(&path).await {
                Ok(bytes) => image.insert(rel, bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(PersistError::IncompleteSave(format!(
                        "missing {}",
                        path.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(image)
    }
}

/// Save-wide metadata, stored as a versioned record in `world.meta`.
///
/// - v0: `saved_at, item_count, mobile_count`
/// - v1: adds the serial pool (default: empty pool; loading raises it past
///   every indexed serial anyway)
#[derive(Debug, Clone, PartialEq)]
pub struct WorldManifest {
    pub saved_at: DateTime<Utc>,
    pub item_count: usize,
    pub mobile_count: usize,
    pub serials: SerialPool,
}

impl Layer for WorldManifest {
    const NAME: &'static str = "WorldManifest";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_datetime(self.saved_at);
        w.write_i32(self.item_count as i32);
        w.write_i32(self.mobile_count as i32);
        encode_layer(&self.serials, w);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, manifest_v0), (1, manifest_v1)]
    }
}

fn read_total(r: &mut GenericReader<'_>, field: &'static str) -> Result<usize, PersistError> {
    let value = r.read_i32()?;
    if value < 0 {
        return Err(r.out_of_domain(field, value as i64));
    }
    Ok(value as usize)
}

fn manifest_v0(r: &mut GenericReader<'_>) -> Result<WorldManifest, PersistError> {
    let saved_at = r.read_datetime()?;
    let item_count = read_total(r, "item_count")?;
    let mobile_count = read_total(r, "mobile_count")?;
    Ok(WorldManifest {
        saved_at,
        item_count,
        mobile_count,
        serials: SerialPool::new(),
    })
}

fn manifest_v1(r: &mut GenericReader<'_>) -> Result<WorldManifest, PersistError> {
    let mut manifest = manifest_v0(r)?;
    manifest.serials = decode_layer(r)?;
    Ok(manifest)
}

/// What to do with an entity whose record cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Fail the whole load.
    #[default]
    Abort,
    /// Leave the entity out and retire its serial.
    Skip,
}

impl FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(LoadPolicy::Abort),
            "skip" => Ok(LoadPolicy::Skip),
            other => Err(format!("unknown load policy '{}' (expected abort or skip)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub serial: Serial,
    pub type_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub items_loaded: usize,
    pub mobiles_loaded: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Entities with at least one layer decoded from an older version.
    pub migrated: usize,
    /// `world.meta` was written at an older version.
    pub manifest_migrated: bool,
    pub dangling_cleared: usize,
    pub saved_at: Option<DateTime<Utc>>,
}

impl LoadReport {
    /// Saving again would change the bytes on disk.
    pub fn has_older_versions(&self) -> bool {
        self.migrated > 0 || self.manifest_migrated
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    type_index: usize,
    serial: Serial,
    offset: usize,
    len: usize,
    crc: u32,
}

fn encode_category<'a, E>(entities: impl Iterator<Item = &'a E>) -> (Vec<u8>, Vec<u8>, Vec<u8>)
where
    E: Entity + ?Sized + 'a,
{
    let mut types: Vec<&'static str> = Vec::new();
    let mut entries = Vec::new();
    let mut bin = GenericWriter::new();
    let mut record = GenericWriter::new();

    for entity in entities {
        let name = entity.type_name();
        let type_index = match types.iter().position(|t| *t == name) {
            Some(i) => i,
            None => {
                types.push(name);
                types.len() - 1
            }
        };
        record.clear();
        entity.serialize(&mut record);
        entries.push(IndexEntry {
            type_index,
            serial: entity.serial(),
            offset: bin.position(),
            len: record.position(),
            crc: RECORD_CRC.checksum(record.as_slice()),
        });
        bin.write_bytes(record.as_slice());
    }

    let mut tdb = GenericWriter::new();
    tdb.write_i32(types.len() as i32);
    for name in &types {
        tdb.write_str(name);
    }

    let mut idx = GenericWriter::with_capacity(4 + entries.len() * 24);
    idx.write_i32(entries.len() as i32);
    for entry in &entries {
        idx.write_i32(entry.type_index as i32);
        idx.write_serial(entry.serial);
        idx.write_i64(entry.offset as i64);
        idx.write_i32(entry.len as i32);
        idx.write_u32(entry.crc);
    }

    (tdb.into_inner(), idx.into_inner(), bin.into_inner())
}

fn read_type_database(bytes: &[u8]) -> Result<Vec<String>, PersistError> {
    let mut r = GenericReader::new(bytes);
    r.enter_layer("TypeDatabase");
    let count = read_total(&mut r, "type count")?;
    let mut names = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        match r.read_string()? {
            Some(name) => names.push(name),
            None => return Err(r.out_of_domain("type name", -1)),
        }
    }
    r.expect_end()?;
    Ok(names)
}

fn read_index(bytes: &[u8], types: usize, bin_len: usize) -> Result<Vec<IndexEntry>, PersistError> {
    let mut r = GenericReader::new(bytes);
    r.enter_layer("Index");
    let count = read_total(&mut r, "entry count")?;
    let mut entries = Vec::with_capacity(count.min(bytes.len() / 24));
    for _ in 0..count {
        let type_index = r.read_i32()?;
        if type_index < 0 || type_index as usize >= types {
            return Err(r.out_of_domain("type index", type_index as i64));
        }
        let serial = r.read_serial()?;
        let offset = r.read_i64()?;
        let len = r.read_i32()?;
        if offset < 0 || len < 0 || offset as u64 + len as u64 > bin_len as u64 {
            return Err(r.out_of_domain("record extent", offset));
        }
        let crc = r.read_u32()?;
        entries.push(IndexEntry {
            type_index: type_index as usize,
            serial,
            offset: offset as usize,
            len: len as usize,
            crc,
        });
    }
    r.expect_end()?;
    Ok(entries)
}

/// Decode one record; any failure is wrapped with the entity's identity.
fn decode_entity<T: ?Sized>(
    catalog: &Catalog<T>,
    type_name: &str,
    entry: &IndexEntry,
    bytes: &[u8],
) -> Result<(Box<T>, bool), PersistError> {
    let wrap = |source: PersistError| PersistError::Entity {
        serial: entry.serial,
        type_name: type_name.to_string(),
        source: Box::new(source),
    };
    let found = RECORD_CRC.checksum(bytes);
    if found != entry.crc {
        return Err(wrap(PersistError::corrupt(
            "record",
            0,
            CorruptKind::ChecksumMismatch {
                expected: entry.crc,
                found,
            },
        )));
    }
    let mut r = GenericReader::new(bytes);
    let entity = catalog
        .decode(type_name, entry.serial, &mut r)
        .map_err(wrap)?;
    r.expect_end().map_err(wrap)?;
    Ok((entity, r.upgraded_layers() > 0))
}

fn load_category<T: ?Sized>(
    image: &SaveImage,
    category: Category,
    catalog: &Catalog<T>,
    in_range: fn(Serial) -> bool,
    policy: LoadPolicy,
    serials: &mut SerialPool,
    report: &mut LoadReport,
) -> Result<BTreeMap<Serial, Box<T>>, PersistError> {
    let tdb = image.require(&category.path("tdb"))?;
    let idx = image.require(&category.path("idx"))?;
    let bin = image.require(&category.path("bin"))?;

    let types = read_type_database(tdb)?;
    let entries = read_index(idx, types.len(), bin.len())?;

    let mut loaded = BTreeMap::new();
    for entry in &entries {
        if !in_range(entry.serial) {
            return Err(PersistError::WrongCategory(entry.serial, category.name));
        }
        if loaded.contains_key(&entry.serial) {
            return Err(PersistError::DuplicateSerial(entry.serial));
        }
        // Failed records keep their serial dead too.
        serials.observe(entry.serial);

        let type_name = &types[entry.type_index];
        let bytes = &bin[entry.offset..entry.offset + entry.len];
        match decode_entity(catalog, type_name, entry, bytes) {
            Ok((entity, upgraded)) => {
                if upgraded {
                    report.migrated += 1;
                }
                loaded.insert(entry.serial, entity);
            }
            Err(err) if policy == LoadPolicy::Skip => {
                warn!("skipping {}: {}", entry.serial, err);
                serials.retire(entry.serial);
                report.skipped.push(SkippedRecord {
                    serial: entry.serial,
                    type_name: type_name.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    debug!(
        "{}: {} of {} record(s) loaded across {} type(s)",
        category.name,
        loaded.len(),
        entries.len(),
        types.len()
    );
    Ok(loaded)
}

fn check_count(category: Category, listed: usize, indexed: usize) -> Result<(), PersistError> {
    if listed != indexed {
        return Err(PersistError::IncompleteSave(format!(
            "manifest lists {} {} but the index holds {}",
            listed, category.name, indexed
        )));
    }
    Ok(())
}

impl World {
    /// Serialize the whole world. Stop-the-world: takes `&mut self` so nothing
    /// mutates while records are written.
    pub fn save_image(&mut self) -> SaveImage {
        let saved_at = persist::now();
        let manifest = WorldManifest {
            saved_at,
            item_count: self.item_count(),
            mobile_count: self.mobile_count(),
            serials: self.serials().clone(),
        };

        let mut image = SaveImage::default();
        let (tdb, idx, bin) = encode_category(self.items());
        image.insert(ITEMS.path("tdb"), tdb);
        image.insert(ITEMS.path("idx"), idx);
        image.insert(ITEMS.path("bin"), bin);
        let (tdb, idx, bin) = encode_category(self.mobiles());
        image.insert(MOBILES.path("tdb"), tdb);
        image.insert(MOBILES.path("idx"), idx);
        image.insert(MOBILES.path("bin"), bin);
        image.insert(MANIFEST_FILE, encode_record(&manifest));

        self.mark_saved(saved_at);
        info!(
            "saved {} item(s) and {} mobile(s), {} byte(s)",
            manifest.item_count,
            manifest.mobile_count,
            image.total_bytes()
        );
        image
    }

    /// Replace the world's contents with a save image. Nothing changes unless
    /// the load succeeds as a whole under `policy`.
    pub fn restore(&mut self, image: &SaveImage, policy: LoadPolicy) -> Result<LoadReport, PersistError> {
        let (manifest, manifest_upgrades): (WorldManifest, usize) =
            decode_record_upgraded(image.require(MANIFEST_FILE)?)?;
        let mut serials = manifest.serials.clone();
        let mut report = LoadReport {
            saved_at: Some(manifest.saved_at),
            manifest_migrated: manifest_upgrades > 0,
            ..LoadReport::default()
        };

        let items = load_category(
            image,
            ITEMS,
            self.item_types(),
            Serial::is_item,
            policy,
            &mut serials,
            &mut report,
        )?;
        let mobiles = load_category(
            image,
            MOBILES,
            self.mobile_types(),
            Serial::is_mobile,
            policy,
            &mut serials,
            &mut report,
        )?;
        check_count(ITEMS, manifest.item_count, items.len() + skipped(&report, Serial::is_item))?;
        check_count(
            MOBILES,
            manifest.mobile_count,
            mobiles.len() + skipped(&report, Serial::is_mobile),
        )?;

        report.items_loaded = items.len();
        report.mobiles_loaded = mobiles.len();
        self.replace_contents(items, mobiles, serials, Some(manifest.saved_at));
        report.dangling_cleared = self.clear_dangling();

        info!(
            "loaded {} item(s), {} mobile(s); {} migrated, {} skipped",
            report.items_loaded,
            report.mobiles_loaded,
            report.migrated,
            report.skipped.len()
        );
        Ok(report)
    }
}

fn skipped(report: &LoadReport, in_range: fn(Serial) -> bool) -> usize {
    report.skipped.iter().filter(|s| in_range(s.serial)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::items::{StackItem, StackKind};
    use crate::persist::validate_table;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stocked_world() -> (World, Serial) {
        let mut world = World::new().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let serial = world.next_item_serial().unwrap();
        world
            .add_item(Box::new(StackItem::new(serial, StackKind::Tourmaline, 12, &mut rng)))
            .unwrap();
        (world, serial)
    }

    #[test]
    fn manifest_table_is_valid() {
        validate_table::<WorldManifest>().unwrap();
    }

    #[test]
    fn manifest_v0_has_an_empty_serial_pool() {
        let mut w = GenericWriter::new();
        w.write_i32(0);
        w.write_datetime(Utc::now());
        w.write_i32(3);
        w.write_i32(1);
        let manifest: WorldManifest = decode_record(&w.into_inner()).unwrap();
        assert_eq!(manifest.item_count, 3);
        assert_eq!(manifest.serials, SerialPool::new());
    }

    #[test]
    fn image_restores_into_a_fresh_world() {
        let (mut world, serial) = stocked_world();
        let image = world.save_image();
        assert!(world.last_saved().is_some());

        let mut copy = World::new().unwrap();
        let report = copy.restore(&image, LoadPolicy::Abort).unwrap();
        assert_eq!(report.items_loaded, 1);
        assert_eq!(report.migrated, 0);
        assert_eq!(copy.item(serial).unwrap().amount(), 12);
        assert_eq!(copy.serials(), world.serials());
    }

    #[test]
    fn flipped_byte_is_a_checksum_mismatch() {
        let (mut world, serial) = stocked_world();
        let mut image = world.save_image();
        let mut bin = image.get("Items/Items.bin").unwrap().to_vec();
        bin[5] ^= 0xFF;
        image.insert("Items/Items.bin", bin);

        let mut copy = World::new().unwrap();
        let err = copy.restore(&image, LoadPolicy::Abort).unwrap_err();
        assert!(matches!(
            err.corrupt_kind(),
            Some(CorruptKind::ChecksumMismatch { .. })
        ));

        let report = copy.restore(&image, LoadPolicy::Skip).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].serial, serial);
        assert!(copy.serials().was_issued(serial));
    }

    #[test]
    fn failed_restore_leaves_the_world_untouched() {
        let (mut world, serial) = stocked_world();
        let mut image = world.save_image();
        image.insert("Items/Items.tdb", vec![1, 0, 0, 0]);
        assert!(world.restore(&image, LoadPolicy::Skip).is_err());
        assert!(world.is_live(serial));
    }

    #[test]
    fn load_policy_parses_from_text() {
        assert_eq!("Skip".parse::<LoadPolicy>(), Ok(LoadPolicy::Skip));
        assert_eq!(" abort ".parse::<LoadPolicy>(), Ok(LoadPolicy::Abort));
        assert!("retry".parse::<LoadPolicy>().is_err());
    }
}
