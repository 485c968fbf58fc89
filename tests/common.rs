//! Test utilities & fixtures.
//! Builds throwaway configurations and hand-assembled save images.

#![allow(dead_code)]

use std::path::Path;

use chrono::Utc;
use crc::{Crc, CRC_32_ISO_HDLC};
use shardkeep::config::{AccountsConfig, Argon2Config, Config};
use shardkeep::persist::{GenericWriter, Serial};
use shardkeep::world::save::MANIFEST_FILE;
use shardkeep::world::SaveImage;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A configuration rooted in `dir`, with cheap password hashing and no log file.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.shard.name = "Test Shard".into();
    config.shard.data_dir = dir.join("data").to_string_lossy().into_owned();
    config.persistence.backup_dir = Some(dir.join("backups").to_string_lossy().into_owned());
    config.commands.log_dir = Some(dir.join("logs").to_string_lossy().into_owned());
    config.logging.file = None;
    config.accounts = AccountsConfig {
        argon2: Some(Argon2Config {
            memory_kib: Some(1024),
            time_cost: Some(1),
            parallelism: Some(1),
        }),
        ..AccountsConfig::default()
    };
    config
}

/// One record to place in a hand-built save.
pub struct RawRecord {
    pub type_name: &'static str,
    pub serial: Serial,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn new(type_name: &'static str, serial: u32, build: impl FnOnce(&mut GenericWriter)) -> Self {
        let mut w = GenericWriter::new();
        build(&mut w);
        Self {
            type_name,
            serial: Serial::new(serial),
            bytes: w.into_inner(),
        }
    }
}

/// Assemble the three streams of one category. `corrupt_crc` lists serials
/// whose index checksum is deliberately wrong.
fn category(dir: &str, records: &[RawRecord], corrupt_crc: &[u32], image: &mut SaveImage) {
    let mut types: Vec<&str> = Vec::new();
    let mut idx = GenericWriter::new();
    let mut bin = GenericWriter::new();
    idx.write_i32(records.len() as i32);
    for record in records {
        let type_index = match types.iter().position(|t| *t == record.type_name) {
            Some(i) => i,
            None => {
                types.push(record.type_name);
                types.len() - 1
            }
        };
        let mut crc = CRC.checksum(&record.bytes);
        if corrupt_crc.contains(&record.serial.value()) {
            crc ^= 0xDEAD_BEEF;
        }
        idx.write_i32(type_index as i32);
        idx.write_serial(record.serial);
        idx.write_i64(bin.position() as i64);
        idx.write_i32(record.bytes.len() as i32);
        idx.write_u32(crc);
        bin.write_bytes(&record.bytes);
    }
    let mut tdb = GenericWriter::new();
    tdb.write_i32(types.len() as i32);
    for name in types {
        tdb.write_str(name);
    }
    image.insert(format!("{dir}/{dir}.tdb"), tdb.into_inner());
    image.insert(format!("{dir}/{dir}.idx"), idx.into_inner());
    image.insert(format!("{dir}/{dir}.bin"), bin.into_inner());
}

/// A save image with a version-0 manifest (no serial pool), as written before
/// serials were persisted.
pub fn legacy_image(items: &[RawRecord], mobiles: &[RawRecord], corrupt_crc: &[u32]) -> SaveImage {
    let mut image = SaveImage::default();
    category("Items", items, corrupt_crc, &mut image);
    category("Mobiles", mobiles, corrupt_crc, &mut image);
    let mut meta = GenericWriter::new();
    meta.write_i32(0);
    meta.write_datetime(Utc::now());
    meta.write_i32(items.len() as i32);
    meta.write_i32(mobiles.len() as i32);
    image.insert(MANIFEST_FILE, meta.into_inner());
    image
}

/// Item base layer v0: no loot type.
pub fn item_core_v0(w: &mut GenericWriter, item_id: i32, parent: Option<u32>) {
    w.write_i32(0);
    w.write_i32(item_id);
    w.write_i32(0); // hue
    w.write_string(None);
    w.write_f64(1.0);
    w.write_i32(1495); // x
    w.write_i32(1629); // y
    w.write_i32(10); // z
    w.write_u8(0); // Felucca
    w.write_entity_ref(parent.map(Serial::new));
}

/// Mobile base layer v0: no fame, karma or team.
pub fn mobile_core_v0(w: &mut GenericWriter, name: &str, body: i32) {
    w.write_i32(0);
    w.write_string(Some(name));
    w.write_i32(body);
    w.write_i32(0); // hue
    w.write_i32(1500);
    w.write_i32(1630);
    w.write_i32(0);
    w.write_u8(0);
    for stat in [80, 60, 40, 80] {
        w.write_i32(stat);
    }
}

/// Creature layer v0: no loyalty.
pub fn creature_v0(w: &mut GenericWriter, master: Option<u32>) {
    w.write_i32(0);
    w.write_bool(master.is_some());
    w.write_entity_ref(master.map(Serial::new));
    w.write_bool(true);
    w.write_i32(1);
    w.write_f64(71.1);
}

/// A v0 Fish record: base v0, stack v0 (amount only), empty tail.
pub fn fish_v0(serial: u32, amount: i32) -> RawRecord {
    RawRecord::new("Fish", serial, |w| {
        item_core_v0(w, 0x09CC, None);
        w.write_i32(0);
        w.write_i32(amount);
        w.write_i32(0);
    })
}

/// A v0 Bull record: mobile v0, creature v0, empty tail.
pub fn bull_v0(serial: u32, master: Option<u32>) -> RawRecord {
    RawRecord::new("Bull", serial, |w| {
        mobile_core_v0(w, "a bull", 0xE8);
        creature_v0(w, master);
        w.write_i32(0);
    })
}
