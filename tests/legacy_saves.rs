//! Saves written by older schema versions load with documented defaults and
//! are rewritten at the current versions.

mod common;

use common::{bull_v0, fish_v0, legacy_image};
use shardkeep::persist::Serial;
use shardkeep::world::{LoadPolicy, World};

fn property(world: &World, serial: u32, name: &str) -> String {
    world
        .properties(Serial::new(serial))
        .unwrap()
        .into_iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("no property {}", name))
}

#[test]
fn version_zero_records_get_later_fields_defaulted() {
    let image = legacy_image(
        &[fish_v0(0x4000_0010, 25)],
        &[bull_v0(0x0000_0003, None)],
        &[],
    );
    let mut world = World::new().unwrap();
    let report = world.restore(&image, LoadPolicy::Abort).unwrap();

    assert_eq!(report.items_loaded, 1);
    assert_eq!(report.mobiles_loaded, 1);
    assert_eq!(report.migrated, 2);

    assert_eq!(property(&world, 0x4000_0010, "Amount"), "25");
    // a v0 stack predates quality; it must come back Regular, not Low
    assert_eq!(property(&world, 0x4000_0010, "Quality"), "Regular");
    assert_eq!(property(&world, 0x4000_0010, "LootType"), "Regular");

    assert_eq!(property(&world, 0x0000_0003, "Fame"), "0");
    assert_eq!(property(&world, 0x0000_0003, "Team"), "0");
    assert_eq!(property(&world, 0x0000_0003, "Loyalty"), "100");
}

#[test]
fn a_manifest_without_serials_still_protects_loaded_ones() {
    let image = legacy_image(
        &[fish_v0(0x4000_0200, 1)],
        &[bull_v0(0x0000_0040, None)],
        &[],
    );
    let mut world = World::new().unwrap();
    world.restore(&image, LoadPolicy::Abort).unwrap();

    assert!(world.next_item_serial().unwrap() > Serial::new(0x4000_0200));
    assert!(world.next_mobile_serial().unwrap() > Serial::new(0x0000_0040));
}

#[test]
fn resaving_writes_current_versions() {
    let image = legacy_image(
        &[fish_v0(0x4000_0001, 3)],
        &[bull_v0(0x0000_0001, None)],
        &[],
    );
    let mut world = World::new().unwrap();
    world.restore(&image, LoadPolicy::Abort).unwrap();
    let resaved = world.save_image();

    let mut again = World::new().unwrap();
    let report = again.restore(&resaved, LoadPolicy::Abort).unwrap();
    assert_eq!(report.migrated, 0);
    assert!(!report.has_older_versions());
    assert_eq!(
        again.properties(Serial::new(0x4000_0001)).unwrap(),
        world.properties(Serial::new(0x4000_0001)).unwrap()
    );
}

#[test]
fn dangling_master_is_cleared_on_load() {
    // the bull's master (mobile 0x99) is not in the save
    let image = legacy_image(&[], &[bull_v0(0x0000_0002, Some(0x99))], &[]);
    let mut world = World::new().unwrap();
    let report = world.restore(&image, LoadPolicy::Abort).unwrap();
    assert_eq!(report.dangling_cleared, 1);
    assert_eq!(property(&world, 0x0000_0002, "Controlled"), "false");
}

#[test]
fn an_old_manifest_alone_still_needs_a_rewrite() {
    let image = legacy_image(&[], &[], &[]);
    let mut world = World::new().unwrap();
    let report = world.restore(&image, LoadPolicy::Abort).unwrap();

    assert_eq!(report.migrated, 0);
    assert!(report.manifest_migrated);
    assert!(report.has_older_versions());

    let resaved = world.save_image();
    let report = World::new()
        .unwrap()
        .restore(&resaved, LoadPolicy::Abort)
        .unwrap();
    assert!(!report.manifest_migrated);
}
