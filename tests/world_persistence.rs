//! Save a populated world through the store and load it back.

mod common;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use shardkeep::content::seed_demo;
use shardkeep::persist::Serial;
use shardkeep::services::Shard;
use shardkeep::storage::SaveStore;
use shardkeep::world::entity::{Entity, Item};
use shardkeep::world::World;
use tempfile::tempdir;

fn snapshot(world: &World) -> BTreeMap<Serial, (String, Vec<(&'static str, String)>)> {
    let mut out = BTreeMap::new();
    for item in world.items() {
        out.insert(
            item.serial(),
            (item.type_name().to_string(), item.properties()),
        );
    }
    for mobile in world.mobiles() {
        out.insert(
            mobile.serial(),
            (mobile.type_name().to_string(), mobile.properties()),
        );
    }
    out
}

#[tokio::test]
async fn seeded_world_survives_save_and_reload() {
    let tmp = tempdir().unwrap();
    let config = common::test_config(tmp.path());

    let before = {
        let store = SaveStore::open(config.data_dir()).await.unwrap();
        let (mut shard, report) = Shard::load(&config, &store).await.unwrap();
        assert!(report.is_none());
        let created = seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(42)).unwrap();
        assert!(created > 0);
        shard.save(&store).await.unwrap();
        snapshot(&shard.world)
    };

    let store = SaveStore::open(config.data_dir()).await.unwrap();
    let (shard, report) = Shard::load(&config, &store).await.unwrap();
    let report = report.unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.migrated, 0);
    assert_eq!(report.dangling_cleared, 0);
    assert_eq!(snapshot(&shard.world), before);
}

#[tokio::test]
async fn deleted_serials_are_not_reissued_after_reload() {
    let tmp = tempdir().unwrap();
    let config = common::test_config(tmp.path());

    let (deleted_item, deleted_mobile) = {
        let store = SaveStore::open(config.data_dir()).await.unwrap();
        let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
        seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(7)).unwrap();

        let newest_item = shard.world.items().map(|i| i.serial()).max().unwrap();
        let newest_mobile = shard.world.mobiles().map(|m| m.serial()).max().unwrap();
        assert!(shard.world.delete(newest_item) >= 1);
        assert!(shard.world.delete(newest_mobile) >= 1);
        shard.save(&store).await.unwrap();
        (newest_item, newest_mobile)
    };

    let store = SaveStore::open(config.data_dir()).await.unwrap();
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    assert!(!shard.world.is_live(deleted_item));
    assert!(shard.world.serials().was_issued(deleted_item));

    let next_item = shard.world.next_item_serial().unwrap();
    let next_mobile = shard.world.next_mobile_serial().unwrap();
    assert!(next_item > deleted_item);
    assert!(next_mobile > deleted_mobile);
}

#[tokio::test]
async fn deleting_a_mobile_takes_its_carried_items() {
    let tmp = tempdir().unwrap();
    let config = common::test_config(tmp.path());
    let store = SaveStore::open(config.data_dir()).await.unwrap();
    let (mut shard, _) = Shard::load(&config, &store).await.unwrap();
    seed_demo(&mut shard.world, &mut StdRng::seed_from_u64(1)).unwrap();

    let (carrier, carried) = shard
        .world
        .items()
        .find_map(|i| {
            i.item()
                .parent
                .filter(|p| p.is_mobile())
                .map(|p| (p, i.serial()))
        })
        .expect("demo world has an item carried by a mobile");
    let removed = shard.world.delete(carrier);
    assert!(removed >= 2);
    assert!(!shard.world.is_live(carried));
    // the farmer's tamed panther still names it as master
    assert_eq!(shard.world.clear_dangling(), 1);

    shard.save(&store).await.unwrap();
    let (reloaded, report) = Shard::load(&config, &store).await.unwrap();
    assert_eq!(report.unwrap().dangling_cleared, 0);
    assert_eq!(reloaded.world.item_count(), shard.world.item_count());
}
