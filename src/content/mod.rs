//! Concrete entity types and their catalog registrations.
//!
//! Every type here is a chain of layers: a base layer from [`crate::world::entity`],
//! zero or more shared layers (stack, armor, addon, boat, creature, vendor) and
//! a type layer of its own. Types with nothing of their own still write an empty
//! versioned type layer so they can grow fields later.

pub mod addons;
pub mod armor;
pub mod boats;
pub mod items;
pub mod mobiles;
pub mod vendors;

use rand::Rng;

use crate::persist::{Catalog, PersistError, Serial};
use crate::world::entity::{Item, Mobile};
use crate::world::geo::{Map, Point3D};
use crate::world::World;

use addons::{AddonDeed, AddonKind, Furniture, LoomSouthAddon};
use armor::{ArmorKind, LeatherArmor};
use boats::{Boat, BoatKind, BoatToken};
use items::{BallOfSummoning, PlainItem, PlainKind, StackItem, StackKind};
use mobiles::{Animal, AnimalKind};
use vendors::{Vendor, VendorKind};

pub fn register_items(catalog: &mut Catalog<dyn Item>) -> Result<(), PersistError> {
    catalog.register("Fish", items::decode_fish)?;
    catalog.register("Tourmaline", items::decode_tourmaline)?;
    catalog.register("DoorRekeyingContract", items::decode_door_rekeying_contract)?;
    catalog.register("CrystalCaveBarrier", items::decode_crystal_cave_barrier)?;
    catalog.register(BallOfSummoning::TYPE_NAME, items::decode_ball_of_summoning)?;
    catalog.register("LeatherArms", armor::decode_leather_arms)?;
    catalog.register("CorpseSkinArms", armor::decode_corpse_skin_arms)?;
    catalog.register("HellishArms", armor::decode_hellish_arms)?;
    catalog.register(LoomSouthAddon::TYPE_NAME, addons::decode_loom_south)?;
    catalog.register("DisplayCaseTinySouthAddon", addons::decode_display_case_tiny_south)?;
    catalog.register("DisplayCaseNarrowSouthAddon", addons::decode_display_case_narrow_south)?;
    catalog.register("LargeStoneTableEastAddon", addons::decode_large_stone_table_east)?;
    catalog.register(AddonDeed::TYPE_NAME, addons::decode_addon_deed)?;
    catalog.register("SmallDragonBoat", boats::decode_small_dragon_boat)?;
    catalog.register("LargeDragonBoat", boats::decode_large_dragon_boat)?;
    catalog.register("BoatDeed", boats::decode_boat_deed)?;
    catalog.register("DockedBoat", boats::decode_docked_boat)?;
    Ok(())
}

pub fn register_mobiles(catalog: &mut Catalog<dyn Mobile>) -> Result<(), PersistError> {
    catalog.register("Bull", mobiles::decode_bull)?;
    catalog.register("Panther", mobiles::decode_panther)?;
    catalog.register("Farmer", vendors::decode_farmer)?;
    catalog.register("OrcMerchant", vendors::decode_orc_merchant)?;
    catalog.register("InnKeeper", vendors::decode_inn_keeper)?;
    catalog.register("VarietyDealer", vendors::decode_variety_dealer)?;
    Ok(())
}

/// Catalogs holding every type in this module.
pub fn catalogs() -> Result<(Catalog<dyn Item>, Catalog<dyn Mobile>), PersistError> {
    let mut items = Catalog::new("items");
    register_items(&mut items)?;
    let mut mobiles = Catalog::new("mobiles");
    register_mobiles(&mut mobiles)?;
    Ok((items, mobiles))
}

/// Construct a fresh item of the named type, as the `add` command would.
pub fn create_item(name: &str, serial: Serial, rng: &mut impl Rng) -> Option<Box<dyn Item>> {
    let item: Box<dyn Item> = match name {
        "Fish" => Box::new(StackItem::new(serial, StackKind::Fish, 1, rng)),
        "Tourmaline" => Box::new(StackItem::new(serial, StackKind::Tourmaline, 1, rng)),
        "DoorRekeyingContract" => Box::new(PlainItem::new(serial, PlainKind::DoorRekeyingContract)),
        "CrystalCaveBarrier" => Box::new(PlainItem::new(serial, PlainKind::CrystalCaveBarrier)),
        "BallOfSummoning" => Box::new(BallOfSummoning::new(serial, rng)),
        "LeatherArms" => Box::new(LeatherArmor::new(serial, ArmorKind::LeatherArms, rng)),
        "CorpseSkinArms" => Box::new(LeatherArmor::new(serial, ArmorKind::CorpseSkinArms, rng)),
        "HellishArms" => Box::new(LeatherArmor::new(serial, ArmorKind::HellishArms, rng)),
        "LoomSouthAddon" => Box::new(LoomSouthAddon::new(serial)),
        "DisplayCaseTinySouthAddon" => {
            Box::new(Furniture::new(serial, AddonKind::DisplayCaseTinySouth, 0))
        }
        "DisplayCaseNarrowSouthAddon" => {
            Box::new(Furniture::new(serial, AddonKind::DisplayCaseNarrowSouth, 0))
        }
        "LargeStoneTableEastAddon" => {
            Box::new(Furniture::new(serial, AddonKind::LargeStoneTableEast, 0))
        }
        "AddonDeed" => Box::new(AddonDeed::new(serial, AddonKind::LoomSouth)),
        "SmallDragonBoat" => Box::new(Boat::new(serial, BoatKind::SmallDragon)),
        "LargeDragonBoat" => Box::new(Boat::new(serial, BoatKind::LargeDragon)),
        "BoatDeed" => Box::new(BoatToken::deed(serial, BoatKind::SmallDragon)),
        _ => return None,
    };
    Some(item)
}

pub fn create_mobile(name: &str, serial: Serial, rng: &mut impl Rng) -> Option<Box<dyn Mobile>> {
    let mobile: Box<dyn Mobile> = match name {
        "Bull" => Box::new(Animal::new(serial, AnimalKind::Bull, rng)),
        "Panther" => Box::new(Animal::new(serial, AnimalKind::Panther, rng)),
        "Farmer" => Box::new(Vendor::new(serial, VendorKind::Farmer, rng)),
        "OrcMerchant" => Box::new(Vendor::new(serial, VendorKind::OrcMerchant, rng)),
        "InnKeeper" => Box::new(Vendor::new(serial, VendorKind::InnKeeper, rng)),
        "VarietyDealer" => Box::new(Vendor::new(serial, VendorKind::VarietyDealer, rng)),
        _ => return None,
    };
    Some(mobile)
}

/// Populate `world` with one of every type around Britain's west bank, plus a
/// few cross references: a panther tamed by the farmer and a summoning ball,
/// carried by the farmer, linked to it.
pub fn seed_demo(world: &mut World, rng: &mut impl Rng) -> Result<usize, PersistError> {
    let origin = Point3D::new(1495, 1629, 10);
    let mut placed = 0;

    let mut farmer = None;
    for (i, name) in ["Bull", "Farmer", "OrcMerchant", "InnKeeper", "VarietyDealer"]
        .iter()
        .enumerate()
    {
        let serial = world.next_mobile_serial()?;
        if let Some(mut mobile) = create_mobile(name, serial, rng) {
            let core = mobile.mobile_mut();
            core.location = origin.offset(Point3D::new(i as i32 * 2, 4, 0));
            core.map = Map::Felucca;
            world.add_mobile(mobile)?;
            if *name == "Farmer" {
                farmer = Some(serial);
            }
            placed += 1;
        }
    }

    let pet = world.next_mobile_serial()?;
    let mut panther = Animal::new(pet, AnimalKind::Panther, rng);
    panther.mobile.location = origin.offset(Point3D::new(0, 6, 0));
    panther.mobile.map = Map::Felucca;
    panther.creature.set_control_master(farmer);
    world.add_mobile(Box::new(panther))?;
    placed += 1;

    let names = [
        "Fish",
        "Tourmaline",
        "DoorRekeyingContract",
        "CrystalCaveBarrier",
        "LeatherArms",
        "CorpseSkinArms",
        "HellishArms",
        "LoomSouthAddon",
        "DisplayCaseTinySouthAddon",
        "DisplayCaseNarrowSouthAddon",
        "LargeStoneTableEastAddon",
        "AddonDeed",
        "LargeDragonBoat",
        "BoatDeed",
    ];
    for (i, name) in names.iter().enumerate() {
        let serial = world.next_item_serial()?;
        if let Some(mut item) = create_item(name, serial, rng) {
            let core = item.item_mut();
            core.location = origin.offset(Point3D::new(i as i32, 0, 0));
            core.map = Map::Felucca;
            world.add_item(item)?;
            placed += 1;
        }
    }

    let serial = world.next_item_serial()?;
    let mut ball = BallOfSummoning::new(serial, rng);
    ball.item.map = Map::Felucca;
    ball.item.location = origin;
    // carried by the panther's owner
    ball.item.parent = farmer;
    ball.link_pet(pet, Some("a panther"));
    world.add_item(Box::new(ball))?;
    placed += 1;

    log::info!("seeded {} demo entities", placed);
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_registered_item_can_be_created() {
        let (items, mobiles) = catalogs().expect("catalogs");
        let mut rng = StdRng::seed_from_u64(1);
        for name in items.names() {
            if name == "DockedBoat" {
                continue;
            }
            let item = create_item(name, Serial::new(0x4000_0001), &mut rng)
                .unwrap_or_else(|| panic!("no constructor for {}", name));
            assert_eq!(item.type_name(), name);
        }
        for name in mobiles.names() {
            let mobile = create_mobile(name, Serial::new(0x1), &mut rng)
                .unwrap_or_else(|| panic!("no constructor for {}", name));
            assert_eq!(mobile.type_name(), name);
        }
    }

    #[test]
    fn registering_twice_is_rejected() {
        let (mut items, _) = catalogs().expect("catalogs");
        assert!(matches!(
            register_items(&mut items),
            Err(PersistError::DuplicateType(name)) if name == "Fish"
        ));
    }
}
