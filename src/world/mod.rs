//! The world: every live entity plus the serial allocator.
//!
//! [`World`] replaces the ambient global entity tables of a classic shard
//! server. It is an ordinary value; the running shard holds it behind a mutex
//! and saves take that lock for their whole duration.

pub mod dupe;
pub mod entity;
pub mod geo;
pub mod props;
pub mod save;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::persist::{Catalog, PersistError, Serial, SerialPool};
use entity::{Item, Mobile};
use props::PropertyError;

pub use save::{LoadPolicy, LoadReport, SaveImage, SkippedRecord, WorldManifest};

pub struct World {
    items: BTreeMap<Serial, Box<dyn Item>>,
    mobiles: BTreeMap<Serial, Box<dyn Mobile>>,
    serials: SerialPool,
    item_types: Catalog<dyn Item>,
    mobile_types: Catalog<dyn Mobile>,
    last_saved: Option<DateTime<Utc>>,
}

impl World {
    /// An empty world that knows every type in [`crate::content`].
    pub fn new() -> Result<Self, PersistError> {
        let (items, mobiles) = crate::content::catalogs()?;
        Ok(Self::with_catalogs(items, mobiles))
    }

    pub fn with_catalogs(item_types: Catalog<dyn Item>, mobile_types: Catalog<dyn Mobile>) -> Self {
        Self {
            items: BTreeMap::new(),
            mobiles: BTreeMap::new(),
            serials: SerialPool::new(),
            item_types,
            mobile_types,
            last_saved: None,
        }
    }

    pub fn item_types(&self) -> &Catalog<dyn Item> {
        &self.item_types
    }

    pub fn mobile_types(&self) -> &Catalog<dyn Mobile> {
        &self.mobile_types
    }

    pub fn serials(&self) -> &SerialPool {
        &self.serials
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn next_item_serial(&mut self) -> Result<Serial, PersistError> {
        self.serials.next_item()
    }

    pub fn next_mobile_serial(&mut self) -> Result<Serial, PersistError> {
        self.serials.next_mobile()
    }

    pub fn add_item(&mut self, item: Box<dyn Item>) -> Result<Serial, PersistError> {
        let serial = item.serial();
        if !serial.is_item() {
            return Err(PersistError::WrongCategory(serial, "item"));
        }
        if self.items.contains_key(&serial) {
            return Err(PersistError::DuplicateSerial(serial));
        }
        self.serials.observe(serial);
        self.items.insert(serial, item);
        Ok(serial)
    }

    pub fn add_mobile(&mut self, mobile: Box<dyn Mobile>) -> Result<Serial, PersistError> {
        let serial = mobile.serial();
        if !serial.is_mobile() {
            return Err(PersistError::WrongCategory(serial, "mobile"));
        }
        if self.mobiles.contains_key(&serial) {
            return Err(PersistError::DuplicateSerial(serial));
        }
        self.serials.observe(serial);
        self.mobiles.insert(serial, mobile);
        Ok(serial)
    }

    pub fn item(&self, serial: Serial) -> Option<&dyn Item> {
        self.items.get(&serial).map(|b| b.as_ref())
    }

    pub fn item_mut(&mut self, serial: Serial) -> Option<&mut (dyn Item + 'static)> {
        self.items.get_mut(&serial).map(|b| b.as_mut())
    }

    pub fn mobile(&self, serial: Serial) -> Option<&dyn Mobile> {
        self.mobiles.get(&serial).map(|b| b.as_ref())
    }

    pub fn mobile_mut(&mut self, serial: Serial) -> Option<&mut (dyn Mobile + 'static)> {
        self.mobiles.get_mut(&serial).map(|b| b.as_mut())
    }

    pub fn items(&self) -> impl Iterator<Item = &dyn Item> + '_ {
        self.items.values().map(|b| b.as_ref())
    }

    pub fn mobiles(&self) -> impl Iterator<Item = &dyn Mobile> + '_ {
        self.mobiles.values().map(|b| b.as_ref())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn mobile_count(&self) -> usize {
        self.mobiles.len()
    }

    pub fn is_live(&self, serial: Serial) -> bool {
        self.items.contains_key(&serial) || self.mobiles.contains_key(&serial)
    }

    /// Remove an entity and everything parented to it. Serials of removed
    /// entities are retired. Returns how many entities were removed.
    pub fn delete(&mut self, serial: Serial) -> usize {
        let mut pending = vec![serial];
        let mut removed = 0;
        while let Some(next) = pending.pop() {
            let gone = self.items.remove(&next).is_some() || self.mobiles.remove(&next).is_some();
            if !gone {
                continue;
            }
            self.serials.retire(next);
            removed += 1;
            pending.extend(
                self.items
                    .values()
                    .filter(|item| item.item().parent == Some(next))
                    .map(|item| item.serial()),
            );
        }
        if removed > 0 {
            debug!("deleted {} ({} entities)", serial, removed);
        }
        removed
    }

    /// Clear every reference to an entity that is no longer in the world.
    pub fn clear_dangling(&mut self) -> usize {
        let live: BTreeSet<Serial> = self
            .items
            .keys()
            .chain(self.mobiles.keys())
            .copied()
            .collect();
        let is_live = |serial: Serial| live.contains(&serial);
        let mut cleared = 0;
        for item in self.items.values_mut() {
            cleared += item.clear_dangling(&is_live);
        }
        for mobile in self.mobiles.values_mut() {
            cleared += mobile.clear_dangling(&is_live);
        }
        if cleared > 0 {
            info!("cleared {} dangling reference(s)", cleared);
        }
        cleared
    }

    pub fn properties(&self, serial: Serial) -> Result<Vec<(&'static str, String)>, PropertyError> {
        if let Some(item) = self.items.get(&serial) {
            return Ok(item.properties());
        }
        if let Some(mobile) = self.mobiles.get(&serial) {
            return Ok(mobile.properties());
        }
        Err(PropertyError::NoSuchEntity(serial.to_string()))
    }

    pub fn set_property(&mut self, serial: Serial, name: &str, value: &str) -> Result<(), PropertyError> {
        if let Some(item) = self.items.get_mut(&serial) {
            return item.set_property(name, value);
        }
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            return mobile.set_property(name, value);
        }
        Err(PropertyError::NoSuchEntity(serial.to_string()))
    }

    pub(crate) fn replace_contents(
        &mut self,
        items: BTreeMap<Serial, Box<dyn Item>>,
        mobiles: BTreeMap<Serial, Box<dyn Mobile>>,
        serials: SerialPool,
        last_saved: Option<DateTime<Utc>>,
    ) {
        self.items = items;
        self.mobiles = mobiles;
        self.serials = serials;
        self.last_saved = last_saved;
    }

    pub(crate) fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.last_saved = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::items::{BallOfSummoning, PlainItem, PlainKind};
    use crate::content::mobiles::{Animal, AnimalKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn world() -> World {
        World::new().expect("world")
    }

    #[test]
    fn entities_must_use_their_own_serial_range() {
        let mut world = world();
        let contract = PlainItem::new(Serial::new(0x10), PlainKind::DoorRekeyingContract);
        assert!(matches!(
            world.add_item(Box::new(contract)),
            Err(PersistError::WrongCategory(_, "item"))
        ));
        let serial = world.next_item_serial().unwrap();
        world
            .add_item(Box::new(PlainItem::new(serial, PlainKind::DoorRekeyingContract)))
            .unwrap();
        assert!(matches!(
            world.add_item(Box::new(PlainItem::new(serial, PlainKind::CrystalCaveBarrier))),
            Err(PersistError::DuplicateSerial(s)) if s == serial
        ));
    }

    #[test]
    fn deleted_serials_are_never_reissued() {
        let mut world = world();
        let first = world.next_item_serial().unwrap();
        world
            .add_item(Box::new(PlainItem::new(first, PlainKind::CrystalCaveBarrier)))
            .unwrap();
        assert_eq!(world.delete(first), 1);
        assert!(!world.is_live(first));
        let second = world.next_item_serial().unwrap();
        assert!(second.value() > first.value());
    }

    #[test]
    fn delete_removes_contained_items() {
        let mut world = world();
        let bag = world.next_item_serial().unwrap();
        world
            .add_item(Box::new(PlainItem::new(bag, PlainKind::CrystalCaveBarrier)))
            .unwrap();
        let inner = world.next_item_serial().unwrap();
        let mut contract = PlainItem::new(inner, PlainKind::DoorRekeyingContract);
        contract.item.parent = Some(bag);
        world.add_item(Box::new(contract)).unwrap();

        assert_eq!(world.delete(bag), 2);
        assert_eq!(world.item_count(), 0);
    }

    #[test]
    fn dangling_pet_links_are_cleared() {
        let mut world = world();
        let mut rng = StdRng::seed_from_u64(9);
        let pet = world.next_mobile_serial().unwrap();
        world
            .add_mobile(Box::new(Animal::new(pet, AnimalKind::Panther, &mut rng)))
            .unwrap();
        let serial = world.next_item_serial().unwrap();
        let mut ball = BallOfSummoning::new(serial, &mut rng);
        ball.link_pet(pet, Some("Shadow"));
        world.add_item(Box::new(ball)).unwrap();

        assert_eq!(world.clear_dangling(), 0);
        world.delete(pet);
        assert_eq!(world.clear_dangling(), 1);
        let props = world.properties(serial).unwrap();
        assert!(props.contains(&("Pet", "(-null-)".to_string())));
    }

    #[test]
    fn property_edits_reach_the_entity() {
        let mut world = world();
        let serial = world.next_item_serial().unwrap();
        world
            .add_item(Box::new(PlainItem::new(serial, PlainKind::DoorRekeyingContract)))
            .unwrap();
        world.set_property(serial, "Hue", "0x481").unwrap();
        assert_eq!(world.item(serial).unwrap().item().hue, 0x481);
        assert_eq!(
            world.set_property(Serial::new(0x4000_9999), "Hue", "1"),
            Err(PropertyError::NoSuchEntity("0x40009999".to_string()))
        );
    }
}
