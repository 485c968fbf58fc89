//! Tamable animals and the creature layer shared with vendors.

use rand::Rng;

use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::world::entity::{clear_ref, Entity, Mobile, MobileCore};
use crate::world::props::{
    list_layers, parse_bool, parse_f64, parse_i32_in, set_on_layers, Properties, PropertyError,
};

pub const MAX_LOYALTY: i32 = 100;
pub const MAX_CONTROL_SLOTS: i32 = 5;

/// Creature layer.
///
/// - v0: `controlled, control_master, tamable, control_slots, min_tame_skill`
/// - v1: adds `loyalty` (default [`MAX_LOYALTY`])
#[derive(Debug, Clone, PartialEq)]
pub struct CreatureLayer {
    pub controlled: bool,
    pub control_master: Option<Serial>,
    pub tamable: bool,
    pub control_slots: i32,
    pub min_tame_skill: f64,
    pub loyalty: i32,
}

impl Default for CreatureLayer {
    fn default() -> Self {
        Self {
            controlled: false,
            control_master: None,
            tamable: false,
            control_slots: 1,
            min_tame_skill: 0.0,
            loyalty: MAX_LOYALTY,
        }
    }
}

impl CreatureLayer {
    /// Hand control to `master`, or release with `None`.
    pub fn set_control_master(&mut self, master: Option<Serial>) {
        self.controlled = master.is_some();
        self.control_master = master;
        self.loyalty = MAX_LOYALTY;
    }

    pub fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        let cleared = clear_ref(&mut self.control_master, live);
        if cleared > 0 {
            self.controlled = false;
        }
        cleared
    }
}

impl Layer for CreatureLayer {
    const NAME: &'static str = "Creature";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_bool(self.controlled);
        w.write_entity_ref(self.control_master);
        w.write_bool(self.tamable);
        w.write_i32(self.control_slots);
        w.write_f64(self.min_tame_skill);
        w.write_i32(self.loyalty);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, creature_v0), (1, creature_v1)]
    }
}

fn creature_v0(r: &mut GenericReader<'_>) -> Result<CreatureLayer, PersistError> {
    let controlled = r.read_bool()?;
    let control_master = r.read_entity_ref()?;
    if let Some(master) = control_master {
        if !master.is_mobile() {
            return Err(r.out_of_domain("control_master", master.value() as i64));
        }
    }
    let tamable = r.read_bool()?;
    let control_slots = r.read_i32()?;
    if !(0..=MAX_CONTROL_SLOTS).contains(&control_slots) {
        return Err(r.out_of_domain("control_slots", control_slots as i64));
    }
    let min_tame_skill = r.read_f64()?;
    if !min_tame_skill.is_finite() {
        return Err(r.out_of_domain("min_tame_skill", min_tame_skill as i64));
    }
    Ok(CreatureLayer {
        controlled,
        control_master,
        tamable,
        control_slots,
        min_tame_skill,
        loyalty: MAX_LOYALTY,
    })
}

fn creature_v1(r: &mut GenericReader<'_>) -> Result<CreatureLayer, PersistError> {
    let mut creature = creature_v0(r)?;
    let loyalty = r.read_i32()?;
    if !(0..=MAX_LOYALTY).contains(&loyalty) {
        return Err(r.out_of_domain("loyalty", loyalty as i64));
    }
    creature.loyalty = loyalty;
    Ok(creature)
}

impl Properties for CreatureLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Controlled", self.controlled.to_string()));
        out.push((
            "ControlMaster",
            self.control_master
                .map_or_else(|| "(-null-)".to_string(), |s| s.to_string()),
        ));
        out.push(("Tamable", self.tamable.to_string()));
        out.push(("ControlSlots", self.control_slots.to_string()));
        out.push(("MinTameSkill", format!("{:.1}", self.min_tame_skill)));
        out.push(("Loyalty", self.loyalty.to_string()));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "controlled" => self.controlled = parse_bool("Controlled", value)?,
            "tamable" => self.tamable = parse_bool("Tamable", value)?,
            "controlslots" => {
                self.control_slots = parse_i32_in("ControlSlots", value, 0..=MAX_CONTROL_SLOTS)?
            }
            "mintameskill" => self.min_tame_skill = parse_f64("MinTameSkill", value)?,
            "loyalty" => self.loyalty = parse_i32_in("Loyalty", value, 0..=MAX_LOYALTY)?,
            "controlmaster" => return Err(PropertyError::ReadOnly("ControlMaster")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimalKind {
    Bull,
    Panther,
}

impl AnimalKind {
    pub fn type_name(self) -> &'static str {
        match self {
            AnimalKind::Bull => "Bull",
            AnimalKind::Panther => "Panther",
        }
    }

    fn spawn(self, rng: &mut impl Rng) -> (MobileCore, CreatureLayer) {
        let mut mobile;
        let min_tame_skill;
        match self {
            AnimalKind::Bull => {
                mobile = MobileCore::new(if rng.gen_bool(0.5) { 0xE8 } else { 0xE9 })
                    .with_name("a bull");
                if rng.gen_bool(0.5) {
                    mobile.hue = 0x901;
                }
                mobile.str = rng.gen_range(77..=111);
                mobile.dex = rng.gen_range(56..=75);
                mobile.int = rng.gen_range(47..=75);
                mobile.hits = rng.gen_range(50..=64);
                mobile.fame = 600;
                min_tame_skill = 71.1;
            }
            AnimalKind::Panther => {
                mobile = MobileCore::new(0xD6).with_name("a panther");
                mobile.hue = 0x901;
                mobile.str = rng.gen_range(61..=85);
                mobile.dex = rng.gen_range(86..=105);
                mobile.int = rng.gen_range(26..=50);
                mobile.hits = rng.gen_range(37..=51);
                mobile.fame = 450;
                min_tame_skill = 53.1;
            }
        }
        let creature = CreatureLayer {
            tamable: true,
            control_slots: 1,
            min_tame_skill,
            ..CreatureLayer::default()
        };
        (mobile, creature)
    }
}

/// A tamable animal: mobile, creature, then a field-less type layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Animal {
    serial: Serial,
    kind: AnimalKind,
    pub mobile: MobileCore,
    pub creature: CreatureLayer,
}

impl Animal {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: AnimalKind, rng: &mut impl Rng) -> Self {
        let (mobile, creature) = kind.spawn(rng);
        Self {
            serial,
            kind,
            mobile,
            creature,
        }
    }

    pub fn kind(&self) -> AnimalKind {
        self.kind
    }

    pub fn decode(
        kind: AnimalKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let mobile = decode_layer(r)?;
        let creature = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        Ok(Self {
            serial,
            kind,
            mobile,
            creature,
        })
    }
}

impl Entity for Animal {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.mobile, w);
        encode_layer(&self.creature, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.mobile, &self.creature])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.mobile, &mut self.creature], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.creature.clear_dangling(live)
    }
}

impl Mobile for Animal {
    fn mobile(&self) -> &MobileCore {
        &self.mobile
    }

    fn mobile_mut(&mut self) -> &mut MobileCore {
        &mut self.mobile
    }
}

pub fn decode_bull(serial: Serial, r: &mut GenericReader<'_>) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Animal::decode(AnimalKind::Bull, serial, r)?))
}

pub fn decode_panther(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Animal::decode(AnimalKind::Panther, serial, r)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::validate_table;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn serial() -> Serial {
        Serial::new(0x0000_0100)
    }

    #[test]
    fn creature_table_is_valid() {
        validate_table::<CreatureLayer>().unwrap();
    }

    #[test]
    fn bull_stats_fall_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let bull = Animal::new(serial(), AnimalKind::Bull, &mut rng);
            assert!(matches!(bull.mobile.body, 0xE8 | 0xE9));
            assert!((77..=111).contains(&bull.mobile.str));
            assert!((50..=64).contains(&bull.mobile.hits));
            assert!(bull.creature.tamable);
            assert_eq!(bull.creature.min_tame_skill, 71.1);
        }
    }

    #[test]
    fn panther_round_trips() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut panther = Animal::new(serial(), AnimalKind::Panther, &mut rng);
        panther.creature.set_control_master(Some(Serial::new(0x1)));
        panther.creature.loyalty = 40;
        let mut w = GenericWriter::new();
        panther.serialize(&mut w);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let back = Animal::decode(AnimalKind::Panther, serial(), &mut r).unwrap();
        assert_eq!(back, panther);
    }

    #[test]
    fn creature_v0_gets_full_loyalty() {
        let mut w = GenericWriter::new();
        w.write_i32(0);
        w.write_bool(true);
        w.write_entity_ref(Some(Serial::new(0x2)));
        w.write_bool(true);
        w.write_i32(2);
        w.write_f64(53.1);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let creature: CreatureLayer = decode_layer(&mut r).unwrap();
        assert_eq!(creature.loyalty, MAX_LOYALTY);
        assert_eq!(creature.control_slots, 2);
        assert_eq!(creature.control_master, Some(Serial::new(0x2)));
    }

    #[test]
    fn dead_master_releases_pet() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut bull = Animal::new(serial(), AnimalKind::Bull, &mut rng);
        bull.creature.set_control_master(Some(Serial::new(0x7)));
        assert_eq!(bull.clear_dangling(&|_| false), 1);
        assert!(!bull.creature.controlled);
    }

    #[test]
    fn properties_reach_both_layers() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut bull = Animal::new(serial(), AnimalKind::Bull, &mut rng);
        bull.set_property("Fame", "1000").unwrap();
        bull.set_property("Loyalty", "50").unwrap();
        assert_eq!(bull.mobile.fame, 1000);
        assert_eq!(bull.creature.loyalty, 50);
        assert!(bull.set_property("Loyalty", "150").is_err());
        assert_eq!(
            bull.set_property("Wings", "2"),
            Err(PropertyError::Unknown("Wings".into()))
        );
    }
}
