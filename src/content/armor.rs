//! Leather armor pieces and the shared armor layer.

use rand::Rng;

use crate::content::items::ItemQuality;
use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::wire_enum;
use crate::world::entity::{clear_ref, Entity, Item, ItemCore};
use crate::world::props::{
    list_layers, parse_enum, parse_i32_in, set_on_layers, Properties, PropertyError,
};

wire_enum! {
    pub enum ArmorProtectionLevel {
        Regular = 0,
        Defense = 1,
        Guarding = 2,
        Hardening = 3,
        Fortification = 4,
        Invulnerability = 5,
    }
}

wire_enum! {
    pub enum ArmorDurabilityLevel {
        Regular = 0,
        Durable = 1,
        Substantial = 2,
        Massive = 3,
        Fortified = 4,
        Indestructible = 5,
    }
}

wire_enum! {
    /// Material an item was crafted from. `None` only appears transiently while
    /// decoding records that predate the resource field.
    pub enum CraftResource {
        None = 0,
        Iron = 1,
        DullCopper = 2,
        ShadowIron = 3,
        Copper = 4,
        Bronze = 5,
        Gold = 6,
        Agapite = 7,
        Verite = 8,
        Valorite = 9,
        RegularLeather = 101,
        SpinedLeather = 102,
        HornedLeather = 103,
        BarbedLeather = 104,
    }
}

pub const MAX_ARMOR_HITS: i32 = 255;

/// Armor layer.
///
/// - v0: `hits, max_hits, quality, crafter`
/// - v1: adds `protection, durability` (default `Regular`)
/// - v2: adds `resource`; older records decode as [`CraftResource::None`] and
///   the concrete type substitutes its own default resource
#[derive(Debug, Clone, PartialEq)]
pub struct ArmorLayer {
    pub hits: i32,
    pub max_hits: i32,
    pub quality: ItemQuality,
    pub crafter: Option<Serial>,
    pub protection: ArmorProtectionLevel,
    pub durability: ArmorDurabilityLevel,
    pub resource: CraftResource,
}

impl Layer for ArmorLayer {
    const NAME: &'static str = "Armor";
    const VERSION: u32 = 2;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_i32(self.hits);
        w.write_i32(self.max_hits);
        w.write_enum(self.quality);
        w.write_entity_ref(self.crafter);
        w.write_enum(self.protection);
        w.write_enum(self.durability);
        w.write_enum(self.resource);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, armor_v0), (1, armor_v1), (2, armor_v2)]
    }
}

fn armor_v0(r: &mut GenericReader<'_>) -> Result<ArmorLayer, PersistError> {
    let hits = r.read_i32()?;
    let max_hits = r.read_i32()?;
    if !(0..=MAX_ARMOR_HITS).contains(&max_hits) {
        return Err(r.out_of_domain("max_hits", max_hits as i64));
    }
    if !(0..=max_hits).contains(&hits) {
        return Err(r.out_of_domain("hits", hits as i64));
    }
    let quality = r.read_enum()?;
    let crafter = r.read_entity_ref()?;
    Ok(ArmorLayer {
        hits,
        max_hits,
        quality,
        crafter,
        protection: ArmorProtectionLevel::Regular,
        durability: ArmorDurabilityLevel::Regular,
        resource: CraftResource::None,
    })
}

fn armor_v1(r: &mut GenericReader<'_>) -> Result<ArmorLayer, PersistError> {
    let mut armor = armor_v0(r)?;
    armor.protection = r.read_enum()?;
    armor.durability = r.read_enum()?;
    Ok(armor)
}

fn armor_v2(r: &mut GenericReader<'_>) -> Result<ArmorLayer, PersistError> {
    let mut armor = armor_v1(r)?;
    armor.resource = r.read_enum()?;
    Ok(armor)
}

impl Properties for ArmorLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("HitPoints", self.hits.to_string()));
        out.push(("MaxHitPoints", self.max_hits.to_string()));
        out.push(("Quality", format!("{:?}", self.quality)));
        out.push((
            "Crafter",
            self.crafter.map_or_else(|| "(-null-)".to_string(), |s| s.to_string()),
        ));
        out.push(("ProtectionLevel", format!("{:?}", self.protection)));
        out.push(("Durability", format!("{:?}", self.durability)));
        out.push(("Resource", format!("{:?}", self.resource)));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "hitpoints" => {
                self.hits = parse_i32_in("HitPoints", value, 0..=self.max_hits)?;
            }
            "maxhitpoints" => {
                self.max_hits = parse_i32_in("MaxHitPoints", value, 0..=MAX_ARMOR_HITS)?;
                self.hits = self.hits.min(self.max_hits);
            }
            "quality" => self.quality = parse_enum("Quality", value)?,
            "protectionlevel" => self.protection = parse_enum("ProtectionLevel", value)?,
            "durability" => self.durability = parse_enum("Durability", value)?,
            "resource" => {
                let resource: CraftResource = parse_enum("Resource", value)?;
                if resource == CraftResource::None {
                    return Err(PropertyError::Invalid {
                        name: "Resource",
                        value: value.to_string(),
                        reason: "armor must have a resource".into(),
                    });
                }
                self.resource = resource;
            }
            "crafter" => return Err(PropertyError::ReadOnly("Crafter")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    LeatherArms,
    CorpseSkinArms,
    HellishArms,
}

impl ArmorKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ArmorKind::LeatherArms => "LeatherArms",
            ArmorKind::CorpseSkinArms => "CorpseSkinArms",
            ArmorKind::HellishArms => "HellishArms",
        }
    }

    pub fn default_resource(self) -> CraftResource {
        CraftResource::RegularLeather
    }

    fn init_hits(self) -> (i32, i32) {
        (30, 40)
    }
}

/// Weight every leather sleeve should have; records saved with the old 1.0
/// stone weight are corrected on load.
const ARMS_WEIGHT: f64 = 2.0;
const LEGACY_ARMS_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LeatherArmor {
    serial: Serial,
    kind: ArmorKind,
    pub item: ItemCore,
    pub armor: ArmorLayer,
}

impl LeatherArmor {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: ArmorKind, rng: &mut impl Rng) -> Self {
        let (min_hits, max_hits) = kind.init_hits();
        let hits = rng.gen_range(min_hits..=max_hits);
        let mut item = ItemCore::new(0x13CD).with_weight(ARMS_WEIGHT);
        let mut armor = ArmorLayer {
            hits,
            max_hits: hits,
            quality: ItemQuality::Regular,
            crafter: None,
            protection: ArmorProtectionLevel::Regular,
            durability: ArmorDurabilityLevel::Regular,
            resource: kind.default_resource(),
        };
        let named = match kind {
            ArmorKind::LeatherArms => None,
            ArmorKind::CorpseSkinArms => Some(("Corpse Skin Arms", 2101)),
            ArmorKind::HellishArms => Some(("Hellish Arms", 1645)),
        };
        if let Some((name, hue)) = named {
            item = item.with_name(name).with_hue(hue);
            armor.protection = ArmorProtectionLevel::Guarding;
            armor.durability = ArmorDurabilityLevel::Massive;
            if rng.gen_bool(0.20) {
                armor.quality = ItemQuality::Exceptional;
            }
        }
        Self {
            serial,
            kind,
            item,
            armor,
        }
    }

    pub fn kind(&self) -> ArmorKind {
        self.kind
    }

    pub fn decode(
        kind: ArmorKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let mut item: ItemCore = decode_layer(r)?;
        let mut armor: ArmorLayer = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        if armor.resource == CraftResource::None {
            armor.resource = kind.default_resource();
        }
        if item.weight == LEGACY_ARMS_WEIGHT {
            item.weight = ARMS_WEIGHT;
        }
        Ok(Self {
            serial,
            kind,
            item,
            armor,
        })
    }
}

impl Entity for LeatherArmor {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.armor, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.armor])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.armor], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        clear_ref(&mut self.armor.crafter, live) + self.item.clear_dangling(live)
    }
}

impl Item for LeatherArmor {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

pub fn decode_leather_arms(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(LeatherArmor::decode(ArmorKind::LeatherArms, serial, r)?))
}

pub fn decode_corpse_skin_arms(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(LeatherArmor::decode(ArmorKind::CorpseSkinArms, serial, r)?))
}

pub fn decode_hellish_arms(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(LeatherArmor::decode(ArmorKind::HellishArms, serial, r)?))
}
