//! Entity traits and the two base layers every entity starts with.
//!
//! A concrete type is a struct holding its serial plus one field per layer.
//! `serialize` writes the layers base-first; the type's catalog constructor
//! decodes them in the same order. The serial itself lives in the save index,
//! not in the record.

use std::fmt;

use crate::persist::{Decoder, GenericReader, GenericWriter, Layer, PersistError, Serial};
use crate::wire_enum;
use crate::world::geo::{Map, Point3D};
use crate::world::props::{
    parse_enum, parse_f64, parse_i32, parse_i32_in, parse_opt_string, parse_point, show_opt,
    Properties, PropertyError,
};

/// Behaviour shared by every persistent entity.
pub trait Entity: Send + fmt::Debug {
    fn serial(&self) -> Serial;

    /// Catalog name of the concrete type.
    fn type_name(&self) -> &'static str;

    /// Write every layer, base first.
    fn serialize(&self, w: &mut GenericWriter);

    fn properties(&self) -> Vec<(&'static str, String)>;

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError>;

    /// Drop references to entities for which `live` is false. Returns how many
    /// references were cleared.
    fn clear_dangling(&mut self, _live: &dyn Fn(Serial) -> bool) -> usize {
        0
    }
}

pub trait Item: Entity {
    fn item(&self) -> &ItemCore;

    fn item_mut(&mut self) -> &mut ItemCore;

    fn amount(&self) -> i32 {
        1
    }
}

pub trait Mobile: Entity {
    fn mobile(&self) -> &MobileCore;

    fn mobile_mut(&mut self) -> &mut MobileCore;
}

/// Clear `slot` if it points at a dead entity.
pub fn clear_ref(slot: &mut Option<Serial>, live: &dyn Fn(Serial) -> bool) -> usize {
    match *slot {
        Some(serial) if !live(serial) => {
            *slot = None;
            1
        }
        _ => 0,
    }
}

wire_enum! {
    pub enum LootType {
        Regular = 0,
        Newbied = 1,
        Blessed = 2,
        Cursed = 3,
    }
}

impl Default for LootType {
    fn default() -> Self {
        LootType::Regular
    }
}

/// Base item layer.
///
/// - v0: `item_id, hue, name, weight, location, map, parent`
/// - v1: adds `loot_type` (default [`LootType::Regular`])
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCore {
    pub item_id: i32,
    pub hue: i32,
    pub name: Option<String>,
    pub weight: f64,
    pub loot_type: LootType,
    pub location: Point3D,
    pub map: Map,
    /// Container or mobile holding this item; `None` when it lies in the world.
    pub parent: Option<Serial>,
}

impl ItemCore {
    pub fn new(item_id: i32) -> Self {
        Self {
            item_id,
            hue: 0,
            name: None,
            weight: 1.0,
            loot_type: LootType::Regular,
            location: Point3D::ZERO,
            map: Map::Internal,
            parent: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_hue(mut self, hue: i32) -> Self {
        self.hue = hue;
        self
    }

    pub fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        clear_ref(&mut self.parent, live)
    }
}

impl Layer for ItemCore {
    const NAME: &'static str = "Item";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_i32(self.item_id);
        w.write_i32(self.hue);
        w.write_string(self.name.as_deref());
        w.write_f64(self.weight);
        w.write_point3d(self.location);
        w.write_map(self.map);
        w.write_entity_ref(self.parent);
        w.write_enum(self.loot_type);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, item_core_v0), (1, item_core_v1)]
    }
}

fn item_core_v0(r: &mut GenericReader<'_>) -> Result<ItemCore, PersistError> {
    let item_id = r.read_i32()?;
    if !(0..=0xFFFF).contains(&item_id) {
        return Err(r.out_of_domain("item_id", item_id as i64));
    }
    let hue = r.read_i32()?;
    let name = r.read_string()?;
    let weight = r.read_f64()?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(r.out_of_domain("weight", weight as i64));
    }
    let location = r.read_point3d()?;
    let map = r.read_map()?;
    let parent = r.read_entity_ref()?;
    Ok(ItemCore {
        item_id,
        hue,
        name,
        weight,
        loot_type: LootType::Regular,
        location,
        map,
        parent,
    })
}

fn item_core_v1(r: &mut GenericReader<'_>) -> Result<ItemCore, PersistError> {
    let mut core = item_core_v0(r)?;
    core.loot_type = r.read_enum()?;
    Ok(core)
}

impl Properties for ItemCore {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("ItemID", format!("0x{:X}", self.item_id)));
        out.push(("Name", show_opt(&self.name)));
        out.push(("Hue", self.hue.to_string()));
        out.push(("Weight", self.weight.to_string()));
        out.push(("LootType", format!("{:?}", self.loot_type)));
        out.push(("Location", self.location.to_string()));
        out.push(("Map", format!("{:?}", self.map)));
        out.push((
            "Parent",
            self.parent.map_or_else(|| "(-null-)".to_string(), |s| s.to_string()),
        ));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "itemid" => self.item_id = parse_i32_in("ItemID", value, 0..=0xFFFF)?,
            "name" => self.name = parse_opt_string(value),
            "hue" => self.hue = parse_i32("Hue", value)?,
            "weight" => {
                let weight = parse_f64("Weight", value)?;
                if weight < 0.0 {
                    return Err(PropertyError::Invalid {
                        name: "Weight",
                        value: value.to_string(),
                        reason: "must not be negative".into(),
                    });
                }
                self.weight = weight;
            }
            "loottype" => self.loot_type = parse_enum("LootType", value)?,
            "location" => self.location = parse_point("Location", value)?,
            "map" => self.map = parse_enum("Map", value)?,
            "parent" => return Err(PropertyError::ReadOnly("Parent")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

/// Base mobile layer.
///
/// - v0: `name, body, hue, location, map, str, dex, int, hits`
/// - v1: adds `fame, karma` (default 0)
/// - v2: adds `team` (default 0)
#[derive(Debug, Clone, PartialEq)]
pub struct MobileCore {
    pub name: Option<String>,
    pub body: i32,
    pub hue: i32,
    pub location: Point3D,
    pub map: Map,
    pub str: i32,
    pub dex: i32,
    pub int: i32,
    pub hits: i32,
    pub fame: i32,
    pub karma: i32,
    pub team: i32,
    /// Overhead name colour; derived at runtime, never persisted. `-1` means
    /// the client default.
    pub name_hue: i32,
}

impl MobileCore {
    pub fn new(body: i32) -> Self {
        Self {
            name: None,
            body,
            hue: 0,
            location: Point3D::ZERO,
            map: Map::Internal,
            str: 0,
            dex: 0,
            int: 0,
            hits: 0,
            fame: 0,
            karma: 0,
            team: 0,
            name_hue: -1,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

const MAX_STAT: i32 = 65_000;

impl Layer for MobileCore {
    const NAME: &'static str = "Mobile";
    const VERSION: u32 = 2;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_string(self.name.as_deref());
        w.write_i32(self.body);
        w.write_i32(self.hue);
        w.write_point3d(self.location);
        w.write_map(self.map);
        w.write_i32(self.str);
        w.write_i32(self.dex);
        w.write_i32(self.int);
        w.write_i32(self.hits);
        w.write_i32(self.fame);
        w.write_i32(self.karma);
        w.write_i32(self.team);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, mobile_core_v0), (1, mobile_core_v1), (2, mobile_core_v2)]
    }
}

fn read_stat(r: &mut GenericReader<'_>, field: &'static str) -> Result<i32, PersistError> {
    let value = r.read_i32()?;
    if !(0..=MAX_STAT).contains(&value) {
        return Err(r.out_of_domain(field, value as i64));
    }
    Ok(value)
}

fn mobile_core_v0(r: &mut GenericReader<'_>) -> Result<MobileCore, PersistError> {
    let name = r.read_string()?;
    let body = r.read_i32()?;
    let hue = r.read_i32()?;
    let location = r.read_point3d()?;
    let map = r.read_map()?;
    let str = read_stat(r, "str")?;
    let dex = read_stat(r, "dex")?;
    let int = read_stat(r, "int")?;
    let hits = read_stat(r, "hits")?;
    Ok(MobileCore {
        name,
        body,
        hue,
        location,
        map,
        str,
        dex,
        int,
        hits,
        fame: 0,
        karma: 0,
        team: 0,
        name_hue: -1,
    })
}

fn mobile_core_v1(r: &mut GenericReader<'_>) -> Result<MobileCore, PersistError> {
    let mut core = mobile_core_v0(r)?;
    core.fame = r.read_i32()?;
    core.karma = r.read_i32()?;
    Ok(core)
}

fn mobile_core_v2(r: &mut GenericReader<'_>) -> Result<MobileCore, PersistError> {
    let mut core = mobile_core_v1(r)?;
    core.team = r.read_i32()?;
    Ok(core)
}

impl Properties for MobileCore {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Name", show_opt(&self.name)));
        out.push(("Body", format!("0x{:X}", self.body)));
        out.push(("Hue", self.hue.to_string()));
        out.push(("Location", self.location.to_string()));
        out.push(("Map", format!("{:?}", self.map)));
        out.push(("Str", self.str.to_string()));
        out.push(("Dex", self.dex.to_string()));
        out.push(("Int", self.int.to_string()));
        out.push(("Hits", self.hits.to_string()));
        out.push(("Fame", self.fame.to_string()));
        out.push(("Karma", self.karma.to_string()));
        out.push(("Team", self.team.to_string()));
        out.push(("NameHue", self.name_hue.to_string()));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "name" => self.name = parse_opt_string(value),
            "body" => self.body = parse_i32_in("Body", value, 0..=0xFFFF)?,
            "hue" => self.hue = parse_i32("Hue", value)?,
            "location" => self.location = parse_point("Location", value)?,
            "map" => self.map = parse_enum("Map", value)?,
            "str" => self.str = parse_i32_in("Str", value, 0..=MAX_STAT)?,
            "dex" => self.dex = parse_i32_in("Dex", value, 0..=MAX_STAT)?,
            "int" => self.int = parse_i32_in("Int", value, 0..=MAX_STAT)?,
            "hits" => self.hits = parse_i32_in("Hits", value, 0..=MAX_STAT)?,
            "fame" => self.fame = parse_i32("Fame", value)?,
            "karma" => self.karma = parse_i32("Karma", value)?,
            "team" => self.team = parse_i32("Team", value)?,
            "namehue" => return Err(PropertyError::ReadOnly("NameHue")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}
