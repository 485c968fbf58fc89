//! Multi-tile furniture ("addons") and the deed that places them.

use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::wire_enum;
use crate::world::entity::{Entity, Item, ItemCore};
use crate::world::geo::Point3D;
use crate::world::props::{list_layers, parse_i32, set_on_layers, Properties, PropertyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddonComponent {
    pub item_id: i32,
    pub offset: Point3D,
    pub hue: i32,
}

impl AddonComponent {
    pub const fn new(item_id: i32, x: i32, y: i32, z: i32) -> Self {
        Self {
            item_id,
            offset: Point3D::new(x, y, z),
            hue: 0,
        }
    }
}

/// Addon layer, v0 only: the component list.
#[derive(Debug, Clone, PartialEq)]
pub struct AddonLayer {
    pub components: Vec<AddonComponent>,
}

impl Layer for AddonLayer {
    const NAME: &'static str = "Addon";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_list(&self.components, |w, c| {
            w.write_i32(c.item_id);
            w.write_point3d(c.offset);
            w.write_i32(c.hue);
        });
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, addon_v0)]
    }
}

fn addon_v0(r: &mut GenericReader<'_>) -> Result<AddonLayer, PersistError> {
    let components = r.read_list(|r| {
        let item_id = r.read_i32()?;
        if !(0..=0xFFFF).contains(&item_id) {
            return Err(r.out_of_domain("component item_id", item_id as i64));
        }
        Ok(AddonComponent {
            item_id,
            offset: r.read_point3d()?,
            hue: r.read_i32()?,
        })
    })?;
    Ok(AddonLayer { components })
}

impl Properties for AddonLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Components", self.components.len().to_string()));
    }

    fn set_property(&mut self, name: &str, _value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "components" => Err(PropertyError::ReadOnly("Components")),
            _ => Err(PropertyError::Unknown(name.to_string())),
        }
    }
}

wire_enum! {
    pub enum AddonKind {
        LoomSouth = 0,
        DisplayCaseTinySouth = 1,
        DisplayCaseNarrowSouth = 2,
        LargeStoneTableEast = 3,
    }
}

const LOOM_SOUTH: &[AddonComponent] = &[
    AddonComponent::new(0x1061, 0, 0, 0),
    AddonComponent::new(0x1062, 1, 0, 0),
];

const DISPLAY_CASE_TINY_SOUTH: &[AddonComponent] = &[
    AddonComponent::new(2826, 0, 0, 2),
    AddonComponent::new(2828, 0, 0, 0),
    AddonComponent::new(2828, 0, 0, 4),
];

const DISPLAY_CASE_NARROW_SOUTH: &[AddonComponent] = &[
    AddonComponent::new(2723, -1, 0, 0),
    AddonComponent::new(2723, -1, 0, 6),
    AddonComponent::new(2832, -1, 0, 3),
    AddonComponent::new(2722, 0, 0, 6),
    AddonComponent::new(2839, 0, 0, 3),
    AddonComponent::new(2722, 1, 0, 6),
    AddonComponent::new(2839, 1, 0, 3),
    AddonComponent::new(2724, 2, 0, 0),
    AddonComponent::new(2724, 2, 0, 6),
    AddonComponent::new(2835, 2, 0, 3),
    AddonComponent::new(2840, 2, 1, 0),
    AddonComponent::new(2840, 2, 1, 6),
    AddonComponent::new(2833, 2, 1, 3),
    AddonComponent::new(2720, 1, 1, 6),
    AddonComponent::new(2837, 1, 1, 3),
    AddonComponent::new(2720, 0, 1, 6),
    AddonComponent::new(2837, 0, 1, 3),
    AddonComponent::new(2725, -1, 1, 0),
    AddonComponent::new(2725, -1, 1, 6),
    AddonComponent::new(2834, -1, 1, 3),
];

const LARGE_STONE_TABLE_EAST: &[AddonComponent] = &[
    AddonComponent::new(0x1202, 0, 0, 0),
    AddonComponent::new(0x1203, 0, 1, 0),
    AddonComponent::new(0x1201, 0, 2, 0),
];

impl AddonKind {
    pub fn type_name(self) -> &'static str {
        match self {
            AddonKind::LoomSouth => "LoomSouthAddon",
            AddonKind::DisplayCaseTinySouth => "DisplayCaseTinySouthAddon",
            AddonKind::DisplayCaseNarrowSouth => "DisplayCaseNarrowSouthAddon",
            AddonKind::LargeStoneTableEast => "LargeStoneTableEastAddon",
        }
    }

    pub fn components(self) -> &'static [AddonComponent] {
        match self {
            AddonKind::LoomSouth => LOOM_SOUTH,
            AddonKind::DisplayCaseTinySouth => DISPLAY_CASE_TINY_SOUTH,
            AddonKind::DisplayCaseNarrowSouth => DISPLAY_CASE_NARROW_SOUTH,
            AddonKind::LargeStoneTableEast => LARGE_STONE_TABLE_EAST,
        }
    }

    pub fn deed_name(self) -> &'static str {
        match self {
            AddonKind::LoomSouth => "loom (south)",
            AddonKind::DisplayCaseTinySouth => "tiny display case (south)",
            AddonKind::DisplayCaseNarrowSouth => "narrow display case (south)",
            AddonKind::LargeStoneTableEast => "large stone table (east)",
        }
    }

    /// Version of the field-less type layer. The stone table writes v1; its v0
    /// and v1 layouts are both empty.
    fn tail_version(self) -> u32 {
        match self {
            AddonKind::LargeStoneTableEast => 1,
            _ => 0,
        }
    }
}

/// Furniture with no state of its own beyond the component list.
#[derive(Debug, Clone, PartialEq)]
pub struct Furniture {
    serial: Serial,
    kind: AddonKind,
    pub item: ItemCore,
    pub addon: AddonLayer,
}

impl Furniture {
    pub fn new(serial: Serial, kind: AddonKind, hue: i32) -> Self {
        let components = kind
            .components()
            .iter()
            .map(|c| AddonComponent { hue, ..*c })
            .collect();
        Self {
            serial,
            kind,
            item: ItemCore::new(0x0001).with_hue(hue).with_weight(0.0),
            addon: AddonLayer { components },
        }
    }

    pub fn kind(&self) -> AddonKind {
        self.kind
    }

    pub fn decode(
        kind: AddonKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let addon = decode_layer(r)?;
        decode_marker(r, kind.type_name(), kind.tail_version())?;
        Ok(Self {
            serial,
            kind,
            item,
            addon,
        })
    }
}

impl Entity for Furniture {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.addon, w);
        encode_marker(w, self.kind.tail_version());
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.addon])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.addon], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for Furniture {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

/// Loom type layer.
///
/// - v0: no fields (phase 0)
/// - v1: `phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoomLayer {
    pub phase: i32,
}

impl Layer for LoomLayer {
    const NAME: &'static str = "LoomSouthAddon";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_i32(self.phase);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, loom_v0), (1, loom_v1)]
    }
}

fn loom_v0(_r: &mut GenericReader<'_>) -> Result<LoomLayer, PersistError> {
    Ok(LoomLayer { phase: 0 })
}

fn loom_v1(r: &mut GenericReader<'_>) -> Result<LoomLayer, PersistError> {
    let phase = r.read_i32()?;
    if phase < 0 {
        return Err(r.out_of_domain("phase", phase as i64));
    }
    Ok(LoomLayer { phase })
}

impl Properties for LoomLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Phase", self.phase.to_string()));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "phase" => {
                let phase = parse_i32("Phase", value)?;
                if phase < 0 {
                    return Err(PropertyError::Invalid {
                        name: "Phase",
                        value: value.to_string(),
                        reason: "must not be negative".into(),
                    });
                }
                self.phase = phase;
            }
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoomSouthAddon {
    serial: Serial,
    pub item: ItemCore,
    pub addon: AddonLayer,
    pub loom: LoomLayer,
}

impl LoomSouthAddon {
    pub const TYPE_NAME: &'static str = "LoomSouthAddon";

    pub fn new(serial: Serial) -> Self {
        let base = Furniture::new(serial, AddonKind::LoomSouth, 0);
        Self {
            serial,
            item: base.item,
            addon: base.addon,
            loom: LoomLayer::default(),
        }
    }

    pub fn decode(serial: Serial, r: &mut GenericReader<'_>) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let addon = decode_layer(r)?;
        let loom = decode_layer(r)?;
        Ok(Self {
            serial,
            item,
            addon,
            loom,
        })
    }
}

impl Entity for LoomSouthAddon {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.addon, w);
        encode_layer(&self.loom, w);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.addon, &self.loom])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(
            &mut [&mut self.item, &mut self.addon, &mut self.loom],
            name,
            value,
        )
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for LoomSouthAddon {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

/// Deed type layer, v0: which addon the deed places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeedLayer {
    pub addon: AddonKind,
}

impl Layer for DeedLayer {
    const NAME: &'static str = "AddonDeed";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_enum(self.addon);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, deed_v0)]
    }
}

fn deed_v0(r: &mut GenericReader<'_>) -> Result<DeedLayer, PersistError> {
    Ok(DeedLayer {
        addon: r.read_enum()?,
    })
}

impl Properties for DeedLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Addon", format!("{:?}", self.addon)));
    }

    fn set_property(&mut self, name: &str, _value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "addon" => Err(PropertyError::ReadOnly("Addon")),
            _ => Err(PropertyError::Unknown(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddonDeed {
    serial: Serial,
    pub item: ItemCore,
    pub deed: DeedLayer,
}

impl AddonDeed {
    pub const TYPE_NAME: &'static str = "AddonDeed";

    pub fn new(serial: Serial, addon: AddonKind) -> Self {
        Self {
            serial,
            item: ItemCore::new(0x14F0)
                .with_weight(1.0)
                .with_name(addon.deed_name()),
            deed: DeedLayer { addon },
        }
    }

    pub fn decode(serial: Serial, r: &mut GenericReader<'_>) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let deed = decode_layer(r)?;
        Ok(Self { serial, item, deed })
    }

    /// The addon this deed places, hued like the deed, at `location`.
    pub fn build(&self, serial: Serial, location: Point3D) -> Box<dyn Item> {
        let mut built: Box<dyn Item> = match self.deed.addon {
            AddonKind::LoomSouth => Box::new(LoomSouthAddon::new(serial)),
            kind => Box::new(Furniture::new(serial, kind, self.item.hue)),
        };
        let core = built.item_mut();
        core.location = location;
        core.map = self.item.map;
        built
    }
}

impl Entity for AddonDeed {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.deed, w);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.deed])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.deed], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for AddonDeed {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

pub fn decode_loom_south(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(LoomSouthAddon::decode(serial, r)?))
}

pub fn decode_display_case_tiny_south(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(Furniture::decode(AddonKind::DisplayCaseTinySouth, serial, r)?))
}

pub fn decode_display_case_narrow_south(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(Furniture::decode(AddonKind::DisplayCaseNarrowSouth, serial, r)?))
}

pub fn decode_large_stone_table_east(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(Furniture::decode(AddonKind::LargeStoneTableEast, serial, r)?))
}

pub fn decode_addon_deed(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(AddonDeed::decode(serial, r)?))
}
