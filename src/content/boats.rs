//! Dragon ships, their deeds and their docked (packed-up) form.

use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::wire_enum;
use crate::world::entity::{clear_ref, Entity, Item, ItemCore};
use crate::world::geo::{Direction, Point3D};
use crate::world::props::{
    list_layers, parse_bool, parse_enum, parse_opt_string, set_on_layers, show_opt, Properties,
    PropertyError,
};

wire_enum! {
    pub enum BoatKind {
        SmallDragon = 0,
        LargeDragon = 1,
    }
}

impl BoatKind {
    pub fn type_name(self) -> &'static str {
        match self {
            BoatKind::SmallDragon => "SmallDragonBoat",
            BoatKind::LargeDragon => "LargeDragonBoat",
        }
    }

    /// Multi id facing north; east, south and west follow in order.
    pub fn north_id(self) -> i32 {
        match self {
            BoatKind::SmallDragon => 0x4004,
            BoatKind::LargeDragon => 0x4014,
        }
    }

    pub fn hold_distance(self) -> i32 {
        match self {
            BoatKind::SmallDragon => 4,
            BoatKind::LargeDragon => 5,
        }
    }

    pub fn tillerman_distance(self) -> i32 {
        -self.hold_distance()
    }

    /// Where the boat appears relative to the deed or dock position.
    pub fn deed_offset(self) -> Point3D {
        match self {
            BoatKind::SmallDragon => Point3D::ZERO,
            BoatKind::LargeDragon => Point3D::new(0, -1, 0),
        }
    }

    pub fn deed_label(self) -> &'static str {
        match self {
            BoatKind::SmallDragon => "small dragon ship deed",
            BoatKind::LargeDragon => "large dragon ship deed",
        }
    }

    /// Multi id for a facing. Diagonals round down to the previous cardinal.
    pub fn item_id_for(self, facing: Direction) -> i32 {
        self.north_id() + (facing as i32 & 0x7) / 2
    }
}

/// Boat layer.
///
/// - v0: `facing, anchored, hold, tillerman, port plank, starboard plank`
/// - v1: adds `ship_name` (default none)
#[derive(Debug, Clone, PartialEq)]
pub struct BoatLayer {
    pub facing: Direction,
    pub anchored: bool,
    pub hold: Option<Serial>,
    pub tillerman: Option<Serial>,
    pub port_plank: Option<Serial>,
    pub starboard_plank: Option<Serial>,
    pub ship_name: Option<String>,
}

impl BoatLayer {
    fn new() -> Self {
        Self {
            facing: Direction::North,
            anchored: false,
            hold: None,
            tillerman: None,
            port_plank: None,
            starboard_plank: None,
            ship_name: None,
        }
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        clear_ref(&mut self.hold, live)
            + clear_ref(&mut self.tillerman, live)
            + clear_ref(&mut self.port_plank, live)
            + clear_ref(&mut self.starboard_plank, live)
    }
}

impl Layer for BoatLayer {
    const NAME: &'static str = "Boat";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_enum(self.facing);
        w.write_bool(self.anchored);
        w.write_entity_ref(self.hold);
        w.write_entity_ref(self.tillerman);
        w.write_entity_ref(self.port_plank);
        w.write_entity_ref(self.starboard_plank);
        w.write_string(self.ship_name.as_deref());
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, boat_v0), (1, boat_v1)]
    }
}

fn read_part(r: &mut GenericReader<'_>, field: &'static str) -> Result<Option<Serial>, PersistError> {
    let part = r.read_entity_ref()?;
    match part {
        Some(serial) if !serial.is_item() => Err(r.out_of_domain(field, serial.value() as i64)),
        _ => Ok(part),
    }
}

fn boat_v0(r: &mut GenericReader<'_>) -> Result<BoatLayer, PersistError> {
    Ok(BoatLayer {
        facing: r.read_enum()?,
        anchored: r.read_bool()?,
        hold: read_part(r, "hold")?,
        tillerman: r.read_entity_ref()?,
        port_plank: read_part(r, "port plank")?,
        starboard_plank: read_part(r, "starboard plank")?,
        ship_name: None,
    })
}

fn boat_v1(r: &mut GenericReader<'_>) -> Result<BoatLayer, PersistError> {
    let mut boat = boat_v0(r)?;
    boat.ship_name = r.read_string()?;
    Ok(boat)
}

impl Properties for BoatLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Facing", format!("{:?}", self.facing)));
        out.push(("Anchored", self.anchored.to_string()));
        out.push(("ShipName", show_opt(&self.ship_name)));
        let show = |part: Option<Serial>| part.map_or_else(|| "(-null-)".to_string(), |s| s.to_string());
        out.push(("Hold", show(self.hold)));
        out.push(("TillerMan", show(self.tillerman)));
        out.push(("PPlank", show(self.port_plank)));
        out.push(("SPlank", show(self.starboard_plank)));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "facing" => self.facing = parse_enum("Facing", value)?,
            "anchored" => self.anchored = parse_bool("Anchored", value)?,
            "shipname" => self.ship_name = parse_opt_string(value),
            "hold" => return Err(PropertyError::ReadOnly("Hold")),
            "tillerman" => return Err(PropertyError::ReadOnly("TillerMan")),
            "pplank" => return Err(PropertyError::ReadOnly("PPlank")),
            "splank" => return Err(PropertyError::ReadOnly("SPlank")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Boat {
    serial: Serial,
    kind: BoatKind,
    pub item: ItemCore,
    pub boat: BoatLayer,
}

impl Boat {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: BoatKind) -> Self {
        Self {
            serial,
            kind,
            item: ItemCore::new(kind.north_id()).with_weight(0.0),
            boat: BoatLayer::new(),
        }
    }

    pub fn kind(&self) -> BoatKind {
        self.kind
    }

    pub fn set_facing(&mut self, facing: Direction) {
        self.boat.facing = facing;
        self.item.item_id = self.kind.item_id_for(facing);
    }

    pub fn decode(
        kind: BoatKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let boat = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        Ok(Self {
            serial,
            kind,
            item,
            boat,
        })
    }
}

impl Entity for Boat {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.boat, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.boat])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        if name.eq_ignore_ascii_case("facing") {
            let facing = parse_enum("Facing", value)?;
            self.set_facing(facing);
            return Ok(());
        }
        set_on_layers(&mut [&mut self.item, &mut self.boat], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.boat.clear_dangling(live) + self.item.clear_dangling(live)
    }
}

impl Item for Boat {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

/// Type layer shared by deeds and docked boats.
///
/// - v0: `kind, ship_name`
#[derive(Debug, Clone, PartialEq)]
pub struct BoatTicket {
    pub kind: BoatKind,
    pub ship_name: Option<String>,
}

impl Layer for BoatTicket {
    const NAME: &'static str = "BoatTicket";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_enum(self.kind);
        w.write_string(self.ship_name.as_deref());
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, ticket_v0)]
    }
}

fn ticket_v0(r: &mut GenericReader<'_>) -> Result<BoatTicket, PersistError> {
    Ok(BoatTicket {
        kind: r.read_enum()?,
        ship_name: r.read_string()?,
    })
}

impl Properties for BoatTicket {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("BoatKind", format!("{:?}", self.kind)));
        out.push(("ShipName", show_opt(&self.ship_name)));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "boatkind" => return Err(PropertyError::ReadOnly("BoatKind")),
            "shipname" => self.ship_name = parse_opt_string(value),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketForm {
    Deed,
    Docked,
}

impl TicketForm {
    fn type_name(self) -> &'static str {
        match self {
            TicketForm::Deed => "BoatDeed",
            TicketForm::Docked => "DockedBoat",
        }
    }

    fn item_id(self) -> i32 {
        match self {
            TicketForm::Deed => 0x14F2,
            TicketForm::Docked => 0x14F4,
        }
    }
}

/// A boat in item form: an unused deed, or a boat that has been docked.
#[derive(Debug, Clone, PartialEq)]
pub struct BoatToken {
    serial: Serial,
    form: TicketForm,
    pub item: ItemCore,
    pub ticket: BoatTicket,
}

impl BoatToken {
    pub fn deed(serial: Serial, kind: BoatKind) -> Self {
        Self {
            serial,
            form: TicketForm::Deed,
            item: ItemCore::new(TicketForm::Deed.item_id())
                .with_weight(1.0)
                .with_name(kind.deed_label()),
            ticket: BoatTicket {
                kind,
                ship_name: None,
            },
        }
    }

    /// Pack `boat` up. The caller deletes the boat and its parts.
    pub fn dock(serial: Serial, boat: &Boat) -> Self {
        let mut item = ItemCore::new(TicketForm::Docked.item_id()).with_weight(1.0);
        item.parent = boat.item.parent;
        item.location = boat.item.location;
        item.map = boat.item.map;
        Self {
            serial,
            form: TicketForm::Docked,
            item,
            ticket: BoatTicket {
                kind: boat.kind,
                ship_name: boat.boat.ship_name.clone(),
            },
        }
    }

    /// The boat this token places at `location`.
    pub fn launch(&self, serial: Serial, location: Point3D, facing: Direction) -> Boat {
        let kind = self.ticket.kind;
        let mut boat = Boat::new(serial, kind);
        boat.set_facing(facing);
        boat.item.location = location.offset(kind.deed_offset());
        boat.item.map = self.item.map;
        boat.boat.ship_name = self.ticket.ship_name.clone();
        boat
    }

    pub fn form(&self) -> TicketForm {
        self.form
    }

    pub fn decode(
        form: TicketForm,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let ticket = decode_layer(r)?;
        Ok(Self {
            serial,
            form,
            item,
            ticket,
        })
    }
}

impl Entity for BoatToken {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.form.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.ticket, w);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.ticket])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.ticket], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for BoatToken {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

pub fn decode_small_dragon_boat(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(Boat::decode(BoatKind::SmallDragon, serial, r)?))
}

pub fn decode_large_dragon_boat(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(Boat::decode(BoatKind::LargeDragon, serial, r)?))
}

pub fn decode_boat_deed(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(BoatToken::decode(TicketForm::Deed, serial, r)?))
}

pub fn decode_docked_boat(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(BoatToken::decode(TicketForm::Docked, serial, r)?))
}
