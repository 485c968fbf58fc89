//! Simple items: stackable resources, field-less deeds and fixtures, and the
//! crystal ball of pet summoning.

use rand::Rng;

use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::wire_enum;
use crate::world::entity::{clear_ref, Entity, Item, ItemCore};
use crate::world::props::{
    list_layers, parse_i32, parse_i32_in, parse_enum, set_on_layers, Properties, PropertyError,
};

pub const MAX_AMOUNT: i32 = 60_000;

wire_enum! {
    /// Crafted quality. `Regular` is deliberately not the zero value.
    pub enum ItemQuality {
        Low = 0,
        Regular = 1,
        Exceptional = 2,
    }
}

impl Default for ItemQuality {
    fn default() -> Self {
        ItemQuality::Regular
    }
}

/// Stackable layer.
///
/// - v0: `amount`
/// - v1: adds `quality` (default [`ItemQuality::Regular`])
#[derive(Debug, Clone, PartialEq)]
pub struct StackLayer {
    pub amount: i32,
    pub quality: ItemQuality,
}

impl StackLayer {
    pub fn new(amount: i32) -> Self {
        Self {
            amount: amount.clamp(1, MAX_AMOUNT),
            quality: ItemQuality::Regular,
        }
    }
}

impl Layer for StackLayer {
    const NAME: &'static str = "Stack";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_i32(self.amount);
        w.write_enum(self.quality);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, stack_v0), (1, stack_v1)]
    }
}

fn read_amount(r: &mut GenericReader<'_>) -> Result<i32, PersistError> {
    let amount = r.read_i32()?;
    if !(1..=MAX_AMOUNT).contains(&amount) {
        return Err(r.out_of_domain("amount", amount as i64));
    }
    Ok(amount)
}

fn stack_v0(r: &mut GenericReader<'_>) -> Result<StackLayer, PersistError> {
    Ok(StackLayer {
        amount: read_amount(r)?,
        quality: ItemQuality::Regular,
    })
}

fn stack_v1(r: &mut GenericReader<'_>) -> Result<StackLayer, PersistError> {
    let amount = read_amount(r)?;
    let quality = r.read_enum()?;
    Ok(StackLayer { amount, quality })
}

impl Properties for StackLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Amount", self.amount.to_string()));
        out.push(("Quality", format!("{:?}", self.quality)));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "amount" => self.amount = parse_i32_in("Amount", value, 1..=MAX_AMOUNT)?,
            "quality" => self.quality = parse_enum("Quality", value)?,
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Fish,
    Tourmaline,
}

impl StackKind {
    pub fn type_name(self) -> &'static str {
        match self {
            StackKind::Fish => "Fish",
            StackKind::Tourmaline => "Tourmaline",
        }
    }

    fn base(self, rng: &mut impl Rng) -> ItemCore {
        match self {
            // four fish graphics starting at 0x09CC
            StackKind::Fish => ItemCore::new(rng.gen_range(0x09CC..0x09D0)).with_weight(1.0),
            StackKind::Tourmaline => ItemCore::new(0x0F2D).with_weight(0.1),
        }
    }
}

/// A stackable resource: base item, stack, then a field-less type layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StackItem {
    serial: Serial,
    kind: StackKind,
    pub item: ItemCore,
    pub stack: StackLayer,
}

impl StackItem {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: StackKind, amount: i32, rng: &mut impl Rng) -> Self {
        Self {
            serial,
            kind,
            item: kind.base(rng),
            stack: StackLayer::new(amount),
        }
    }

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    pub fn decode(
        kind: StackKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let stack = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        Ok(Self {
            serial,
            kind,
            item,
            stack,
        })
    }
}

impl Entity for StackItem {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.stack, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.stack])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.stack], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for StackItem {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }

    fn amount(&self) -> i32 {
        self.stack.amount
    }
}

pub fn decode_fish(serial: Serial, r: &mut GenericReader<'_>) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(StackItem::decode(StackKind::Fish, serial, r)?))
}

pub fn decode_tourmaline(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(StackItem::decode(StackKind::Tourmaline, serial, r)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainKind {
    DoorRekeyingContract,
    CrystalCaveBarrier,
}

impl PlainKind {
    pub fn type_name(self) -> &'static str {
        match self {
            PlainKind::DoorRekeyingContract => "DoorRekeyingContract",
            PlainKind::CrystalCaveBarrier => "CrystalCaveBarrier",
        }
    }

    fn base(self) -> ItemCore {
        match self {
            PlainKind::DoorRekeyingContract => ItemCore::new(0x14F0)
                .with_weight(1.0)
                .with_name("a contract for door rekeying"),
            PlainKind::CrystalCaveBarrier => ItemCore::new(0x3967),
        }
    }
}

/// An item with nothing beyond the base layer and an empty type layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainItem {
    serial: Serial,
    kind: PlainKind,
    pub item: ItemCore,
}

impl PlainItem {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: PlainKind) -> Self {
        Self {
            serial,
            kind,
            item: kind.base(),
        }
    }

    pub fn decode(
        kind: PlainKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        Ok(Self { serial, kind, item })
    }
}

impl Entity for PlainItem {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        self.item.set_property(name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.item.clear_dangling(live)
    }
}

impl Item for PlainItem {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

pub fn decode_door_rekeying_contract(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(PlainItem::decode(PlainKind::DoorRekeyingContract, serial, r)?))
}

pub fn decode_crystal_cave_barrier(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(PlainItem::decode(PlainKind::CrystalCaveBarrier, serial, r)?))
}

pub const MAX_CHARGES: i32 = 20;
pub const MAX_RECHARGES: i32 = 255;

/// Type layer of the crystal ball of pet summoning.
///
/// - v0: `charges, pet, pet_name`
/// - v1: `recharges` written first, then the v0 fields (default 0)
///
/// Counters use 7-bit encoded ints. Stored charges above [`MAX_CHARGES`] are
/// clamped on load rather than rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct SummoningLayer {
    pub charges: i32,
    pub recharges: i32,
    pub pet: Option<Serial>,
    pub pet_name: String,
}

impl Layer for SummoningLayer {
    const NAME: &'static str = "BallOfSummoning";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_encoded_int(self.recharges);
        w.write_encoded_int(self.charges);
        w.write_entity_ref(self.pet);
        w.write_str(&self.pet_name);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, summoning_v0), (1, summoning_v1)]
    }
}

fn summoning_v0(r: &mut GenericReader<'_>) -> Result<SummoningLayer, PersistError> {
    let charges = r.read_encoded_int()?;
    if charges < 0 {
        return Err(r.out_of_domain("charges", charges as i64));
    }
    let pet = r.read_entity_ref()?;
    if let Some(serial) = pet {
        if !serial.is_mobile() {
            return Err(r.out_of_domain("pet", serial.value() as i64));
        }
    }
    let pet_name = r.read_string()?.unwrap_or_default();
    Ok(SummoningLayer {
        charges: charges.min(MAX_CHARGES),
        recharges: 0,
        pet,
        pet_name,
    })
}

fn summoning_v1(r: &mut GenericReader<'_>) -> Result<SummoningLayer, PersistError> {
    let recharges = r.read_encoded_int()?;
    if !(0..=MAX_RECHARGES).contains(&recharges) {
        return Err(r.out_of_domain("recharges", recharges as i64));
    }
    let mut layer = summoning_v0(r)?;
    layer.recharges = recharges;
    Ok(layer)
}

impl Properties for SummoningLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Charges", self.charges.to_string()));
        out.push(("Recharges", self.recharges.to_string()));
        out.push(("MaxCharges", MAX_CHARGES.to_string()));
        out.push(("MaxRecharges", MAX_RECHARGES.to_string()));
        out.push((
            "Pet",
            self.pet.map_or_else(|| "(-null-)".to_string(), |s| s.to_string()),
        ));
        out.push(("PetName", self.pet_name.clone()));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "charges" => self.charges = parse_i32("Charges", value)?.clamp(0, MAX_CHARGES),
            "recharges" => {
                self.recharges = parse_i32("Recharges", value)?.clamp(0, MAX_RECHARGES)
            }
            "maxcharges" => return Err(PropertyError::ReadOnly("MaxCharges")),
            "maxrecharges" => return Err(PropertyError::ReadOnly("MaxRecharges")),
            "petname" => return Err(PropertyError::ReadOnly("PetName")),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallOfSummoning {
    serial: Serial,
    pub item: ItemCore,
    pub ball: SummoningLayer,
}

impl BallOfSummoning {
    pub const TYPE_NAME: &'static str = "BallOfSummoning";

    pub fn new(serial: Serial, rng: &mut impl Rng) -> Self {
        Self {
            serial,
            item: ItemCore::new(0x0E2E).with_weight(10.0),
            ball: SummoningLayer {
                charges: rng.gen_range(3..=9),
                recharges: 0,
                pet: None,
                pet_name: String::new(),
            },
        }
    }

    /// Link a pet; the cached name follows the pet.
    pub fn link_pet(&mut self, pet: Serial, name: Option<&str>) {
        self.ball.pet = Some(pet);
        self.ball.pet_name = name.unwrap_or_default().to_string();
    }

    pub fn unlink_pet(&mut self) {
        self.ball.pet = None;
        self.ball.pet_name.clear();
    }

    pub fn decode(serial: Serial, r: &mut GenericReader<'_>) -> Result<Self, PersistError> {
        let item = decode_layer(r)?;
        let ball = decode_layer(r)?;
        Ok(Self { serial, item, ball })
    }
}

impl Entity for BallOfSummoning {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.item, w);
        encode_layer(&self.ball, w);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.item, &self.ball])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(&mut [&mut self.item, &mut self.ball], name, value)
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        let cleared = clear_ref(&mut self.ball.pet, live);
        if cleared > 0 {
            self.ball.pet_name.clear();
        }
        cleared + self.item.clear_dangling(live)
    }
}

impl Item for BallOfSummoning {
    fn item(&self) -> &ItemCore {
        &self.item
    }

    fn item_mut(&mut self) -> &mut ItemCore {
        &mut self.item
    }
}

pub fn decode_ball_of_summoning(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Item>, PersistError> {
    Ok(Box::new(BallOfSummoning::decode(serial, r)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{validate_table, CorruptKind, WireEnum};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn serial() -> Serial {
        Serial::new(0x4000_0010)
    }

    fn round_trip<T: Entity>(
        entity: &T,
        decode: fn(Serial, &mut GenericReader<'_>) -> Result<T, PersistError>,
    ) -> T {
        let mut w = GenericWriter::new();
        entity.serialize(&mut w);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let decoded = decode(entity.serial(), &mut r).expect("decode");
        r.expect_end().expect("no trailing bytes");
        decoded
    }

    #[test]
    fn tables_are_valid() {
        validate_table::<StackLayer>().unwrap();
        validate_table::<SummoningLayer>().unwrap();
    }

    #[test]
    fn stack_v0_defaults_to_regular_quality() {
        let mut w = GenericWriter::new();
        w.write_i32(0);
        w.write_i32(12);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let stack: StackLayer = decode_layer(&mut r).unwrap();
        assert_eq!(stack.amount, 12);
        assert_eq!(stack.quality, ItemQuality::Regular);
        assert_ne!(stack.quality.to_wire(), 0);
    }

    #[test]
    fn zero_amount_is_corrupt() {
        let mut w = GenericWriter::new();
        w.write_i32(1);
        w.write_i32(0);
        w.write_u8(1);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let err = decode_layer::<StackLayer>(&mut r).unwrap_err();
        assert!(matches!(
            err.corrupt_kind(),
            Some(CorruptKind::OutOfDomain { field: "amount", value: 0 })
        ));
    }

    #[test]
    fn fish_round_trips() {
        let fish = StackItem::new(serial(), StackKind::Fish, 5, &mut rng());
        assert!((0x09CC..0x09D0).contains(&fish.item.item_id));
        let back = round_trip(&fish, |s, r| StackItem::decode(StackKind::Fish, s, r));
        assert_eq!(back, fish);
        assert_eq!(back.amount(), 5);
    }

    #[test]
    fn plain_items_round_trip() {
        let contract = PlainItem::new(serial(), PlainKind::DoorRekeyingContract);
        let back = round_trip(&contract, |s, r| {
            PlainItem::decode(PlainKind::DoorRekeyingContract, s, r)
        });
        assert_eq!(back.item.name.as_deref(), Some("a contract for door rekeying"));
    }

    #[test]
    fn ball_charges_are_random_within_range() {
        let ball = BallOfSummoning::new(serial(), &mut rng());
        assert!((3..=9).contains(&ball.ball.charges));
        assert_eq!(round_trip(&ball, BallOfSummoning::decode), ball);
    }

    /// Item v0 and ball v0, as written before loot types and recharges.
    fn ball_v0_bytes(charges: i32) -> Vec<u8> {
        let mut w = GenericWriter::new();
        w.write_i32(0);
        w.write_i32(0x0E2E);
        w.write_i32(0);
        w.write_string(None);
        w.write_f64(1.0);
        w.write_point3d(Default::default());
        w.write_map(Default::default());
        w.write_entity_ref(None);
        w.write_i32(0);
        w.write_encoded_int(charges);
        w.write_entity_ref(Some(Serial::new(0x0000_0042)));
        w.write_string(Some("Rex"));
        w.into_inner()
    }

    #[test]
    fn ball_v0_clamps_charges_and_defaults_recharges() {
        let bytes = ball_v0_bytes(45);
        let mut r = GenericReader::new(&bytes);
        let ball = BallOfSummoning::decode(serial(), &mut r).unwrap();
        assert_eq!(ball.ball.charges, MAX_CHARGES);
        assert_eq!(ball.ball.recharges, 0);
        assert_eq!(ball.ball.pet, Some(Serial::new(0x42)));
        assert_eq!(ball.ball.pet_name, "Rex");
        assert_eq!(r.upgraded_layers(), 2);
    }

    #[test]
    fn dangling_pet_clears_name() {
        let mut ball = BallOfSummoning::new(serial(), &mut rng());
        ball.link_pet(Serial::new(0x42), Some("Rex"));
        assert_eq!(ball.clear_dangling(&|_| false), 1);
        assert_eq!(ball.ball.pet, None);
        assert!(ball.ball.pet_name.is_empty());
    }

    #[test]
    fn charges_property_clamps() {
        let mut ball = BallOfSummoning::new(serial(), &mut rng());
        ball.set_property("Charges", "99").unwrap();
        assert_eq!(ball.ball.charges, MAX_CHARGES);
        assert_eq!(
            ball.set_property("PetName", "Fido"),
            Err(PropertyError::ReadOnly("PetName"))
        );
        ball.set_property("Hue", "5").unwrap();
        assert_eq!(ball.item.hue, 5);
    }
}
