//! Shopkeepers and their static stock lists.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::content::mobiles::CreatureLayer;
use crate::persist::{
    decode_layer, decode_marker, encode_layer, encode_marker, Decoder, GenericReader,
    GenericWriter, Layer, PersistError, Serial,
};
use crate::world::entity::{Entity, Mobile, MobileCore};
use crate::world::props::{
    list_layers, parse_opt_string, set_on_layers, show_opt, Properties, PropertyError,
};

/// Name colour shown over invulnerable mobiles.
pub const INVULNERABLE_NAME_HUE: i32 = 0x35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyInfo {
    pub name: &'static str,
    pub price: i32,
    pub amount: i32,
    pub item_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellInfo {
    pub name: &'static str,
    pub price: i32,
}

#[derive(Debug)]
pub struct ShopTable {
    pub name: &'static str,
    pub buy: &'static [BuyInfo],
    pub sell: &'static [SellInfo],
}

impl ShopTable {
    pub fn buy_price(&self, name: &str) -> Option<i32> {
        self.buy
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .map(|b| b.price)
    }

    pub fn sell_price(&self, name: &str) -> Option<i32> {
        self.sell
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.price)
    }
}

const fn buy(name: &'static str, price: i32, amount: i32, item_id: i32) -> BuyInfo {
    BuyInfo {
        name,
        price,
        amount,
        item_id,
    }
}

const fn sell(name: &'static str, price: i32) -> SellInfo {
    SellInfo { name, price }
}

const DRINKS: [BuyInfo; 10] = [
    buy("bottle of ale", 7, 20, 0x099F),
    buy("bottle of wine", 7, 20, 0x09C7),
    buy("bottle of liquor", 7, 20, 0x099B),
    buy("jug of cider", 13, 20, 0x09C8),
    buy("pitcher of milk", 7, 20, 0x09F0),
    buy("pitcher of ale", 11, 20, 0x1F95),
    buy("pitcher of cider", 11, 20, 0x1F97),
    buy("pitcher of liquor", 11, 20, 0x1F99),
    buy("pitcher of wine", 11, 20, 0x1F9B),
    buy("pitcher of water", 11, 20, 0x1F9D),
];

pub const INN_KEEPER: ShopTable = ShopTable {
    name: "InnKeeper",
    buy: &[
        DRINKS[0],
        DRINKS[1],
        DRINKS[2],
        DRINKS[3],
        DRINKS[4],
        DRINKS[5],
        DRINKS[6],
        DRINKS[7],
        DRINKS[8],
        DRINKS[9],
        buy("bread loaf", 7, 10, 0x103B),
        buy("cheese wheel", 25, 10, 0x097E),
        buy("cooked bird", 17, 20, 0x09B7),
        buy("leg of lamb", 8, 20, 0x160A),
        buy("chicken leg", 6, 20, 0x1608),
        buy("ribs", 12, 20, 0x09F2),
        buy("peach", 3, 20, 0x09D2),
        buy("pear", 3, 20, 0x0994),
        buy("grapes", 3, 20, 0x09D1),
        buy("apple", 3, 20, 0x09D0),
        buy("banana", 2, 20, 0x171F),
        buy("torch", 7, 20, 0x0F6B),
        buy("candle", 6, 20, 0x0A28),
        buy("beeswax", 1, 20, 0x1422),
        buy("backpack", 15, 20, 0x09B2),
        buy("chessboard", 2, 20, 0x0FA6),
        buy("checker board", 2, 20, 0x0FA6),
        buy("backgammon", 2, 20, 0x0E1C),
        buy("dice", 2, 20, 0x0FA7),
        buy("contract of employment", 1025, 20, 0x14F0),
        buy("a barkeep contract", 6250, 20, 0x14F0),
        buy("a housesitter contract", 2500, 20, 0x14F0),
        buy("vendor rental contract", 1025, 20, 0x14F0),
        buy("a vendor renegotiation contract", 1200, 20, 0x14F0),
    ],
    sell: &[
        sell("bottle of ale", 3),
        sell("jug of cider", 6),
        sell("pitcher of milk", 5),
        sell("glass mug", 1),
        sell("bread loaf", 3),
        sell("cheese wheel", 12),
        sell("ribs", 6),
        sell("peach", 1),
        sell("pear", 1),
        sell("grapes", 1),
        sell("apple", 1),
        sell("banana", 1),
        sell("torch", 3),
        sell("candle", 3),
        sell("chessboard", 1),
        sell("checker board", 1),
        sell("backgammon", 1),
        sell("dice", 1),
        sell("contract of employment", 512),
        sell("beeswax", 1),
    ],
};

pub const PLAYER_BARKEEPER: ShopTable = ShopTable {
    name: "PlayerBarkeeper",
    buy: &[
        DRINKS[0],
        DRINKS[1],
        DRINKS[2],
        DRINKS[3],
        DRINKS[4],
        DRINKS[5],
        DRINKS[6],
        DRINKS[7],
        DRINKS[8],
        DRINKS[9],
        buy("chessboard", 2, 20, 0x0FA6),
        buy("checker board", 2, 20, 0x0FA6),
        buy("backgammon", 2, 20, 0x0E1C),
        buy("dice", 2, 20, 0x0FA7),
    ],
    sell: &[],
};

pub const SMUGGLER: ShopTable = ShopTable {
    name: "Smuggler",
    buy: &[
        buy("grappling hook", 200, 10, 0x14F8),
        buy("black pearl", 9, 500, 0x0F7A),
        buy("spiders' silk", 6, 500, 0x0F8D),
    ],
    sell: &[],
};

pub const VARIETY_DEALER: ShopTable = ShopTable {
    name: "VarietyDealer",
    buy: &[
        buy("bandage", 5, 20, 0x0E21),
        buy("blank scroll", 5, 20, 0x0E34),
        buy("nightsight potion", 15, 10, 0x0F06),
        buy("agility potion", 15, 10, 0x0F08),
        buy("strength potion", 15, 10, 0x0F09),
        buy("refresh potion", 15, 10, 0x0F0B),
        buy("lesser cure potion", 15, 10, 0x0F07),
        buy("lesser heal potion", 15, 10, 0x0F0C),
        buy("lesser poison potion", 15, 10, 0x0F0A),
        buy("lesser explosion potion", 21, 10, 0x0F0D),
        buy("bolt", 6, 30, 0x1BFB),
        buy("arrow", 3, 30, 0x0F3F),
        buy("black pearl", 5, 20, 0x0F7A),
        buy("bloodmoss", 5, 20, 0x0F7B),
        buy("mandrake root", 3, 20, 0x0F86),
        buy("garlic", 3, 20, 0x0F84),
        buy("ginseng", 3, 20, 0x0F85),
        buy("nightshade", 3, 20, 0x0F88),
        buy("spiders' silk", 3, 20, 0x0F8D),
        buy("sulfurous ash", 3, 20, 0x0F8C),
        buy("bread loaf", 7, 10, 0x103B),
        buy("backpack", 15, 20, 0x09B2),
        buy("recall rune", 15, 10, 0x1F14),
        buy("spellbook", 18, 10, 0x0EFA),
        buy("magic wizard's hat", 11, 10, 0x1718),
    ],
    sell: &[
        sell("bandage", 2),
        sell("blank scroll", 3),
        sell("nightsight potion", 7),
        sell("agility potion", 7),
        sell("strength potion", 7),
        sell("refresh potion", 7),
        sell("lesser cure potion", 7),
        sell("lesser heal potion", 7),
        sell("lesser poison potion", 7),
        sell("lesser explosion potion", 10),
        sell("bolt", 3),
        sell("arrow", 2),
        sell("black pearl", 3),
        sell("bloodmoss", 3),
        sell("mandrake root", 2),
        sell("garlic", 2),
        sell("ginseng", 2),
        sell("nightshade", 2),
        sell("spiders' silk", 2),
        sell("sulfurous ash", 2),
        sell("bread loaf", 3),
        sell("backpack", 7),
        sell("recall rune", 8),
        sell("spellbook", 9),
    ],
};

pub const FARMER: ShopTable = ShopTable {
    name: "Farmer",
    buy: &[
        buy("cabbage", 5, 20, 0x0C7C),
        buy("cantaloupe", 6, 20, 0x0C79),
        buy("carrot", 3, 20, 0x0C78),
        buy("honeydew melon", 7, 20, 0x0C74),
        buy("squash", 3, 20, 0x0C72),
        buy("lettuce", 5, 20, 0x0C70),
        buy("onion", 3, 20, 0x0C6D),
        buy("pumpkin", 11, 20, 0x0C6A),
        buy("green gourd", 3, 20, 0x0C66),
        buy("yellow gourd", 3, 20, 0x0C64),
        buy("watermelon", 7, 20, 0x0C5C),
        buy("eggs", 3, 20, 0x09B5),
        buy("bread loaf", 6, 20, 0x103B),
        buy("pitcher of milk", 7, 20, 0x09F0),
        buy("peach", 3, 20, 0x09D2),
        buy("pear", 3, 20, 0x0994),
        buy("apple", 3, 20, 0x09D0),
        buy("wheat sheaf", 2, 20, 0x1EBD),
    ],
    sell: &[
        sell("cabbage", 1),
        sell("cantaloupe", 3),
        sell("carrot", 1),
        sell("honeydew melon", 3),
        sell("squash", 1),
        sell("lettuce", 1),
        sell("onion", 1),
        sell("pumpkin", 5),
        sell("green gourd", 1),
        sell("yellow gourd", 1),
        sell("watermelon", 3),
        sell("eggs", 1),
        sell("bread loaf", 3),
        sell("peach", 1),
        sell("pear", 1),
        sell("apple", 1),
        sell("wheat sheaf", 1),
    ],
};

pub static ALL_SHOPS: [&ShopTable; 5] = [
    &FARMER,
    &INN_KEEPER,
    &PLAYER_BARKEEPER,
    &SMUGGLER,
    &VARIETY_DEALER,
];

pub fn shop_table(name: &str) -> Option<&'static ShopTable> {
    ALL_SHOPS
        .iter()
        .copied()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Vendor layer, v0: the title shown after the name.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorLayer {
    pub title: Option<String>,
}

impl Layer for VendorLayer {
    const NAME: &'static str = "Vendor";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_string(self.title.as_deref());
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, vendor_v0)]
    }
}

fn vendor_v0(r: &mut GenericReader<'_>) -> Result<VendorLayer, PersistError> {
    Ok(VendorLayer {
        title: r.read_string()?,
    })
}

impl Properties for VendorLayer {
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>) {
        out.push(("Title", show_opt(&self.title)));
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name.to_ascii_lowercase().as_str() {
            "title" => self.title = parse_opt_string(value),
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorKind {
    Farmer,
    OrcMerchant,
    InnKeeper,
    VarietyDealer,
}

const HUMAN_NAMES: &[&str] = &[
    "Adrian", "Bertram", "Corwin", "Dalia", "Elsbeth", "Fenwick", "Gwenna", "Hollis", "Isolde",
    "Jarrod", "Kestrel", "Lorna", "Merrick", "Nessa", "Orrin", "Perrin",
];

const ORC_NAMES: &[&str] = &[
    "Grobnak", "Urzog", "Krug", "Mugash", "Dragub", "Borgakh", "Snagg", "Lurtz",
];

impl VendorKind {
    pub fn type_name(self) -> &'static str {
        match self {
            VendorKind::Farmer => "Farmer",
            VendorKind::OrcMerchant => "OrcMerchant",
            VendorKind::InnKeeper => "InnKeeper",
            VendorKind::VarietyDealer => "VarietyDealer",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            VendorKind::Farmer => "the farmer",
            VendorKind::OrcMerchant => "the orc merchant",
            VendorKind::InnKeeper => "the innkeeper",
            VendorKind::VarietyDealer => "the variety dealer",
        }
    }

    /// Stock lists this vendor trades from. The orc merchant sells
    /// smuggled goods.
    pub fn shops(self) -> &'static [&'static ShopTable] {
        match self {
            VendorKind::Farmer => &[&FARMER],
            VendorKind::OrcMerchant => &[&SMUGGLER],
            VendorKind::InnKeeper => &[&INN_KEEPER],
            VendorKind::VarietyDealer => &[&VARIETY_DEALER],
        }
    }

    fn spawn(self, rng: &mut impl Rng) -> MobileCore {
        let mut mobile;
        match self {
            VendorKind::OrcMerchant => {
                let name = ORC_NAMES.choose(rng).copied().unwrap_or("Grok");
                mobile = MobileCore::new(17).with_name(name);
                mobile.str = rng.gen_range(96..=120);
                mobile.dex = rng.gen_range(81..=105);
                mobile.int = rng.gen_range(36..=60);
                mobile.name_hue = INVULNERABLE_NAME_HUE;
            }
            _ => {
                let female = rng.gen_bool(0.5);
                let name = HUMAN_NAMES.choose(rng).copied().unwrap_or("Vendor");
                mobile = MobileCore::new(if female { 0x191 } else { 0x190 }).with_name(name);
                mobile.hue = rng.gen_range(1002..=1058);
                mobile.str = rng.gen_range(30..=60);
                mobile.dex = rng.gen_range(30..=60);
                mobile.int = rng.gen_range(30..=60);
            }
        }
        mobile.hits = mobile.str;
        mobile
    }
}

/// A shopkeeper: mobile, creature, vendor, then a field-less type layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Vendor {
    serial: Serial,
    kind: VendorKind,
    pub mobile: MobileCore,
    pub creature: CreatureLayer,
    pub vendor: VendorLayer,
}

impl Vendor {
    const TAIL_VERSION: u32 = 0;

    pub fn new(serial: Serial, kind: VendorKind, rng: &mut impl Rng) -> Self {
        Self {
            serial,
            kind,
            mobile: kind.spawn(rng),
            creature: CreatureLayer::default(),
            vendor: VendorLayer {
                title: Some(kind.title().to_string()),
            },
        }
    }

    pub fn kind(&self) -> VendorKind {
        self.kind
    }

    pub fn shops(&self) -> &'static [&'static ShopTable] {
        self.kind.shops()
    }

    pub fn decode(
        kind: VendorKind,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Self, PersistError> {
        let mut mobile: MobileCore = decode_layer(r)?;
        let creature = decode_layer(r)?;
        let vendor = decode_layer(r)?;
        decode_marker(r, kind.type_name(), Self::TAIL_VERSION)?;
        if kind == VendorKind::OrcMerchant {
            mobile.name_hue = INVULNERABLE_NAME_HUE;
        }
        Ok(Self {
            serial,
            kind,
            mobile,
            creature,
            vendor,
        })
    }
}

impl Entity for Vendor {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn serialize(&self, w: &mut GenericWriter) {
        encode_layer(&self.mobile, w);
        encode_layer(&self.creature, w);
        encode_layer(&self.vendor, w);
        encode_marker(w, Self::TAIL_VERSION);
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        list_layers(&[&self.mobile, &self.creature, &self.vendor])
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        set_on_layers(
            &mut [&mut self.mobile, &mut self.creature, &mut self.vendor],
            name,
            value,
        )
    }

    fn clear_dangling(&mut self, live: &dyn Fn(Serial) -> bool) -> usize {
        self.creature.clear_dangling(live)
    }
}

impl Mobile for Vendor {
    fn mobile(&self) -> &MobileCore {
        &self.mobile
    }

    fn mobile_mut(&mut self) -> &mut MobileCore {
        &mut self.mobile
    }
}

pub fn decode_farmer(serial: Serial, r: &mut GenericReader<'_>) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Vendor::decode(VendorKind::Farmer, serial, r)?))
}

pub fn decode_orc_merchant(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Vendor::decode(VendorKind::OrcMerchant, serial, r)?))
}

pub fn decode_inn_keeper(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Vendor::decode(VendorKind::InnKeeper, serial, r)?))
}

pub fn decode_variety_dealer(
    serial: Serial,
    r: &mut GenericReader<'_>,
) -> Result<Box<dyn Mobile>, PersistError> {
    Ok(Box::new(Vendor::decode(VendorKind::VarietyDealer, serial, r)?))
}
