//! Versioned binary persistence for shard entities.
//!
//! The pieces, bottom-up:
//!
//! - [`writer`] / [`reader`]: little-endian primitives, 7-bit encoded ints,
//!   nullable strings, timestamps, entity references and counted lists. The
//!   reader is bounds-checked and reports every problem as a corrupt record.
//! - [`versioned`]: the [`Layer`] trait. Each layer is written as
//!   `[version][fields]` and decoded through an explicit version table.
//! - [`serial`]: entity identities and the never-reuse allocator.
//! - [`catalog`]: type names to load-time constructors.
//!
//! # Adding a schema version
//!
//! 1. Bump the layer's `VERSION`
//! 2. Write the new fields at the end of `encode`
//! 3. Add a decode function for the new version and keep the old ones
//! 4. Give the new fields a documented default in every older decoder
//! 5. Add a test that decodes a hand-built stream of each older layout

pub mod catalog;
pub mod errors;
pub mod reader;
pub mod serial;
pub mod versioned;
pub mod writer;

pub use catalog::{Catalog, CatalogEntry, Constructor};
pub use errors::{CorruptKind, PersistError};
pub use reader::GenericReader;
pub use serial::{Serial, SerialPool};
pub use versioned::{
    decode_layer, decode_marker, decode_record, decode_record_upgraded, encode_layer, encode_marker, encode_record,
    validate_table, Decoder, Layer,
};
pub use writer::{now, to_tick_precision, GenericWriter};

/// A fieldless enum stored as a single byte.
pub trait WireEnum: Sized + Copy + 'static {
    /// Field name used when a stored byte is out of range.
    const FIELD: &'static str;

    fn to_wire(self) -> u8;

    fn from_wire(value: u8) -> Option<Self>;

    fn variants() -> &'static [Self];

    fn name(self) -> &'static str;

    /// Case-insensitive lookup by variant name, used by property editing.
    fn parse_name(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::variants()
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(text))
    }
}

impl GenericWriter {
    pub fn write_enum<E: WireEnum>(&mut self, value: E) {
        self.write_u8(value.to_wire());
    }
}

/// Declare a fieldless enum with explicit wire values and implement [`WireEnum`] for it.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $crate::persist::WireEnum for $name {
            const FIELD: &'static str = stringify!($name);

            fn to_wire(self) -> u8 {
                self as u8
            }

            fn from_wire(value: u8) -> Option<Self> {
                $( if value == $value { return Some($name::$variant); } )+
                None
            }

            fn variants() -> &'static [Self] {
                &[$($name::$variant),+]
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant) ),+
                }
            }
        }
    };
}
