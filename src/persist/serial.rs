//! Entity identities and their allocator.
//!
//! Mobiles and items share one 31-bit space split in two halves, the way the
//! client expects: mobiles below `0x4000_0000`, items above. A serial is handed
//! out once; deleting an entity never makes its serial available again, and
//! the pool's high-water marks travel with every save so that guarantee holds
//! across restarts.

use std::fmt;

use crate::persist::errors::PersistError;
use crate::persist::reader::GenericReader;
use crate::persist::versioned::{Decoder, Layer};
use crate::persist::writer::GenericWriter;

pub const MOBILE_SERIAL_MIN: u32 = 0x0000_0001;
pub const MOBILE_SERIAL_MAX: u32 = 0x3FFF_FFFF;
pub const ITEM_SERIAL_MIN: u32 = 0x4000_0000;
pub const ITEM_SERIAL_MAX: u32 = 0x7FFF_FFFF;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(u32);

impl Serial {
    /// Written as `-1` wherever an entity reference is empty.
    pub const NONE: Serial = Serial(u32::MAX);

    pub const fn new(value: u32) -> Self {
        Serial(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn is_mobile(self) -> bool {
        (MOBILE_SERIAL_MIN..=MOBILE_SERIAL_MAX).contains(&self.0)
    }

    pub fn is_item(self) -> bool {
        (ITEM_SERIAL_MIN..=ITEM_SERIAL_MAX).contains(&self.0)
    }

    pub fn is_valid(self) -> bool {
        self.is_mobile() || self.is_item()
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial(0x{:08X})", self.0)
    }
}

/// Monotonic serial allocator for both entity categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPool {
    next_mobile: u32,
    next_item: u32,
}

impl Default for SerialPool {
    fn default() -> Self {
        Self {
            next_mobile: MOBILE_SERIAL_MIN,
            next_item: ITEM_SERIAL_MIN,
        }
    }
}

impl SerialPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_mobile(&mut self) -> Result<Serial, PersistError> {
        if self.next_mobile > MOBILE_SERIAL_MAX {
            return Err(PersistError::SerialsExhausted("mobiles"));
        }
        let serial = Serial(self.next_mobile);
        self.next_mobile += 1;
        Ok(serial)
    }

    pub fn next_item(&mut self) -> Result<Serial, PersistError> {
        if self.next_item > ITEM_SERIAL_MAX {
            return Err(PersistError::SerialsExhausted("items"));
        }
        let serial = Serial(self.next_item);
        self.next_item += 1;
        Ok(serial)
    }

    /// Raise the high-water mark past `serial`. Called for every loaded record,
    /// including ones that failed to decode, so their serials stay dead.
    pub fn observe(&mut self, serial: Serial) {
        let value = serial.value();
        if serial.is_mobile() && value >= self.next_mobile {
            self.next_mobile = value + 1;
        } else if serial.is_item() && value >= self.next_item {
            self.next_item = value + 1;
        }
    }

    /// Mark a deleted entity's serial as permanently used.
    pub fn retire(&mut self, serial: Serial) {
        log::debug!("retiring serial {}", serial);
        self.observe(serial);
    }

    /// True if `serial` has ever been handed out (or observed) by this pool.
    pub fn was_issued(&self, serial: Serial) -> bool {
        let value = serial.value();
        (serial.is_mobile() && value < self.next_mobile) || (serial.is_item() && value < self.next_item)
    }

    pub fn peek_next_mobile(&self) -> u32 {
        self.next_mobile
    }

    pub fn peek_next_item(&self) -> u32 {
        self.next_item
    }
}

impl Layer for SerialPool {
    const NAME: &'static str = "SerialPool";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut GenericWriter) {
        w.write_u32(self.next_mobile);
        w.write_u32(self.next_item);
    }

    fn decoders() -> &'static [(u32, Decoder<Self>)] {
        &[(0, decode_pool_v0)]
    }
}

fn decode_pool_v0(r: &mut GenericReader<'_>) -> Result<SerialPool, PersistError> {
    let next_mobile = r.read_u32()?;
    let next_item = r.read_u32()?;
    if !(MOBILE_SERIAL_MIN..=MOBILE_SERIAL_MAX + 1).contains(&next_mobile) {
        return Err(r.out_of_domain("next_mobile", next_mobile as i64));
    }
    if !(ITEM_SERIAL_MIN..=ITEM_SERIAL_MAX + 1).contains(&next_item) {
        return Err(r.out_of_domain("next_item", next_item as i64));
    }
    Ok(SerialPool {
        next_mobile,
        next_item,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::versioned::{decode_layer, encode_layer};

    #[test]
    fn ranges_split_items_and_mobiles() {
        assert!(Serial::new(1).is_mobile());
        assert!(Serial::new(0x4000_0001).is_item());
        assert!(!Serial::new(0).is_valid());
        assert!(!Serial::NONE.is_valid());
    }

    #[test]
    fn retired_serials_are_never_reissued() {
        let mut pool = SerialPool::new();
        let a = pool.next_item().unwrap();
        let b = pool.next_item().unwrap();
        pool.retire(b);
        let c = pool.next_item().unwrap();
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert!(c > b);
    }

    #[test]
    fn observe_raises_high_water_mark() {
        let mut pool = SerialPool::new();
        pool.observe(Serial::new(0x4000_0100));
        assert_eq!(pool.next_item().unwrap(), Serial::new(0x4000_0101));
        pool.observe(Serial::new(5));
        assert_eq!(pool.next_mobile().unwrap(), Serial::new(6));
        assert!(pool.was_issued(Serial::new(3)));
    }

    #[test]
    fn pool_survives_the_codec() {
        let mut pool = SerialPool::new();
        for _ in 0..10 {
            pool.next_mobile().unwrap();
        }
        let mut w = GenericWriter::new();
        encode_layer(&pool, &mut w);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let decoded: SerialPool = decode_layer(&mut r).unwrap();
        assert_eq!(decoded, pool);
    }

    #[test]
    fn exhausted_mobile_space_is_an_error() {
        let mut pool = SerialPool::new();
        pool.observe(Serial::new(MOBILE_SERIAL_MAX));
        assert!(matches!(
            pool.next_mobile(),
            Err(PersistError::SerialsExhausted("mobiles"))
        ));
    }
}
