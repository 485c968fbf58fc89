//! Append-only binary writer used by every layer's `encode`.
//!
//! All multi-byte values are little-endian. Writing into memory cannot fail;
//! the only failure point of a save is flushing these buffers to disk.

use chrono::{DateTime, SubsecRound, Utc};

use crate::persist::serial::Serial;
use crate::world::geo::{Map, Point3D};

/// 100-ns ticks between 0001-01-01 and the Unix epoch.
pub const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// `value` cut to the 100-ns precision a stored timestamp keeps.
pub fn to_tick_precision(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(7)
}

/// The current time at stored precision.
pub fn now() -> DateTime<Utc> {
    to_tick_precision(Utc::now())
}

#[derive(Debug, Default, Clone)]
pub struct GenericWriter {
    buf: Vec<u8>,
}

impl GenericWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// 7 bits per byte, high bit set on every byte but the last.
    pub fn write_encoded_int(&mut self, value: i32) {
        let mut v = value as u32;
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Presence byte, then encoded length and UTF-8 bytes when present.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            Some(text) => {
                self.write_bool(true);
                self.write_encoded_int(text.len() as i32);
                self.buf.extend_from_slice(text.as_bytes());
            }
            None => self.write_bool(false),
        }
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_string(Some(value));
    }

    pub fn write_datetime(&mut self, value: DateTime<Utc>) {
        let ticks = TICKS_AT_UNIX_EPOCH
            + value.timestamp() * TICKS_PER_SECOND
            + i64::from(value.timestamp_subsec_nanos() / 100);
        self.write_i64(ticks);
    }

    pub fn write_point3d(&mut self, value: Point3D) {
        self.write_i32(value.x);
        self.write_i32(value.y);
        self.write_i32(value.z);
    }

    pub fn write_map(&mut self, value: Map) {
        self.write_u8(value as u8);
    }

    pub fn write_serial(&mut self, value: Serial) {
        self.write_i32(value.value() as i32);
    }

    /// Entity reference; `None` is stored as `-1`.
    pub fn write_entity_ref(&mut self, value: Option<Serial>) {
        self.write_serial(value.unwrap_or(Serial::NONE));
    }

    pub fn write_count(&mut self, count: usize) {
        self.write_encoded_int(count as i32);
    }

    pub fn write_list<T>(&mut self, items: &[T], mut write_one: impl FnMut(&mut Self, &T)) {
        self.write_count(items.len());
        for item in items {
            write_one(self, item);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_int_uses_seven_bit_groups() {
        let mut w = GenericWriter::new();
        w.write_encoded_int(0x7F);
        w.write_encoded_int(0x80);
        w.write_encoded_int(300);
        assert_eq!(w.as_slice(), &[0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn negative_encoded_int_takes_five_bytes() {
        let mut w = GenericWriter::new();
        w.write_encoded_int(-1);
        assert_eq!(w.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn strings_carry_presence_and_length() {
        let mut w = GenericWriter::new();
        w.write_string(Some("ok"));
        w.write_string(None);
        assert_eq!(w.as_slice(), &[1, 2, b'o', b'k', 0]);
    }

    #[test]
    fn empty_reference_is_minus_one() {
        let mut w = GenericWriter::new();
        w.write_entity_ref(None);
        assert_eq!(w.as_slice(), &(-1i32).to_le_bytes());
    }
}
