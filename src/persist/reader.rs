//! Bounds-checked binary reader, the mirror of [`GenericWriter`].
//!
//! Every read either yields a value inside its domain or a
//! [`PersistError::CorruptRecord`] pointing at the offending offset. Nothing
//! here panics on hostile input.
//!
//! [`GenericWriter`]: crate::persist::writer::GenericWriter

use chrono::{DateTime, Utc};

use crate::persist::errors::{CorruptKind, PersistError};
use crate::persist::serial::Serial;
use crate::persist::writer::{TICKS_AT_UNIX_EPOCH, TICKS_PER_SECOND};
use crate::persist::WireEnum;
use crate::world::geo::{Map, Point3D};

pub struct GenericReader<'a> {
    data: &'a [u8],
    pos: usize,
    layer: &'static str,
    upgraded: usize,
}

impl<'a> GenericReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            layer: "record",
            upgraded: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Name the layer being decoded so errors point at it. Returns the previous name.
    pub fn enter_layer(&mut self, layer: &'static str) -> &'static str {
        std::mem::replace(&mut self.layer, layer)
    }

    pub fn layer(&self) -> &'static str {
        self.layer
    }

    pub(crate) fn note_upgrade(&mut self) {
        self.upgraded += 1;
    }

    /// How many layers were decoded from an older schema version.
    pub fn upgraded_layers(&self) -> usize {
        self.upgraded
    }

    pub fn corrupt(&self, kind: CorruptKind) -> PersistError {
        PersistError::corrupt(self.layer, self.pos, kind)
    }

    pub fn out_of_domain(&self, field: &'static str, value: i64) -> PersistError {
        self.corrupt(CorruptKind::OutOfDomain { field, value })
    }

    /// Fail unless every byte has been consumed.
    pub fn expect_end(&self) -> Result<(), PersistError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(self.corrupt(CorruptKind::TrailingBytes(n))),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PersistError> {
        let available = self.remaining();
        if n > available {
            return Err(self.corrupt(CorruptKind::Truncated {
                needed: n,
                available,
            }));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PersistError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, PersistError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, PersistError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, PersistError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.pos -= 1;
                Err(self.out_of_domain("bool", other as i64))
            }
        }
    }

    pub fn read_i16(&mut self) -> Result<i16, PersistError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, PersistError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, PersistError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, PersistError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, PersistError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, PersistError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, PersistError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn read_encoded_int(&mut self) -> Result<i32, PersistError> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            if shift >= 35 {
                return Err(self.corrupt(CorruptKind::BadEncodedInt));
            }
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
            shift += 7;
        }
    }

    pub fn read_string(&mut self) -> Result<Option<String>, PersistError> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let len = self.read_encoded_int()?;
        if len < 0 {
            return Err(self.out_of_domain("string length", len as i64));
        }
        let start = self.pos;
        let bytes = self.take(len as usize)?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Some(text.to_string())),
            Err(_) => Err(PersistError::corrupt(self.layer, start, CorruptKind::InvalidUtf8)),
        }
    }

    pub fn read_datetime(&mut self) -> Result<DateTime<Utc>, PersistError> {
        let ticks = self.read_i64()?;
        if ticks < 0 {
            return Err(self.out_of_domain("datetime", ticks));
        }
        let since_epoch = ticks - TICKS_AT_UNIX_EPOCH;
        let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
        let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).ok_or_else(|| self.out_of_domain("datetime", ticks))
    }

    pub fn read_point3d(&mut self) -> Result<Point3D, PersistError> {
        let x = self.read_i32()?;
        let y = self.read_i32()?;
        let z = self.read_i32()?;
        Ok(Point3D::new(x, y, z))
    }

    pub fn read_map(&mut self) -> Result<Map, PersistError> {
        self.read_enum::<Map>()
    }

    pub fn read_serial(&mut self) -> Result<Serial, PersistError> {
        Ok(Serial::new(self.read_i32()? as u32))
    }

    /// Entity reference. `-1` and `0` both mean "nothing".
    pub fn read_entity_ref(&mut self) -> Result<Option<Serial>, PersistError> {
        let raw = self.read_i32()?;
        match raw {
            -1 | 0 => Ok(None),
            _ => {
                let serial = Serial::new(raw as u32);
                if serial.is_valid() {
                    Ok(Some(serial))
                } else {
                    self.pos -= 4;
                    Err(self.out_of_domain("entity reference", raw as i64))
                }
            }
        }
    }

    /// Collection count. Each element takes at least one byte, so a count larger
    /// than the remaining stream is rejected before any allocation happens.
    pub fn read_count(&mut self) -> Result<usize, PersistError> {
        let count = self.read_encoded_int()?;
        if count < 0 {
            return Err(self.corrupt(CorruptKind::NegativeCount(count)));
        }
        let count = count as usize;
        if count > self.remaining() {
            return Err(self.corrupt(CorruptKind::ImplausibleCount {
                count,
                remaining: self.remaining(),
            }));
        }
        Ok(count)
    }

    pub fn read_list<T>(
        &mut self,
        mut read_one: impl FnMut(&mut Self) -> Result<T, PersistError>,
    ) -> Result<Vec<T>, PersistError> {
        let count = self.read_count()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_one(self)?);
        }
        Ok(items)
    }

    pub fn read_enum<E: WireEnum>(&mut self) -> Result<E, PersistError> {
        let raw = self.read_u8()?;
        match E::from_wire(raw) {
            Some(value) => Ok(value),
            None => {
                self.pos -= 1;
                Err(self.out_of_domain(E::FIELD, raw as i64))
            }
        }
    }
}
