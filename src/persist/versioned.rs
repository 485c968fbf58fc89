//! Versioned layers and their decode tables.
//!
//! A layer is one slice of an entity record (the base item fields, the stack
//! fields, the armor fields, ...). On the wire every layer is
//! `[version:i32][fields...]`. Writers always emit [`Layer::VERSION`]; readers
//! look the stored version up in [`Layer::decoders`], an explicit table from
//! version number to a pure decode function. Each decode function reads
//! exactly the layout of its version and returns the current in-memory value,
//! filling fields introduced later with their documented defaults.
//!
//! A version missing from the table was never emitted by any writer and is
//! rejected as corrupt; nothing falls through from one version to another.

use log::debug;

use crate::persist::errors::{CorruptKind, PersistError};
use crate::persist::reader::GenericReader;
use crate::persist::writer::GenericWriter;

pub type Decoder<T> = fn(&mut GenericReader<'_>) -> Result<T, PersistError>;

pub trait Layer: Sized + 'static {
    /// Layer name used in error messages.
    const NAME: &'static str;

    /// Version written by [`Layer::encode`].
    const VERSION: u32;

    /// Write the fields of the current layout, without the version prefix.
    fn encode(&self, w: &mut GenericWriter);

    /// Every version this layer has ever been written with.
    fn decoders() -> &'static [(u32, Decoder<Self>)];
}

pub fn encode_layer<L: Layer>(layer: &L, w: &mut GenericWriter) {
    w.write_i32(L::VERSION as i32);
    layer.encode(w);
}

pub fn decode_layer<L: Layer>(r: &mut GenericReader<'_>) -> Result<L, PersistError> {
    let previous = r.enter_layer(L::NAME);
    let result = decode_versioned::<L>(r);
    r.enter_layer(previous);
    result
}

fn decode_versioned<L: Layer>(r: &mut GenericReader<'_>) -> Result<L, PersistError> {
    let start = r.position();
    let found = r.read_i32()?;
    let decoder = u32::try_from(found)
        .ok()
        .and_then(|version| lookup_decoder::<L>(version))
        .ok_or_else(|| {
            PersistError::corrupt(
                L::NAME,
                start,
                CorruptKind::UnknownVersion {
                    found,
                    current: L::VERSION,
                },
            )
        })?;
    let value = decoder(r)?;
    if (found as u32) < L::VERSION {
        r.note_upgrade();
        debug!(
            "Upgraded {} layer from schema v{} to v{}",
            L::NAME,
            found,
            L::VERSION
        );
    }
    Ok(value)
}

fn lookup_decoder<L: Layer>(version: u32) -> Option<Decoder<L>> {
    if version > L::VERSION {
        return None;
    }
    L::decoders()
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, decoder)| *decoder)
}

/// Write a layer that has never carried fields: just its version.
pub fn encode_marker(w: &mut GenericWriter, version: u32) {
    w.write_i32(version as i32);
}

/// Read a field-less layer written by [`encode_marker`]. Every version up to
/// `current` had the same (empty) layout, so all of them are accepted. Returns
/// the stored version for types that apply fix-ups to older records.
pub fn decode_marker(
    r: &mut GenericReader<'_>,
    name: &'static str,
    current: u32,
) -> Result<u32, PersistError> {
    let previous = r.enter_layer(name);
    let start = r.position();
    let result = r.read_i32().and_then(|found| match u32::try_from(found) {
        Ok(version) if version <= current => Ok(version),
        _ => Err(PersistError::corrupt(
            name,
            start,
            CorruptKind::UnknownVersion { found, current },
        )),
    });
    r.enter_layer(previous);
    let version = result?;
    if version < current {
        r.note_upgrade();
    }
    Ok(version)
}

/// Check a layer's decode table: the current version must be present and no
/// version may appear twice or exceed the current one.
pub fn validate_table<L: Layer>() -> Result<(), String> {
    let table = L::decoders();
    if !table.iter().any(|(v, _)| *v == L::VERSION) {
        return Err(format!(
            "{} has no decoder for its current version {}",
            L::NAME,
            L::VERSION
        ));
    }
    for (i, (version, _)) in table.iter().enumerate() {
        if *version > L::VERSION {
            return Err(format!(
                "{} decodes v{} but only writes v{}",
                L::NAME,
                version,
                L::VERSION
            ));
        }
        if table[..i].iter().any(|(v, _)| v == version) {
            return Err(format!("{} lists v{} twice", L::NAME, version));
        }
    }
    Ok(())
}

/// Encode a standalone single-layer record.
pub fn encode_record<L: Layer>(layer: &L) -> Vec<u8> {
    let mut w = GenericWriter::new();
    encode_layer(layer, &mut w);
    w.into_inner()
}

/// Decode a standalone single-layer record, rejecting trailing bytes.
pub fn decode_record<L: Layer>(bytes: &[u8]) -> Result<L, PersistError> {
    decode_record_upgraded(bytes).map(|(value, _)| value)
}

/// Like [`decode_record`], also returning how many layers of the record were
/// read at an older version.
pub fn decode_record_upgraded<L: Layer>(bytes: &[u8]) -> Result<(L, usize), PersistError> {
    let mut r = GenericReader::new(bytes);
    let value = decode_layer(&mut r)?;
    r.enter_layer(L::NAME);
    r.expect_end()?;
    Ok((value, r.upgraded_layers()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A layer with a three-step history: v0 had `a`, v1 added `b` (default 7),
    /// v2 dropped nothing and added `c` (default "none"). v1 was never shipped
    /// with a `b` of zero, so the default is explicit.
    #[derive(Debug, PartialEq)]
    struct Sample {
        a: i32,
        b: i32,
        c: Option<String>,
    }

    impl Layer for Sample {
        const NAME: &'static str = "Sample";
        const VERSION: u32 = 2;

        fn encode(&self, w: &mut GenericWriter) {
            w.write_i32(self.a);
            w.write_i32(self.b);
            w.write_string(self.c.as_deref());
        }

        fn decoders() -> &'static [(u32, Decoder<Self>)] {
            &[(0, sample_v0), (1, sample_v1), (2, sample_v2)]
        }
    }

    fn sample_v0(r: &mut GenericReader<'_>) -> Result<Sample, PersistError> {
        Ok(Sample {
            a: r.read_i32()?,
            b: 7,
            c: None,
        })
    }

    fn sample_v1(r: &mut GenericReader<'_>) -> Result<Sample, PersistError> {
        let a = r.read_i32()?;
        let b = r.read_i32()?;
        Ok(Sample { a, b, c: None })
    }

    fn sample_v2(r: &mut GenericReader<'_>) -> Result<Sample, PersistError> {
        let a = r.read_i32()?;
        let b = r.read_i32()?;
        let c = r.read_string()?;
        Ok(Sample { a, b, c })
    }

    #[test]
    fn current_version_round_trips() {
        let sample = Sample {
            a: 1,
            b: 2,
            c: Some("three".into()),
        };
        let bytes = encode_record(&sample);
        assert_eq!(decode_record::<Sample>(&bytes).unwrap(), sample);
    }

    #[test]
    fn old_versions_get_defaults_and_count_as_upgrades() {
        let mut w = GenericWriter::new();
        w.write_i32(0);
        w.write_i32(41);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        let sample: Sample = decode_layer(&mut r).unwrap();
        assert_eq!(
            sample,
            Sample {
                a: 41,
                b: 7,
                c: None
            }
        );
        assert_eq!(r.upgraded_layers(), 1);
    }

    #[test]
    fn future_version_is_rejected() {
        let mut w = GenericWriter::new();
        w.write_i32(3);
        w.write_i32(0);
        let bytes = w.into_inner();
        let err = decode_record::<Sample>(&bytes).unwrap_err();
        assert_eq!(
            err.corrupt_kind(),
            Some(&CorruptKind::UnknownVersion {
                found: 3,
                current: 2
            })
        );
    }

    #[test]
    fn negative_version_is_rejected() {
        let bytes = (-1i32).to_le_bytes();
        let err = decode_record::<Sample>(&bytes).unwrap_err();
        assert!(matches!(
            err.corrupt_kind(),
            Some(CorruptKind::UnknownVersion { found: -1, .. })
        ));
    }

    #[test]
    fn trailing_bytes_fail_a_record() {
        let mut bytes = encode_record(&Sample {
            a: 1,
            b: 2,
            c: None,
        });
        bytes.push(0);
        assert!(decode_record::<Sample>(&bytes).unwrap_err().is_corrupt_record());
    }

    #[test]
    fn sample_table_is_valid() {
        validate_table::<Sample>().unwrap();
    }

    struct Gapped;

    impl Layer for Gapped {
        const NAME: &'static str = "Gapped";
        const VERSION: u32 = 2;

        fn encode(&self, _w: &mut GenericWriter) {}

        fn decoders() -> &'static [(u32, Decoder<Self>)] {
            &[(0, gapped_any), (2, gapped_any)]
        }
    }

    fn gapped_any(_r: &mut GenericReader<'_>) -> Result<Gapped, PersistError> {
        Ok(Gapped)
    }

    #[test]
    fn version_gap_is_rejected_even_below_current() {
        let bytes = 1i32.to_le_bytes();
        let err = decode_record::<Gapped>(&bytes).err().unwrap();
        assert!(matches!(
            err.corrupt_kind(),
            Some(CorruptKind::UnknownVersion { found: 1, current: 2 })
        ));
    }

    #[test]
    fn markers_accept_every_version_up_to_current() {
        let mut w = GenericWriter::new();
        encode_marker(&mut w, 0);
        encode_marker(&mut w, 1);
        encode_marker(&mut w, 2);
        let bytes = w.into_inner();
        let mut r = GenericReader::new(&bytes);
        assert_eq!(decode_marker(&mut r, "Table", 1).unwrap(), 0);
        assert_eq!(decode_marker(&mut r, "Table", 1).unwrap(), 1);
        assert_eq!(r.upgraded_layers(), 1);
        let err = decode_marker(&mut r, "Table", 1).unwrap_err();
        assert_eq!(
            err.corrupt_kind(),
            Some(&CorruptKind::UnknownVersion { found: 2, current: 1 })
        );
    }
}
