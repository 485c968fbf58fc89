use std::fmt;

use thiserror::Error;

use crate::persist::serial::Serial;

/// Why a persisted record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptKind {
    /// The stream ended before a value could be read.
    Truncated { needed: usize, available: usize },
    /// The layer carries a version no writer ever emitted.
    UnknownVersion { found: i32, current: u32 },
    /// A collection count was negative.
    NegativeCount(i32),
    /// A collection count claims more elements than bytes remain.
    ImplausibleCount { count: usize, remaining: usize },
    /// A value was decoded but lies outside the field's domain.
    OutOfDomain { field: &'static str, value: i64 },
    /// A string payload was not valid UTF-8.
    InvalidUtf8,
    /// A 7-bit encoded integer ran past five bytes.
    BadEncodedInt,
    /// Bytes were left over after the last layer.
    TrailingBytes(usize),
    /// The record bytes do not match the checksum in the index.
    ChecksumMismatch { expected: u32, found: u32 },
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptKind::Truncated { needed, available } => {
                write!(f, "truncated: needed {} byte(s), {} available", needed, available)
            }
            CorruptKind::UnknownVersion { found, current } => {
                write!(f, "unknown schema version {} (current is {})", found, current)
            }
            CorruptKind::NegativeCount(count) => write!(f, "negative collection count {}", count),
            CorruptKind::ImplausibleCount { count, remaining } => write!(
                f,
                "collection count {} exceeds the {} remaining byte(s)",
                count, remaining
            ),
            CorruptKind::OutOfDomain { field, value } => {
                write!(f, "value {} out of domain for {}", value, field)
            }
            CorruptKind::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            CorruptKind::BadEncodedInt => write!(f, "malformed 7-bit encoded integer"),
            CorruptKind::TrailingBytes(n) => write!(f, "{} trailing byte(s) after record", n),
            CorruptKind::ChecksumMismatch { expected, found } => write!(
                f,
                "checksum mismatch: index says {:08X}, record hashes to {:08X}",
                expected, found
            ),
        }
    }
}

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Wrapper around IO errors. Fatal to the save or load in progress.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be decoded.
    #[error("corrupt {layer} record at byte {offset}: {kind}")]
    CorruptRecord {
        layer: &'static str,
        offset: usize,
        kind: CorruptKind,
    },

    /// The type database names a type the catalog does not know.
    #[error("unknown entity type '{0}'")]
    UnknownType(String),

    /// Two catalog registrations used the same name.
    #[error("entity type '{0}' registered twice")]
    DuplicateType(String),

    /// Two records in one save claim the same serial.
    #[error("duplicate serial {0}")]
    DuplicateSerial(Serial),

    /// A serial was handed to the wrong category.
    #[error("serial {0} is not a valid {1} serial")]
    WrongCategory(Serial, &'static str),

    /// The serial space of a category is used up.
    #[error("serial space exhausted for {0}")]
    SerialsExhausted(&'static str),

    /// A save directory is missing one of its streams.
    #[error("save is incomplete: {0}")]
    IncompleteSave(String),

    /// Loading one entity failed; `source` says why.
    #[error("cannot load {type_name} {serial}: {source}")]
    Entity {
        serial: Serial,
        type_name: String,
        #[source]
        source: Box<PersistError>,
    },
}

impl PersistError {
    pub fn corrupt(layer: &'static str, offset: usize, kind: CorruptKind) -> Self {
        PersistError::CorruptRecord {
            layer,
            offset,
            kind,
        }
    }

    /// True for errors that describe bad record bytes rather than environment failures.
    pub fn is_corrupt_record(&self) -> bool {
        match self {
            PersistError::CorruptRecord { .. } => true,
            PersistError::Entity { source, .. } => source.is_corrupt_record(),
            _ => false,
        }
    }

    /// The corruption detail, if this is a corrupt-record error.
    pub fn corrupt_kind(&self) -> Option<&CorruptKind> {
        match self {
            PersistError::CorruptRecord { kind, .. } => Some(kind),
            PersistError::Entity { source, .. } => source.corrupt_kind(),
            _ => None,
        }
    }
}
