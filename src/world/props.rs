//! Named property access for administrative editing.
//!
//! Every entity exposes its editable fields by name. Values travel as text,
//! the way a staff member types them. Setting a property can fail in three
//! ways (unknown name, read-only, bad value); callers in the admin layer turn
//! these into a message for the staff member rather than an error for the
//! process.

use thiserror::Error;

use crate::persist::WireEnum;
use crate::world::geo::Point3D;

#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("property '{0}' not found")]
    Unknown(String),

    #[error("property '{0}' is read only")]
    ReadOnly(&'static str),

    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("entity {0} not found")]
    NoSuchEntity(String),
}

/// One layer's slice of an entity's editable fields.
pub trait Properties {
    /// Current values, in display order.
    fn list_properties(&self, out: &mut Vec<(&'static str, String)>);

    /// Set `name` from text. Return [`PropertyError::Unknown`] for names this
    /// layer does not own so the next layer can try.
    fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError>;
}

/// Offer `name` to each layer in turn until one owns it.
pub fn set_on_layers(
    layers: &mut [&mut dyn Properties],
    name: &str,
    value: &str,
) -> Result<(), PropertyError> {
    for layer in layers.iter_mut() {
        match layer.set_property(name, value) {
            Err(PropertyError::Unknown(_)) => continue,
            other => return other,
        }
    }
    Err(PropertyError::Unknown(name.to_string()))
}

pub fn list_layers(layers: &[&dyn Properties]) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    for layer in layers {
        layer.list_properties(&mut out);
    }
    out
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> PropertyError {
    PropertyError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Integers accept decimal or `0x` hex, as staff commonly type hues and ids in hex.
pub fn parse_i32(name: &'static str, value: &str) -> Result<i32, PropertyError> {
    let text = value.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).map_err(|e| invalid(name, value, e))?,
        None => text.parse::<i64>().map_err(|e| invalid(name, value, e))?,
    };
    i32::try_from(parsed).map_err(|_| invalid(name, value, "out of range"))
}

pub fn parse_i32_in(
    name: &'static str,
    value: &str,
    range: std::ops::RangeInclusive<i32>,
) -> Result<i32, PropertyError> {
    let parsed = parse_i32(name, value)?;
    if !range.contains(&parsed) {
        return Err(invalid(
            name,
            value,
            format!("must be between {} and {}", range.start(), range.end()),
        ));
    }
    Ok(parsed)
}

pub fn parse_f64(name: &'static str, value: &str) -> Result<f64, PropertyError> {
    let parsed = value.trim().parse::<f64>().map_err(|e| invalid(name, value, e))?;
    if !parsed.is_finite() {
        return Err(invalid(name, value, "must be finite"));
    }
    Ok(parsed)
}

pub fn parse_bool(name: &'static str, value: &str) -> Result<bool, PropertyError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

pub fn parse_enum<E: WireEnum>(name: &'static str, value: &str) -> Result<E, PropertyError> {
    E::parse_name(value).ok_or_else(|| {
        let options: Vec<&str> = E::variants().iter().map(|v| v.name()).collect();
        invalid(name, value, format!("expected one of {}", options.join(", ")))
    })
}

pub fn parse_point(name: &'static str, value: &str) -> Result<Point3D, PropertyError> {
    value.parse::<Point3D>().map_err(|e| invalid(name, value, e))
}

/// `null` (any case) clears an optional string.
pub fn parse_opt_string(value: &str) -> Option<String> {
    if value.trim().eq_ignore_ascii_case("null") {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn show_opt(value: &Option<String>) -> String {
    match value {
        Some(text) => text.clone(),
        None => "(-null-)".to_string(),
    }
}
