//! Typed property codec: string cells to [`TypedValue`]s and back.
//!
//! Non-string kinds trim the cell first; an empty trimmed cell means "no
//! value" and parses to `None`. String cells are kept verbatim, including
//! the empty string.

use std::fmt;

use netinv_graph::{PropertyKind, PropertyType, TypedValue};

#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    InvalidFormat { value: String, kind: PropertyKind },
    InvalidEnumValue { value: String, allowed: Vec<String> },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { value, kind } => write!(f, "cannot parse '{value}' as {kind}"),
            Self::InvalidEnumValue { value, allowed } => {
                write!(f, "'{value}' is not one of [{}]", allowed.join(", "))
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Parse a raw cell according to `property_type`'s kind.
pub fn parse(property_type: &PropertyType, raw: &str) -> Result<Option<TypedValue>, CodecError> {
    parse_kind(property_type.kind, &property_type.enum_values, raw)
}

pub fn parse_kind(
    kind: PropertyKind,
    enum_values: &[String],
    raw: &str,
) -> Result<Option<TypedValue>, CodecError> {
    if kind == PropertyKind::String {
        return Ok(Some(TypedValue::String(raw.to_string())));
    }

    let cell = raw.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    let invalid = || CodecError::InvalidFormat {
        value: raw.to_string(),
        kind,
    };

    let value = match kind {
        PropertyKind::Integer => TypedValue::Integer(cell.parse::<i64>().map_err(|_| invalid())?),
        PropertyKind::Boolean => {
            if cell.eq_ignore_ascii_case("true") {
                TypedValue::Boolean(true)
            } else if cell.eq_ignore_ascii_case("false") {
                TypedValue::Boolean(false)
            } else {
                return Err(invalid());
            }
        }
        PropertyKind::Decimal => {
            let v = cell.parse::<f64>().map_err(|_| invalid())?;
            if !v.is_finite() {
                return Err(invalid());
            }
            TypedValue::Decimal(v)
        }
        PropertyKind::Enumerated => {
            if !enum_values.iter().any(|allowed| allowed == cell) {
                return Err(CodecError::InvalidEnumValue {
                    value: cell.to_string(),
                    allowed: enum_values.to_vec(),
                });
            }
            TypedValue::Enumerated(cell.to_string())
        }
        PropertyKind::String => TypedValue::String(raw.to_string()),
    };
    Ok(Some(value))
}

/// Render a value as a cell. `f64`'s `Display` is the shortest string that
/// parses back to the same value.
pub fn format(value: &TypedValue) -> String {
    match value {
        TypedValue::Integer(v) => v.to_string(),
        TypedValue::Boolean(v) => v.to_string(),
        TypedValue::Decimal(v) => v.to_string(),
        TypedValue::String(v) | TypedValue::Enumerated(v) => v.clone(),
    }
}
