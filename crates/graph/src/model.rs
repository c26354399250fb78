use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{EquipmentId, LinkId, LocationId, LocationTypeId, PortId, PropertyTypeId};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One level of the location hierarchy. `index` 0 is the outermost level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationType {
    pub id: LocationTypeId,
    pub name: String,
    pub index: usize,
}

/// Entity kinds that can own typed properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Link,
    Equipment,
    Port,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Equipment => "equipment",
            Self::Port => "port",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "link" => Ok(Self::Link),
            "equipment" => Ok(Self::Equipment),
            "port" => Ok(Self::Port),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Integer,
    Boolean,
    Decimal,
    String,
    Enumerated,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Enumerated => "enumerated",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Integer),
            "bool" | "boolean" => Ok(Self::Boolean),
            "float" | "decimal" => Ok(Self::Decimal),
            "string" | "text" => Ok(Self::String),
            "enum" | "enumerated" => Ok(Self::Enumerated),
            other => Err(format!("unknown property kind: {other}")),
        }
    }
}

/// A typed property value. The variant always matches the owning
/// [`PropertyType`]'s kind; stores reject mismatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Integer(i64),
    Boolean(bool),
    Decimal(f64),
    String(String),
    Enumerated(String),
}

impl TypedValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Integer(_) => PropertyKind::Integer,
            Self::Boolean(_) => PropertyKind::Boolean,
            Self::Decimal(_) => PropertyKind::Decimal,
            Self::String(_) => PropertyKind::String,
            Self::Enumerated(_) => PropertyKind::Enumerated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyType {
    pub id: PropertyTypeId,
    pub entity: EntityKind,
    pub name: String,
    pub kind: PropertyKind,
    pub default: Option<TypedValue>,
    /// Allowed values for `Enumerated`; empty for every other kind.
    pub enum_values: Vec<String>,
    /// Canonical position among the entity kind's property types.
    pub index: usize,
}

/// Registration request for a property type.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPropertyType {
    pub entity: EntityKind,
    pub name: String,
    pub kind: PropertyKind,
    pub default: Option<TypedValue>,
    pub enum_values: Vec<String>,
}

impl NewPropertyType {
    pub fn new(entity: EntityKind, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            entity,
            name: name.into(),
            kind,
            default: None,
            enum_values: Vec::new(),
        }
    }

    pub fn with_default(mut self, value: TypedValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the definition is self-consistent (name, enum set, default kind).
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("property type name must not be empty".into());
        }
        match self.kind {
            PropertyKind::Enumerated if self.enum_values.is_empty() => {
                return Err(format!(
                    "enumerated property '{}' needs at least one value",
                    self.name
                ));
            }
            PropertyKind::Enumerated => {}
            _ if !self.enum_values.is_empty() => {
                return Err(format!(
                    "property '{}' is {}, enum values are only allowed for enumerated",
                    self.name, self.kind
                ));
            }
            _ => {}
        }
        if let Some(ref default) = self.default {
            check_value(&self.name, self.kind, &self.enum_values, default)?;
        }
        Ok(())
    }
}

/// Verify a value is consistent with a property type's kind and enum set.
pub fn check_value(
    name: &str,
    kind: PropertyKind,
    enum_values: &[String],
    value: &TypedValue,
) -> Result<(), String> {
    if value.kind() != kind {
        return Err(format!(
            "property '{name}' is {kind}, got a {} value",
            value.kind()
        ));
    }
    match value {
        TypedValue::Enumerated(v) if !enum_values.iter().any(|allowed| allowed == v) => Err(
            format!("property '{name}': '{v}' is not one of [{}]", enum_values.join(", ")),
        ),
        TypedValue::Decimal(v) if !v.is_finite() => {
            Err(format!("property '{name}': decimal values must be finite"))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub location_type: LocationTypeId,
    pub parent: Option<LocationId>,
}

/// Where an equipment lives: directly in a location or nested in another equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Container {
    Location(LocationId),
    Equipment(EquipmentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub equipment_type: String,
    pub container: Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub port_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquipmentType {
    pub name: String,
    pub ports: Vec<PortDefinition>,
}

impl EquipmentType {
    pub fn port_definition(&self, port_name: &str) -> Option<&PortDefinition> {
        self.ports.iter().find(|p| p.name == port_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub equipment: EquipmentId,
    /// Port type from the equipment type's matching port definition, if any.
    pub port_type: Option<String>,
}

/// A link between two distinct ports. Endpoints are stored normalized
/// (`a < b`), endpoint order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: LinkId,
    pub a: PortId,
    pub b: PortId,
}

impl Link {
    pub fn connects(&self, p: PortId, q: PortId) -> bool {
        (self.a, self.b) == port_pair(p, q)
    }
}

/// Normalize an unordered port pair.
#[inline]
pub fn port_pair(p: PortId, q: PortId) -> (PortId, PortId) {
    if p <= q {
        (p, q)
    } else {
        (q, p)
    }
}

/// Owner of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Link(LinkId),
    Equipment(EquipmentId),
    Port(PortId),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Link(_) => EntityKind::Link,
            Self::Equipment(_) => EntityKind::Equipment,
            Self::Port(_) => EntityKind::Port,
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            Self::Link(id) => id.raw(),
            Self::Equipment(id) => id.raw(),
            Self::Port(id) => id.raw(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(id) => write!(f, "{id}"),
            Self::Equipment(id) => write!(f, "{id}"),
            Self::Port(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValue {
    pub property_type: PropertyTypeId,
    pub value: TypedValue,
}
