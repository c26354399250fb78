//! Row schema: the column layout shared by link export and import.
//!
//! ```text
//! Link ID
//! <LocationType_1> A .. <LocationType_n> A, Parent Equipment A, Equipment A, Equipment Type A, Port A
//! <LocationType_1> B .. <LocationType_n> B, Parent Equipment B, Equipment B, Equipment Type B, Port B
//! <PropertyType_1> .. <PropertyType_m>
//! ```
//!
//! The schema is derived from the store once per batch, then bound to a
//! file's header. Binding decides which property columns are present; a
//! property whose column is missing is reported as [`PropertyCell::Absent`]
//! for every row.

use std::fmt;

use netinv_graph::{
    EntityKind, GraphStore, LinkId, LocationType, PropertyType, StoreError, TypedValue,
};
use serde::Serialize;

use crate::codec::{self, CodecError};
use crate::error::RowError;

pub const LINK_ID: &str = "Link ID";
pub const PARENT_EQUIPMENT: &str = "Parent Equipment";
pub const EQUIPMENT: &str = "Equipment";
pub const EQUIPMENT_TYPE: &str = "Equipment Type";
pub const PORT: &str = "Port";

/// Separator between nested equipment in the Parent Equipment cell.
pub const EQUIPMENT_PATH_SEPARATOR: char = '/';
/// Separator between a parent's name and its equipment type.
pub const EQUIPMENT_TYPE_SEPARATOR: char = ':';
/// Makes the next character in a Parent Equipment cell literal.
pub const EQUIPMENT_PATH_ESCAPE: char = '\\';

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RowSchema {
    /// Location hierarchy, outermost first.
    pub location_types: Vec<LocationType>,
    /// Link property types in canonical order.
    pub properties: Vec<PropertyType>,
}

impl RowSchema {
    pub fn load<S: GraphStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        Ok(Self {
            location_types: store.location_types()?,
            properties: store.property_types(EntityKind::Link)?,
        })
    }

    /// Number of columns per endpoint.
    pub fn side_width(&self) -> usize {
        self.location_types.len() + 4
    }

    /// Number of identity columns (Link ID plus both endpoints).
    pub fn identity_width(&self) -> usize {
        1 + 2 * self.side_width()
    }

    pub fn width(&self) -> usize {
        self.identity_width() + self.properties.len()
    }

    pub fn side_labels(&self, side: Side) -> Vec<String> {
        let mut labels: Vec<String> = self
            .location_types
            .iter()
            .map(|lt| format!("{} {side}", lt.name))
            .collect();
        for field in [PARENT_EQUIPMENT, EQUIPMENT, EQUIPMENT_TYPE, PORT] {
            labels.push(format!("{field} {side}"));
        }
        labels
    }

    pub fn identity_labels(&self) -> Vec<String> {
        let mut labels = vec![LINK_ID.to_string()];
        for side in Side::BOTH {
            labels.extend(self.side_labels(side));
        }
        labels
    }

    /// The full header as written by export.
    pub fn header(&self) -> Vec<String> {
        let mut labels = self.identity_labels();
        labels.extend(self.properties.iter().map(|pt| pt.name.clone()));
        labels
    }

    /// Bind the schema to a file header.
    ///
    /// With `validate`, identity labels must match exactly and property
    /// labels must be a subset of the schema's properties in canonical
    /// order. Without it, the header must have the full width and property
    /// columns are taken positionally.
    pub fn bind(&self, header: &[String], validate: bool) -> Result<BoundSchema<'_>, String> {
        let identity_width = self.identity_width();

        if !validate {
            if header.len() != self.width() {
                return Err(format!(
                    "header has {} columns, schema has {}",
                    header.len(),
                    self.width()
                ));
            }
            return Ok(BoundSchema {
                schema: self,
                width: header.len(),
                property_columns: (0..self.properties.len())
                    .map(|i| Some(identity_width + i))
                    .collect(),
            });
        }

        if header.len() < identity_width {
            return Err(format!(
                "header has {} columns, at least {identity_width} identity columns are required",
                header.len()
            ));
        }
        for (i, (expected, found)) in self.identity_labels().iter().zip(header).enumerate() {
            let found = if i == 0 { found.trim_start_matches(BOM) } else { found.as_str() };
            if expected != found {
                return Err(format!(
                    "column {}: expected '{expected}', found '{found}'",
                    i + 1
                ));
            }
        }

        let mut property_columns = vec![None; self.properties.len()];
        let mut next = 0;
        for (col, label) in header.iter().enumerate().skip(identity_width) {
            let Some(idx) = self.properties.iter().position(|pt| &pt.name == label) else {
                return Err(format!("column {}: unknown property '{label}'", col + 1));
            };
            if idx < next {
                return Err(format!(
                    "column {}: property '{label}' is duplicated or out of order",
                    col + 1
                ));
            }
            property_columns[idx] = Some(col);
            next = idx + 1;
        }

        Ok(BoundSchema {
            schema: self,
            width: header.len(),
            property_columns,
        })
    }
}

// ---------------------------------------------------------------------------
// Parsed rows
// ---------------------------------------------------------------------------

/// One property's cell in a parsed row.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyCell {
    /// The column is not part of this file.
    Absent,
    /// The column is present but holds no value (non-string kinds only).
    Empty,
    Value(TypedValue),
}

/// Identity chain of one link endpoint, as written in the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointIdentity {
    pub side: Side,
    pub location_path: Vec<String>,
    /// Enclosing equipment, outermost first. Empty when the equipment sits
    /// directly in the location.
    pub parent_equipment: Vec<ParentSegment>,
    pub equipment: String,
    pub equipment_type: Option<String>,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub link_id: Option<LinkId>,
    pub a: EndpointIdentity,
    pub b: EndpointIdentity,
    /// One cell per schema property, in canonical order.
    pub cells: Vec<PropertyCell>,
}

/// A [`RowSchema`] bound to one file's header.
#[derive(Debug)]
pub struct BoundSchema<'a> {
    schema: &'a RowSchema,
    width: usize,
    property_columns: Vec<Option<usize>>,
}

impl<'a> BoundSchema<'a> {
    pub fn schema(&self) -> &'a RowSchema {
        self.schema
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_present(&self, property_index: usize) -> bool {
        matches!(self.property_columns.get(property_index), Some(Some(_)))
    }

    /// Split a data row into its link ID, endpoint identities and typed cells.
    pub fn parse_row(&self, row: &[String]) -> Result<ParsedRow, RowError> {
        if row.len() != self.width {
            return Err(RowError::SchemaMismatch {
                expected: self.width,
                found: row.len(),
            });
        }

        let link_id = parse_link_id(&row[0])?;
        let side_width = self.schema.side_width();
        let a = self.parse_endpoint(Side::A, &row[1..1 + side_width])?;
        let b = self.parse_endpoint(Side::B, &row[1 + side_width..1 + 2 * side_width])?;

        let mut cells = Vec::with_capacity(self.schema.properties.len());
        for (pt, column) in self.schema.properties.iter().zip(&self.property_columns) {
            let cell = match column {
                None => PropertyCell::Absent,
                Some(col) => match codec::parse(pt, &row[*col]) {
                    Ok(Some(value)) => PropertyCell::Value(value),
                    Ok(None) => PropertyCell::Empty,
                    Err(e) => return Err(codec_error(pt, e)),
                },
            };
            cells.push(cell);
        }

        Ok(ParsedRow { link_id, a, b, cells })
    }

    fn parse_endpoint(&self, side: Side, cells: &[String]) -> Result<EndpointIdentity, RowError> {
        let depth = self.schema.location_types.len();
        let (path_cells, rest) = cells.split_at(depth);

        let mut location_path = Vec::new();
        let mut gap = None;
        for (i, cell) in path_cells.iter().enumerate() {
            let name = cell.trim();
            if name.is_empty() {
                gap.get_or_insert(i);
                continue;
            }
            if let Some(g) = gap {
                return Err(RowError::IncompleteIdentity {
                    side,
                    reason: format!(
                        "location '{}' is empty but '{}' is set",
                        self.schema.location_types[g].name, self.schema.location_types[i].name
                    ),
                });
            }
            location_path.push(name.to_string());
        }

        let parent = rest[0].trim();
        let parent_equipment = if parent.is_empty() {
            Vec::new()
        } else {
            parse_equipment_path(parent)
                .map_err(|reason| RowError::IncompleteIdentity { side, reason })?
        };
        let equipment_type = rest[2].trim();

        Ok(EndpointIdentity {
            side,
            location_path,
            parent_equipment,
            equipment: rest[1].trim().to_string(),
            equipment_type: (!equipment_type.is_empty()).then(|| equipment_type.to_string()),
            port: rest[3].trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Parent Equipment cell
// ---------------------------------------------------------------------------

/// One enclosing piece of equipment named in the Parent Equipment cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSegment {
    pub name: String,
    /// `None` when the cell gives only a name; the equipment must then exist.
    pub equipment_type: Option<String>,
}

impl ParentSegment {
    pub fn new(name: impl Into<String>, equipment_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            equipment_type: Some(equipment_type.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            equipment_type: None,
        }
    }
}

/// Render parents as `name:type/name:type`, escaping the separators and the escape character.
pub fn format_equipment_path(segments: &[ParentSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(EQUIPMENT_PATH_SEPARATOR);
        }
        push_escaped(&mut out, &segment.name);
        if let Some(ref equipment_type) = segment.equipment_type {
            out.push(EQUIPMENT_TYPE_SEPARATOR);
            push_escaped(&mut out, equipment_type);
        }
    }
    out
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(
            c,
            EQUIPMENT_PATH_SEPARATOR | EQUIPMENT_TYPE_SEPARATOR | EQUIPMENT_PATH_ESCAPE
        ) {
            out.push(EQUIPMENT_PATH_ESCAPE);
        }
        out.push(c);
    }
}

/// Parse a non-empty Parent Equipment cell into segments, outermost first.
pub fn parse_equipment_path(cell: &str) -> Result<Vec<ParentSegment>, String> {
    let mut segments = Vec::new();
    let mut name = String::new();
    let mut equipment_type: Option<String> = None;
    let mut chars = cell.chars();

    while let Some(c) = chars.next() {
        match c {
            EQUIPMENT_PATH_ESCAPE => {
                let next = chars
                    .next()
                    .ok_or_else(|| format!("parent equipment path '{cell}' ends with '\\'"))?;
                current_part(&mut name, &mut equipment_type).push(next);
            }
            EQUIPMENT_PATH_SEPARATOR => {
                segments.push(finish_segment(cell, &mut name, &mut equipment_type)?);
            }
            EQUIPMENT_TYPE_SEPARATOR if equipment_type.is_none() => {
                equipment_type = Some(String::new());
            }
            EQUIPMENT_TYPE_SEPARATOR => {
                return Err(format!(
                    "parent equipment path '{cell}' has a segment with two type separators"
                ));
            }
            _ => current_part(&mut name, &mut equipment_type).push(c),
        }
    }
    segments.push(finish_segment(cell, &mut name, &mut equipment_type)?);
    Ok(segments)
}

fn current_part<'a>(name: &'a mut String, equipment_type: &'a mut Option<String>) -> &'a mut String {
    match equipment_type {
        Some(t) => t,
        None => name,
    }
}

fn finish_segment(
    cell: &str,
    name: &mut String,
    equipment_type: &mut Option<String>,
) -> Result<ParentSegment, String> {
    let segment_name = std::mem::take(name).trim().to_string();
    if segment_name.is_empty() {
        return Err(format!("parent equipment path '{cell}' has an empty segment"));
    }
    let equipment_type = match equipment_type.take() {
        Some(t) if t.trim().is_empty() => {
            return Err(format!(
                "parent equipment '{segment_name}' in '{cell}' has an empty equipment type"
            ))
        }
        Some(t) => Some(t.trim().to_string()),
        None => None,
    };
    Ok(ParentSegment {
        name: segment_name,
        equipment_type,
    })
}

fn parse_link_id(cell: &str) -> Result<Option<LinkId>, RowError> {
    let cell = cell.trim_start_matches(BOM).trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<i64>()
        .map(|raw| Some(LinkId::from_raw(raw)))
        .map_err(|_| RowError::InvalidFormat {
            column: LINK_ID.to_string(),
            value: cell.to_string(),
            kind: "link id".to_string(),
        })
}

fn codec_error(pt: &PropertyType, e: CodecError) -> RowError {
    match e {
        CodecError::InvalidFormat { value, kind } => RowError::InvalidFormat {
            column: pt.name.clone(),
            value,
            kind: kind.to_string(),
        },
        CodecError::InvalidEnumValue { value, allowed } => RowError::InvalidEnumValue {
            column: pt.name.clone(),
            value,
            allowed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netinv_graph::{LocationTypeId, PropertyKind, PropertyTypeId};

    fn schema() -> RowSchema {
        let lt = |id, name: &str, index| LocationType {
            id: LocationTypeId(id),
            name: name.into(),
            index,
        };
        let pt = |id, name: &str, kind, index| PropertyType {
            id: PropertyTypeId(id),
            entity: EntityKind::Link,
            name: name.into(),
            kind,
            default: None,
            enum_values: Vec::new(),
            index,
        };
        RowSchema {
            location_types: vec![lt(1, "Site", 0), lt(2, "Room", 1)],
            properties: vec![
                pt(3, "weight", PropertyKind::Integer, 0),
                pt(4, "active", PropertyKind::Boolean, 1),
                pt(5, "label", PropertyKind::String, 2),
            ],
        }
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn row(props: &[&str]) -> Vec<String> {
        let mut cells = strings(&[
            "", "NYC", "R1", "", "sw1", "Switch", "p1", "NYC", "R2", "chassis/card", "sw2", "", "p2",
        ]);
        cells.extend(strings(props));
        cells
    }

    #[test]
    fn header_layout() {
        let header = schema().header();
        assert_eq!(header.len(), 16);
        assert_eq!(header[0], "Link ID");
        assert_eq!(header[1..7], strings(&[
            "Site A", "Room A", "Parent Equipment A", "Equipment A", "Equipment Type A", "Port A"
        ]));
        assert_eq!(header[7], "Site B");
        assert_eq!(header[13..], strings(&["weight", "active", "label"]));
    }

    #[test]
    fn full_header_binds_every_property() {
        let s = schema();
        let mut header = s.header();
        header[0] = format!("\u{feff}{}", header[0]);
        let bound = s.bind(&header, true).unwrap();
        assert!((0..3).all(|i| bound.is_present(i)));
    }

    #[test]
    fn identity_label_mismatch_is_rejected() {
        let s = schema();
        let mut header = s.header();
        header[4] = "Equipment".into();
        assert!(s.bind(&header, true).unwrap_err().contains("expected 'Equipment A'"));
    }

    #[test]
    fn property_subset_in_order_is_accepted() {
        let s = schema();
        let mut header = s.identity_labels();
        header.push("label".into());
        let bound = s.bind(&header, true).unwrap();
        let parsed = bound.parse_row(&row(&["new"])).unwrap();
        assert_eq!(
            parsed.cells,
            vec![
                PropertyCell::Absent,
                PropertyCell::Absent,
                PropertyCell::Value(TypedValue::String("new".into()))
            ]
        );
    }

    #[test]
    fn out_of_order_unknown_and_duplicate_properties_are_rejected() {
        let s = schema();
        let cases: [&[&str]; 3] = [&["active", "weight"], &["speed"], &["weight", "weight"]];
        for props in cases {
            let mut header = s.identity_labels();
            header.extend(strings(props));
            assert!(s.bind(&header, true).is_err(), "{props:?}");
        }
    }

    #[test]
    fn unvalidated_header_must_be_full_width() {
        let s = schema();
        let header = vec!["x".to_string(); s.width()];
        assert!(s.bind(&header, false).is_ok());
        assert!(s.bind(&header[1..], false).is_err());
    }

    #[test]
    fn parses_endpoints_and_cells() {
        let s = schema();
        let header = s.header();
        let bound = s.bind(&header, true).unwrap();
        let parsed = bound.parse_row(&row(&["10", "", "t1"])).unwrap();
        assert_eq!(parsed.link_id, None);
        assert_eq!(parsed.a.location_path, vec!["NYC", "R1"]);
        assert_eq!(parsed.a.equipment_type.as_deref(), Some("Switch"));
        assert!(parsed.a.parent_equipment.is_empty());
        assert_eq!(
            parsed.b.parent_equipment,
            vec![ParentSegment::untyped("chassis"), ParentSegment::untyped("card")]
        );
        assert_eq!(parsed.b.equipment_type, None);
        assert_eq!(parsed.b.port, "p2");
        assert_eq!(
            parsed.cells,
            vec![
                PropertyCell::Value(TypedValue::Integer(10)),
                PropertyCell::Empty,
                PropertyCell::Value(TypedValue::String("t1".into()))
            ]
        );
    }

    #[test]
    fn row_width_mismatch_fails_row() {
        let s = schema();
        let header = s.header();
        let bound = s.bind(&header, true).unwrap();
        assert_eq!(
            bound.parse_row(&row(&["10", "true"])).unwrap_err(),
            RowError::SchemaMismatch { expected: 16, found: 15 }
        );
    }

    #[test]
    fn invalid_cells_name_their_column() {
        let s = schema();
        let header = s.header();
        let bound = s.bind(&header, true).unwrap();
        match bound.parse_row(&row(&["ten", "true", ""])).unwrap_err() {
            RowError::InvalidFormat { column, value, .. } => {
                assert_eq!(column, "weight");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected {other:?}"),
        }
        let mut bad_id = row(&["1", "true", ""]);
        bad_id[0] = "L-1".into();
        assert!(matches!(
            bound.parse_row(&bad_id),
            Err(RowError::InvalidFormat { column, .. }) if column == LINK_ID
        ));
    }

    #[test]
    fn location_gap_is_incomplete() {
        let s = schema();
        let header = s.header();
        let bound = s.bind(&header, true).unwrap();
        let mut cells = row(&["1", "true", ""]);
        cells[1] = String::new();
        assert!(matches!(
            bound.parse_row(&cells),
            Err(RowError::IncompleteIdentity { side: Side::A, .. })
        ));
        let mut cells = row(&["1", "true", ""]);
        cells[9] = "chassis//card".into();
        assert!(matches!(
            bound.parse_row(&cells),
            Err(RowError::IncompleteIdentity { side: Side::B, .. })
        ));
    }

    #[test]
    fn parent_path_carries_types() {
        assert_eq!(
            parse_equipment_path("chassis:Chassis / card").unwrap(),
            vec![ParentSegment::new("chassis", "Chassis"), ParentSegment::untyped("card")]
        );
    }

    #[test]
    fn parent_path_escapes_separators() {
        let segments = vec![
            ParentSegment::new("slot/1", "Line:Card"),
            ParentSegment::new("back\\plane", "Bus"),
        ];
        let cell = format_equipment_path(&segments);
        assert_eq!(cell, "slot\\/1:Line\\:Card/back\\\\plane:Bus");
        assert_eq!(parse_equipment_path(&cell).unwrap(), segments);
    }

    #[test]
    fn malformed_parent_paths_are_rejected() {
        for cell in ["a/", "a:/b", "a:T:U", "a\\", ":T"] {
            assert!(parse_equipment_path(cell).is_err(), "{cell}");
        }
    }
}
