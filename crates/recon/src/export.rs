//! Link export in the row schema layout, the inverse of import.

use std::collections::HashMap;

use netinv_graph::{
    Container, EntityRef, GraphStore, LocationId, PortId, StoreError,
};

use crate::codec;
use crate::schema::{format_equipment_path, ParentSegment, RowSchema};

/// Header plus one row per link, ordered by link ID. Side A is the lower
/// port ID. Absent property values are written as empty cells.
pub fn export_links<S: GraphStore + ?Sized>(store: &S) -> Result<Vec<Vec<String>>, StoreError> {
    let schema = RowSchema::load(store)?;
    let mut rows = vec![schema.header()];
    let mut paths: HashMap<LocationId, Vec<String>> = HashMap::new();

    for link in store.links()? {
        let mut row = Vec::with_capacity(schema.width());
        row.push(link.id.raw().to_string());
        for port in [link.a, link.b] {
            endpoint_cells(store, &schema, &mut paths, port, &mut row)?;
        }

        let values = store.property_values(EntityRef::Link(link.id))?;
        for pt in &schema.properties {
            let cell = values
                .iter()
                .find(|pv| pv.property_type == pt.id)
                .map(|pv| codec::format(&pv.value))
                .unwrap_or_default();
            row.push(cell);
        }
        rows.push(row);
    }

    log::info!("exported {} link(s)", rows.len() - 1);
    Ok(rows)
}

fn endpoint_cells<S: GraphStore + ?Sized>(
    store: &S,
    schema: &RowSchema,
    paths: &mut HashMap<LocationId, Vec<String>>,
    port_id: PortId,
    row: &mut Vec<String>,
) -> Result<(), StoreError> {
    let port = store
        .port(port_id)?
        .ok_or_else(|| StoreError::NotFound(format!("port {port_id}")))?;
    let equipment = store
        .equipment(port.equipment)?
        .ok_or_else(|| StoreError::NotFound(format!("equipment {}", port.equipment)))?;

    let mut parents = Vec::new();
    let mut container = equipment.container;
    let location = loop {
        match container {
            Container::Location(id) => break id,
            Container::Equipment(id) => {
                let parent = store
                    .equipment(id)?
                    .ok_or_else(|| StoreError::NotFound(format!("equipment {id}")))?;
                parents.push(ParentSegment::new(parent.name, parent.equipment_type));
                container = parent.container;
            }
        }
    };
    parents.reverse();

    let path = match paths.get(&location) {
        Some(path) => path.clone(),
        None => {
            let path = location_path(store, location)?;
            paths.insert(location, path.clone());
            path
        }
    };
    let depth = schema.location_types.len();
    if path.len() > depth {
        return Err(StoreError::Constraint(format!(
            "location {location} is {} levels deep, hierarchy has {depth}",
            path.len()
        )));
    }
    row.extend(path.iter().cloned());
    row.extend(std::iter::repeat(String::new()).take(depth - path.len()));

    row.push(format_equipment_path(&parents));
    row.push(equipment.name);
    row.push(equipment.equipment_type);
    row.push(port.name);
    Ok(())
}

/// Names from the root location down to `id`.
fn location_path<S: GraphStore + ?Sized>(
    store: &S,
    id: LocationId,
) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    let mut next = Some(id);
    while let Some(current) = next {
        let loc = store
            .location(current)?
            .ok_or_else(|| StoreError::NotFound(format!("location {current}")))?;
        names.push(loc.name);
        next = loc.parent;
    }
    names.reverse();
    Ok(names)
}
