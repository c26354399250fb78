//! In-memory graph store.
//!
//! Entities live in arenas keyed by ID, with a secondary index per
//! uniqueness invariant (`(parent, name)` for locations, `(container, name,
//! type)` for equipment, `(equipment, name)` for ports, normalized port pair
//! for links). Both are persistent maps, so a transaction or savepoint is a
//! snapshot of the whole state and costs O(1).

use im::OrdMap;

use crate::error::StoreError;
use crate::ids::{EquipmentId, LinkId, LocationId, LocationTypeId, PortId, PropertyTypeId};
use crate::model::{
    check_value, port_pair, Container, EntityKind, EntityRef, Equipment, EquipmentType, Link,
    Location, LocationType, NewPropertyType, Port, PortDefinition, PropertyType, PropertyValue,
    TypedValue,
};
use crate::store::{check_savepoint_name, property_type_for, GraphStore};

#[derive(Clone, Default)]
struct State {
    next_id: i64,
    location_types: OrdMap<LocationTypeId, LocationType>,
    locations: OrdMap<LocationId, Location>,
    location_index: OrdMap<(Option<LocationId>, String), LocationId>,
    equipment_types: OrdMap<String, EquipmentType>,
    equipment: OrdMap<EquipmentId, Equipment>,
    equipment_index: OrdMap<(Container, String, String), EquipmentId>,
    ports: OrdMap<PortId, Port>,
    port_index: OrdMap<(EquipmentId, String), PortId>,
    links: OrdMap<LinkId, Link>,
    link_index: OrdMap<(PortId, PortId), LinkId>,
    property_types: OrdMap<PropertyTypeId, PropertyType>,
    property_values: OrdMap<(EntityRef, PropertyTypeId), TypedValue>,
}

impl State {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn entity_exists(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Link(id) => self.links.contains_key(&id),
            EntityRef::Equipment(id) => self.equipment.contains_key(&id),
            EntityRef::Port(id) => self.ports.contains_key(&id),
        }
    }

    fn container_exists(&self, container: Container) -> bool {
        match container {
            Container::Location(id) => self.locations.contains_key(&id),
            Container::Equipment(id) => self.equipment.contains_key(&id),
        }
    }

    fn drop_values_of(&mut self, entity: EntityRef) {
        let keys: Vec<_> = self
            .property_values
            .keys()
            .filter(|(owner, _)| *owner == entity)
            .cloned()
            .collect();
        for key in keys {
            self.property_values.remove(&key);
        }
    }

    fn drop_link(&mut self, id: LinkId) {
        if let Some(link) = self.links.remove(&id) {
            self.link_index.remove(&(link.a, link.b));
            self.drop_values_of(EntityRef::Link(id));
        }
    }
}

struct Frame {
    /// `None` marks the transaction itself, `Some` a savepoint.
    name: Option<String>,
    snapshot: State,
}

/// Arena-backed [`GraphStore`]. Cheap to construct, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: State,
    frames: Vec<Frame>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location_count(&self) -> usize {
        self.state.locations.len()
    }

    pub fn equipment_count(&self) -> usize {
        self.state.equipment.len()
    }

    pub fn port_count(&self) -> usize {
        self.state.ports.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.links.len()
    }

    pub fn property_value_count(&self) -> usize {
        self.state.property_values.len()
    }

    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    fn savepoint_index(&self, name: &str) -> Result<usize, StoreError> {
        self.frames
            .iter()
            .rposition(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| StoreError::Transaction(format!("no such savepoint: {name}")))
    }
}

impl GraphStore for MemoryStore {
    fn add_location_type(&mut self, name: &str) -> Result<LocationTypeId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Constraint("location type name must not be empty".into()));
        }
        if self.state.location_types.values().any(|lt| lt.name == name) {
            return Err(StoreError::Constraint(format!(
                "location type '{name}' already exists"
            )));
        }
        let id = LocationTypeId(self.state.allocate());
        let index = self.state.location_types.len();
        self.state.location_types.insert(
            id,
            LocationType {
                id,
                name: name.to_string(),
                index,
            },
        );
        Ok(id)
    }

    fn location_types(&self) -> Result<Vec<LocationType>, StoreError> {
        let mut types: Vec<LocationType> = self.state.location_types.values().cloned().collect();
        types.sort_by_key(|lt| lt.index);
        Ok(types)
    }

    fn add_property_type(&mut self, def: NewPropertyType) -> Result<PropertyTypeId, StoreError> {
        def.check().map_err(StoreError::Constraint)?;
        let name = def.name.trim().to_string();
        let siblings = self
            .state
            .property_types
            .values()
            .filter(|pt| pt.entity == def.entity);
        let mut index = 0;
        for pt in siblings {
            if pt.name == name {
                return Err(StoreError::Constraint(format!(
                    "{} property type '{name}' already exists",
                    def.entity
                )));
            }
            index += 1;
        }
        let id = PropertyTypeId(self.state.allocate());
        self.state.property_types.insert(
            id,
            PropertyType {
                id,
                entity: def.entity,
                name,
                kind: def.kind,
                default: def.default,
                enum_values: def.enum_values,
                index,
            },
        );
        Ok(id)
    }

    fn property_types(&self, entity: EntityKind) -> Result<Vec<PropertyType>, StoreError> {
        let mut types: Vec<PropertyType> = self
            .state
            .property_types
            .values()
            .filter(|pt| pt.entity == entity)
            .cloned()
            .collect();
        types.sort_by_key(|pt| pt.index);
        Ok(types)
    }

    fn define_equipment_type(
        &mut self,
        name: &str,
        ports: &[PortDefinition],
    ) -> Result<(), StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Constraint("equipment type name must not be empty".into()));
        }
        self.state.equipment_types.insert(
            name.to_string(),
            EquipmentType {
                name: name.to_string(),
                ports: ports.to_vec(),
            },
        );
        Ok(())
    }

    fn equipment_type(&self, name: &str) -> Result<Option<EquipmentType>, StoreError> {
        Ok(self.state.equipment_types.get(name).cloned())
    }

    fn find_location(
        &self,
        parent: Option<LocationId>,
        name: &str,
    ) -> Result<Option<LocationId>, StoreError> {
        Ok(self
            .state
            .location_index
            .get(&(parent, name.to_string()))
            .copied())
    }

    fn create_location(
        &mut self,
        parent: Option<LocationId>,
        name: &str,
        location_type: LocationTypeId,
    ) -> Result<LocationId, StoreError> {
        if !self.state.location_types.contains_key(&location_type) {
            return Err(StoreError::NotFound(format!("location type {location_type}")));
        }
        if let Some(p) = parent {
            if !self.state.locations.contains_key(&p) {
                return Err(StoreError::NotFound(format!("location {p}")));
            }
        }
        let key = (parent, name.to_string());
        if self.state.location_index.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "location '{name}' already exists under this parent"
            )));
        }
        let id = LocationId(self.state.allocate());
        self.state.locations.insert(
            id,
            Location {
                id,
                name: name.to_string(),
                location_type,
                parent,
            },
        );
        self.state.location_index.insert(key, id);
        Ok(id)
    }

    fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        Ok(self.state.locations.get(&id).cloned())
    }

    fn find_equipment(
        &self,
        container: Container,
        name: &str,
    ) -> Result<Vec<Equipment>, StoreError> {
        Ok(self
            .state
            .equipment
            .values()
            .filter(|e| e.container == container && e.name == name)
            .cloned()
            .collect())
    }

    fn create_equipment(
        &mut self,
        container: Container,
        name: &str,
        equipment_type: &str,
    ) -> Result<EquipmentId, StoreError> {
        if !self.state.container_exists(container) {
            return Err(StoreError::NotFound(format!("container {container:?}")));
        }
        if name.is_empty() || equipment_type.is_empty() {
            return Err(StoreError::Constraint(
                "equipment needs a name and an equipment type".into(),
            ));
        }
        let key = (container, name.to_string(), equipment_type.to_string());
        if self.state.equipment_index.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "equipment '{name}' of type '{equipment_type}' already exists in this container"
            )));
        }
        if !self.state.equipment_types.contains_key(equipment_type) {
            self.state.equipment_types.insert(
                equipment_type.to_string(),
                EquipmentType {
                    name: equipment_type.to_string(),
                    ports: Vec::new(),
                },
            );
        }
        let id = EquipmentId(self.state.allocate());
        self.state.equipment.insert(
            id,
            Equipment {
                id,
                name: name.to_string(),
                equipment_type: equipment_type.to_string(),
                container,
            },
        );
        self.state.equipment_index.insert(key, id);
        Ok(id)
    }

    fn equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, StoreError> {
        Ok(self.state.equipment.get(&id).cloned())
    }

    fn remove_equipment(&mut self, id: EquipmentId) -> Result<(), StoreError> {
        if !self.state.equipment.contains_key(&id) {
            return Err(StoreError::NotFound(format!("equipment {id}")));
        }

        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let parent = Container::Equipment(doomed[i]);
            doomed.extend(
                self.state
                    .equipment
                    .values()
                    .filter(|e| e.container == parent)
                    .map(|e| e.id),
            );
            i += 1;
        }

        for eq_id in doomed {
            let ports: Vec<Port> = self
                .state
                .ports
                .values()
                .filter(|p| p.equipment == eq_id)
                .cloned()
                .collect();
            for port in ports {
                let links: Vec<LinkId> = self
                    .state
                    .links
                    .values()
                    .filter(|l| l.a == port.id || l.b == port.id)
                    .map(|l| l.id)
                    .collect();
                for link_id in links {
                    self.state.drop_link(link_id);
                }
                self.state.ports.remove(&port.id);
                self.state.port_index.remove(&(eq_id, port.name.clone()));
                self.state.drop_values_of(EntityRef::Port(port.id));
            }
            if let Some(eq) = self.state.equipment.remove(&eq_id) {
                self.state
                    .equipment_index
                    .remove(&(eq.container, eq.name, eq.equipment_type));
            }
            self.state.drop_values_of(EntityRef::Equipment(eq_id));
        }
        Ok(())
    }

    fn find_port(&self, equipment: EquipmentId, name: &str) -> Result<Option<PortId>, StoreError> {
        Ok(self
            .state
            .port_index
            .get(&(equipment, name.to_string()))
            .copied())
    }

    fn create_port(&mut self, equipment: EquipmentId, name: &str) -> Result<PortId, StoreError> {
        let eq = self
            .state
            .equipment
            .get(&equipment)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("equipment {equipment}")))?;
        if name.is_empty() {
            return Err(StoreError::Constraint("port name must not be empty".into()));
        }
        let key = (equipment, name.to_string());
        if self.state.port_index.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "port '{name}' already exists on equipment '{}'",
                eq.name
            )));
        }
        let port_type = self
            .state
            .equipment_types
            .get(&eq.equipment_type)
            .and_then(|t| t.port_definition(name))
            .map(|d| d.port_type.clone());
        let id = PortId(self.state.allocate());
        self.state.ports.insert(
            id,
            Port {
                id,
                name: name.to_string(),
                equipment,
                port_type,
            },
        );
        self.state.port_index.insert(key, id);
        Ok(id)
    }

    fn port(&self, id: PortId) -> Result<Option<Port>, StoreError> {
        Ok(self.state.ports.get(&id).cloned())
    }

    fn find_link(&self, a: PortId, b: PortId) -> Result<Option<LinkId>, StoreError> {
        Ok(self.state.link_index.get(&port_pair(a, b)).copied())
    }

    fn create_link(&mut self, a: PortId, b: PortId) -> Result<LinkId, StoreError> {
        if a == b {
            return Err(StoreError::Constraint(format!("cannot link {a} to itself")));
        }
        for p in [a, b] {
            if !self.state.ports.contains_key(&p) {
                return Err(StoreError::NotFound(format!("port {p}")));
            }
        }
        let pair = port_pair(a, b);
        if let Some(existing) = self.state.link_index.get(&pair) {
            return Err(StoreError::DuplicateLink { existing: *existing });
        }
        let id = LinkId(self.state.allocate());
        self.state.links.insert(
            id,
            Link {
                id,
                a: pair.0,
                b: pair.1,
            },
        );
        self.state.link_index.insert(pair, id);
        Ok(id)
    }

    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        Ok(self.state.links.get(&id).copied())
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self.state.links.values().copied().collect())
    }

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError> {
        if !self.state.links.contains_key(&id) {
            return Err(StoreError::NotFound(format!("link {id}")));
        }
        self.state.drop_link(id);
        Ok(())
    }

    fn property_value(
        &self,
        entity: EntityRef,
        property_type: PropertyTypeId,
    ) -> Result<Option<TypedValue>, StoreError> {
        Ok(self
            .state
            .property_values
            .get(&(entity, property_type))
            .cloned())
    }

    fn upsert_property_value(
        &mut self,
        entity: EntityRef,
        property_type: PropertyTypeId,
        value: TypedValue,
    ) -> Result<(), StoreError> {
        if !self.state.entity_exists(entity) {
            return Err(StoreError::NotFound(format!("{} {entity}", entity.kind())));
        }
        let pt = property_type_for(self.state.property_types.values(), entity, property_type)?;
        check_value(&pt.name, pt.kind, &pt.enum_values, &value).map_err(StoreError::Constraint)?;
        self.state
            .property_values
            .insert((entity, property_type), value);
        Ok(())
    }

    fn property_values(&self, entity: EntityRef) -> Result<Vec<PropertyValue>, StoreError> {
        Ok(self
            .state
            .property_values
            .iter()
            .filter(|((owner, _), _)| *owner == entity)
            .map(|((_, pt), value)| PropertyValue {
                property_type: *pt,
                value: value.clone(),
            })
            .collect())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_transaction() {
            return Err(StoreError::Transaction("transaction already open".into()));
        }
        self.frames.push(Frame {
            name: None,
            snapshot: self.state.clone(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("no open transaction".into()));
        }
        self.frames.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("no open transaction".into()));
        }
        let base = self.frames.swap_remove(0);
        self.state = base.snapshot;
        self.frames.clear();
        Ok(())
    }

    fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        if !self.in_transaction() {
            return Err(StoreError::Transaction("savepoint outside of a transaction".into()));
        }
        self.frames.push(Frame {
            name: Some(name.to_string()),
            snapshot: self.state.clone(),
        });
        Ok(())
    }

    fn release(&mut self, name: &str) -> Result<(), StoreError> {
        let idx = self.savepoint_index(name)?;
        self.frames.truncate(idx);
        Ok(())
    }

    fn rollback_to(&mut self, name: &str) -> Result<(), StoreError> {
        let idx = self.savepoint_index(name)?;
        self.state = self.frames[idx].snapshot.clone();
        self.frames.truncate(idx + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyKind;

    fn store_with_site() -> (MemoryStore, LocationId) {
        let mut store = MemoryStore::new();
        let site = store.add_location_type("Site").unwrap();
        let loc = store.create_location(None, "NYC", site).unwrap();
        (store, loc)
    }

    #[test]
    fn location_index_is_per_parent() {
        let (mut store, nyc) = store_with_site();
        let room = store.add_location_type("Room").unwrap();
        let a = store.create_location(Some(nyc), "R1", room).unwrap();
        assert_eq!(store.find_location(Some(nyc), "R1").unwrap(), Some(a));
        assert_eq!(store.find_location(None, "R1").unwrap(), None);
        assert!(store.create_location(Some(nyc), "R1", room).is_err());
    }

    #[test]
    fn equipment_unique_by_name_and_type() {
        let (mut store, nyc) = store_with_site();
        let c = Container::Location(nyc);
        store.create_equipment(c, "sw1", "Switch").unwrap();
        store.create_equipment(c, "sw1", "Router").unwrap();
        assert!(store.create_equipment(c, "sw1", "Switch").is_err());
        assert_eq!(store.find_equipment(c, "sw1").unwrap().len(), 2);
    }

    #[test]
    fn port_binds_definition() {
        let (mut store, nyc) = store_with_site();
        store
            .define_equipment_type(
                "Switch",
                &[PortDefinition { name: "eth0".into(), port_type: "RJ45".into() }],
            )
            .unwrap();
        let eq = store.create_equipment(Container::Location(nyc), "sw1", "Switch").unwrap();
        let p0 = store.create_port(eq, "eth0").unwrap();
        let p1 = store.create_port(eq, "eth9").unwrap();
        assert_eq!(store.port(p0).unwrap().unwrap().port_type.as_deref(), Some("RJ45"));
        assert_eq!(store.port(p1).unwrap().unwrap().port_type, None);
    }

    #[test]
    fn duplicate_link_rejected_in_either_order() {
        let (mut store, nyc) = store_with_site();
        let eq = store.create_equipment(Container::Location(nyc), "sw1", "Switch").unwrap();
        let p = store.create_port(eq, "p1").unwrap();
        let q = store.create_port(eq, "p2").unwrap();
        let link = store.create_link(q, p).unwrap();
        assert_eq!(store.find_link(p, q).unwrap(), Some(link));
        assert_eq!(
            store.create_link(p, q).unwrap_err(),
            StoreError::DuplicateLink { existing: link }
        );
        assert!(store.create_link(p, p).is_err());
    }

    #[test]
    fn upsert_overwrites_single_value() {
        let (mut store, nyc) = store_with_site();
        let pt = store
            .add_property_type(NewPropertyType::new(EntityKind::Link, "weight", PropertyKind::Integer))
            .unwrap();
        let eq = store.create_equipment(Container::Location(nyc), "sw1", "Switch").unwrap();
        let p = store.create_port(eq, "p1").unwrap();
        let q = store.create_port(eq, "p2").unwrap();
        let link = store.create_link(p, q).unwrap();
        let owner = EntityRef::Link(link);
        store.upsert_property_value(owner, pt, TypedValue::Integer(1)).unwrap();
        store.upsert_property_value(owner, pt, TypedValue::Integer(2)).unwrap();
        assert_eq!(store.property_values(owner).unwrap().len(), 1);
        assert_eq!(store.property_value(owner, pt).unwrap(), Some(TypedValue::Integer(2)));
        assert!(store
            .upsert_property_value(owner, pt, TypedValue::Boolean(true))
            .is_err());
        assert!(store
            .upsert_property_value(EntityRef::Port(p), pt, TypedValue::Integer(3))
            .is_err());
    }

    #[test]
    fn rollback_restores_snapshot() {
        let (mut store, nyc) = store_with_site();
        store.begin().unwrap();
        store.create_equipment(Container::Location(nyc), "sw1", "Switch").unwrap();
        assert_eq!(store.equipment_count(), 1);
        store.rollback().unwrap();
        assert_eq!(store.equipment_count(), 0);
        assert!(!store.in_transaction());
    }

    #[test]
    fn savepoint_rollback_keeps_earlier_work() {
        let (mut store, nyc) = store_with_site();
        let c = Container::Location(nyc);
        store.begin().unwrap();
        store.create_equipment(c, "sw1", "Switch").unwrap();
        store.savepoint("row").unwrap();
        store.create_equipment(c, "sw2", "Switch").unwrap();
        store.rollback_to("row").unwrap();
        store.release("row").unwrap();
        store.commit().unwrap();
        assert_eq!(store.equipment_count(), 1);
        assert_eq!(store.find_equipment(c, "sw2").unwrap().len(), 0);
    }

    #[test]
    fn savepoint_requires_transaction() {
        let mut store = MemoryStore::new();
        assert!(store.savepoint("row").is_err());
        store.begin().unwrap();
        assert!(store.savepoint("1row").is_err());
        assert!(store.release("missing").is_err());
    }

    #[test]
    fn remove_equipment_cascades() {
        let (mut store, nyc) = store_with_site();
        let c = Container::Location(nyc);
        let chassis = store.create_equipment(c, "chassis", "Chassis").unwrap();
        let card = store
            .create_equipment(Container::Equipment(chassis), "card1", "Card")
            .unwrap();
        let other = store.create_equipment(c, "sw1", "Switch").unwrap();
        let p = store.create_port(card, "p1").unwrap();
        let q = store.create_port(other, "p1").unwrap();
        store.create_link(p, q).unwrap();

        store.remove_equipment(chassis).unwrap();
        assert_eq!(store.equipment_count(), 1);
        assert_eq!(store.port_count(), 1);
        assert_eq!(store.link_count(), 0);
        assert_eq!(store.find_port(other, "p1").unwrap(), Some(q));
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let (mut store, nyc) = store_with_site();
        let eq = store.create_equipment(Container::Location(nyc), "sw1", "Switch").unwrap();
        let p = store.create_port(eq, "p1").unwrap();
        let q = store.create_port(eq, "p2").unwrap();
        let first = store.create_link(p, q).unwrap();
        store.remove_link(first).unwrap();
        let second = store.create_link(p, q).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.link(first).unwrap(), None);
    }
}
