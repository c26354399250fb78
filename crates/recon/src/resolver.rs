//! Lookup-or-create resolution of location → parent equipment → equipment → port chains.
//!
//! Every step looks the entity up by its uniqueness key first and only
//! creates it when absent, so resolving the same chain twice yields the same
//! IDs. A per-batch memo short-circuits repeated lookups; entries added while
//! a row is in flight are dropped again if that row is rolled back.

use std::collections::HashMap;
use std::fmt;

use netinv_graph::{
    Container, EquipmentId, GraphStore, LocationId, LocationTypeId, PortId, StoreError,
};
use serde::Serialize;

use crate::error::RowError;
use crate::schema::{EndpointIdentity, Side};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// Identity chain is empty, malformed or ambiguous.
    Incomplete(String),
    Store(StoreError),
}

impl ResolveError {
    pub fn into_row_error(self, side: Side) -> RowError {
        match self {
            Self::Incomplete(reason) => RowError::IncompleteIdentity { side, reason },
            Self::Store(e) => RowError::Store(e),
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete(reason) => write!(f, "incomplete identity: {reason}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub location: LocationId,
    pub equipment: EquipmentId,
    pub port: PortId,
}

/// Entities created by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CreatedEntities {
    pub locations: usize,
    pub equipment: usize,
    pub ports: usize,
}

impl CreatedEntities {
    pub fn add(&mut self, other: CreatedEntities) {
        self.locations += other.locations;
        self.equipment += other.equipment;
        self.ports += other.ports;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoKey {
    Location(Option<LocationId>, String),
    Equipment(Container, String, String),
    Port(EquipmentId, String),
}

pub struct Resolver {
    /// Location type per path depth, outermost first.
    location_types: Vec<LocationTypeId>,
    memo: HashMap<MemoKey, i64>,
    /// Memo keys added by the row in flight.
    pending: Vec<MemoKey>,
    created: CreatedEntities,
}

impl Resolver {
    pub fn new(location_types: Vec<LocationTypeId>) -> Self {
        Self {
            location_types,
            memo: HashMap::new(),
            pending: Vec::new(),
            created: CreatedEntities::default(),
        }
    }

    /// Start tracking a new row.
    pub fn begin_row(&mut self) {
        self.pending.clear();
        self.created = CreatedEntities::default();
    }

    /// Keep the row's memo entries; returns what the row created.
    pub fn commit_row(&mut self) -> CreatedEntities {
        self.pending.clear();
        std::mem::take(&mut self.created)
    }

    /// Forget everything the row in flight resolved.
    pub fn rollback_row(&mut self) {
        for key in self.pending.drain(..) {
            self.memo.remove(&key);
        }
        self.created = CreatedEntities::default();
    }

    /// Forget the whole batch.
    pub fn reset(&mut self) {
        self.memo.clear();
        self.pending.clear();
        self.created = CreatedEntities::default();
    }

    fn remember(&mut self, key: MemoKey, id: i64) {
        self.memo.insert(key.clone(), id);
        self.pending.push(key);
    }

    /// Walk the path from the root, creating missing levels.
    pub fn resolve_location_path<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        segments: &[String],
    ) -> Result<LocationId, ResolveError> {
        if segments.is_empty() {
            return Err(ResolveError::Incomplete("no location given".into()));
        }
        if segments.len() > self.location_types.len() {
            return Err(ResolveError::Incomplete(format!(
                "location path has {} levels, hierarchy has {}",
                segments.len(),
                self.location_types.len()
            )));
        }

        let mut parent = None;
        for (depth, name) in segments.iter().enumerate() {
            if name.is_empty() {
                return Err(ResolveError::Incomplete(format!(
                    "location level {} is empty",
                    depth + 1
                )));
            }
            let key = MemoKey::Location(parent, name.clone());
            let id = match self.memo.get(&key) {
                Some(raw) => LocationId(*raw),
                None => {
                    let id = match store.find_location(parent, name)? {
                        Some(id) => id,
                        None => {
                            let id =
                                store.create_location(parent, name, self.location_types[depth])?;
                            log::debug!("created location '{name}' ({id})");
                            self.created.locations += 1;
                            id
                        }
                    };
                    self.remember(key, id.raw());
                    id
                }
            };
            parent = Some(id);
        }
        // `segments` is non-empty, so `parent` is set.
        parent.ok_or_else(|| ResolveError::Incomplete("no location given".into()))
    }

    /// Find equipment by `(container, name, type)`, creating it when absent.
    ///
    /// Without a type the equipment must already exist and be unique by name
    /// within the container.
    pub fn resolve_or_create_equipment<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        container: Container,
        name: &str,
        equipment_type: Option<&str>,
    ) -> Result<EquipmentId, ResolveError> {
        if name.is_empty() {
            return Err(ResolveError::Incomplete("equipment name is empty".into()));
        }

        let Some(equipment_type) = equipment_type else {
            let candidates = store.find_equipment(container, name)?;
            return match candidates.as_slice() {
                [only] => Ok(only.id),
                [] => Err(ResolveError::Incomplete(format!(
                    "equipment '{name}' does not exist and no equipment type was given"
                ))),
                many => Err(ResolveError::Incomplete(format!(
                    "equipment name '{name}' is ambiguous ({} types), give an equipment type",
                    many.len()
                ))),
            };
        };

        let key = MemoKey::Equipment(container, name.to_string(), equipment_type.to_string());
        if let Some(raw) = self.memo.get(&key) {
            return Ok(EquipmentId(*raw));
        }
        let existing = store
            .find_equipment(container, name)?
            .into_iter()
            .find(|e| e.equipment_type == equipment_type);
        let id = match existing {
            Some(eq) => eq.id,
            None => {
                let id = store.create_equipment(container, name, equipment_type)?;
                log::debug!("created equipment '{name}' of type '{equipment_type}' ({id})");
                self.created.equipment += 1;
                id
            }
        };
        self.remember(key, id.raw());
        Ok(id)
    }

    pub fn resolve_or_create_port<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        equipment: EquipmentId,
        name: &str,
    ) -> Result<PortId, ResolveError> {
        if name.is_empty() {
            return Err(ResolveError::Incomplete("port name is empty".into()));
        }
        let key = MemoKey::Port(equipment, name.to_string());
        if let Some(raw) = self.memo.get(&key) {
            return Ok(PortId(*raw));
        }
        let id = match store.find_port(equipment, name)? {
            Some(id) => id,
            None => {
                let id = store.create_port(equipment, name)?;
                log::debug!("created port '{name}' on {equipment} ({id})");
                self.created.ports += 1;
                id
            }
        };
        self.remember(key, id.raw());
        Ok(id)
    }

    /// Resolve a whole endpoint: location path, parent equipment chain,
    /// equipment, port.
    pub fn resolve_endpoint<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        identity: &EndpointIdentity,
    ) -> Result<ResolvedEndpoint, RowError> {
        self.resolve_endpoint_inner(store, identity)
            .map_err(|e| e.into_row_error(identity.side))
    }

    fn resolve_endpoint_inner<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        identity: &EndpointIdentity,
    ) -> Result<ResolvedEndpoint, ResolveError> {
        let location = self.resolve_location_path(store, &identity.location_path)?;

        let mut container = Container::Location(location);
        for parent in &identity.parent_equipment {
            let id = self.resolve_or_create_equipment(
                store,
                container,
                &parent.name,
                parent.equipment_type.as_deref(),
            )?;
            container = Container::Equipment(id);
        }

        let equipment = self.resolve_or_create_equipment(
            store,
            container,
            &identity.equipment,
            identity.equipment_type.as_deref(),
        )?;
        let port = self.resolve_or_create_port(store, equipment, &identity.port)?;
        Ok(ResolvedEndpoint {
            location,
            equipment,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParentSegment;
    use netinv_graph::MemoryStore;

    fn setup() -> (MemoryStore, Resolver) {
        let mut store = MemoryStore::new();
        let site = store.add_location_type("Site").unwrap();
        let room = store.add_location_type("Room").unwrap();
        (store, Resolver::new(vec![site, room]))
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn identity(equipment: &str, equipment_type: Option<&str>, port: &str) -> EndpointIdentity {
        EndpointIdentity {
            side: Side::A,
            location_path: path(&["NYC", "R1"]),
            parent_equipment: Vec::new(),
            equipment: equipment.into(),
            equipment_type: equipment_type.map(Into::into),
            port: port.into(),
        }
    }

    #[test]
    fn location_path_is_idempotent() {
        let (mut store, mut resolver) = setup();
        resolver.begin_row();
        let first = resolver
            .resolve_location_path(&mut store, &path(&["NYC", "R1"]))
            .unwrap();
        assert_eq!(resolver.commit_row().locations, 2);

        let mut fresh = Resolver::new(store.location_types().unwrap().iter().map(|t| t.id).collect());
        fresh.begin_row();
        let second = fresh
            .resolve_location_path(&mut store, &path(&["NYC", "R1"]))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fresh.commit_row().locations, 0);
        assert_eq!(store.location_count(), 2);
    }

    #[test]
    fn path_deeper_than_hierarchy_is_incomplete() {
        let (mut store, mut resolver) = setup();
        let err = resolver
            .resolve_location_path(&mut store, &path(&["NYC", "R1", "Rack"]))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Incomplete(_)));
        assert!(resolver
            .resolve_location_path(&mut store, &[])
            .is_err());
    }

    #[test]
    fn endpoint_creates_full_chain_once() {
        let (mut store, mut resolver) = setup();
        let id = identity("sw1", Some("Switch"), "p1");
        resolver.begin_row();
        let first = resolver.resolve_endpoint(&mut store, &id).unwrap();
        let second = resolver.resolve_endpoint(&mut store, &id).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            resolver.commit_row(),
            CreatedEntities { locations: 2, equipment: 1, ports: 1 }
        );
        assert_eq!(store.equipment_count(), 1);
        assert_eq!(store.port_count(), 1);
    }

    #[test]
    fn untyped_equipment_must_exist_and_be_unique() {
        let (mut store, mut resolver) = setup();
        let err = resolver
            .resolve_endpoint(&mut store, &identity("sw1", None, "p1"))
            .unwrap_err();
        assert!(matches!(err, RowError::IncompleteIdentity { side: Side::A, .. }));

        resolver
            .resolve_endpoint(&mut store, &identity("sw1", Some("Switch"), "p1"))
            .unwrap();
        let found = resolver
            .resolve_endpoint(&mut store, &identity("sw1", None, "p2"))
            .unwrap();
        assert_eq!(store.equipment(found.equipment).unwrap().unwrap().equipment_type, "Switch");

        resolver
            .resolve_endpoint(&mut store, &identity("sw1", Some("Router"), "p1"))
            .unwrap();
        let err = resolver
            .resolve_endpoint(&mut store, &identity("sw1", None, "p1"))
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn nested_equipment_resolves_through_parents() {
        let (mut store, mut resolver) = setup();
        resolver
            .resolve_endpoint(&mut store, &identity("chassis", Some("Chassis"), "mgmt"))
            .unwrap();
        let mut card = identity("card1", Some("Card"), "p1");
        card.parent_equipment = vec![ParentSegment::untyped("chassis")];
        let resolved = resolver.resolve_endpoint(&mut store, &card).unwrap();
        let eq = store.equipment(resolved.equipment).unwrap().unwrap();
        assert!(matches!(eq.container, Container::Equipment(_)));

        card.parent_equipment = vec![ParentSegment::untyped("missing")];
        assert!(resolver.resolve_endpoint(&mut store, &card).is_err());
    }

    #[test]
    fn typed_parents_are_created_and_disambiguated() {
        let (mut store, mut resolver) = setup();
        let mut card = identity("card1", Some("Card"), "p1");
        card.parent_equipment = vec![ParentSegment::new("chassis", "ChassisA")];
        let first = resolver.resolve_endpoint(&mut store, &card).unwrap();

        card.parent_equipment = vec![ParentSegment::new("chassis", "ChassisB")];
        let second = resolver.resolve_endpoint(&mut store, &card).unwrap();
        assert_ne!(first.equipment, second.equipment);

        let parent_of = |store: &MemoryStore, id: EquipmentId| match store.equipment(id).unwrap().unwrap().container {
            Container::Equipment(parent) => store.equipment(parent).unwrap().unwrap(),
            other => panic!("expected nested equipment, got {other:?}"),
        };
        assert_eq!(parent_of(&store, first.equipment).equipment_type, "ChassisA");
        assert_eq!(parent_of(&store, second.equipment).equipment_type, "ChassisB");

        // name alone no longer identifies the parent
        card.parent_equipment = vec![ParentSegment::untyped("chassis")];
        let err = resolver.resolve_endpoint(&mut store, &card).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        // resolving again reuses what exists
        card.parent_equipment = vec![ParentSegment::new("chassis", "ChassisA")];
        assert_eq!(resolver.resolve_endpoint(&mut store, &card).unwrap(), first);
    }

    #[test]
    fn empty_names_are_incomplete() {
        let (mut store, mut resolver) = setup();
        assert!(resolver
            .resolve_endpoint(&mut store, &identity("", Some("Switch"), "p1"))
            .is_err());
        assert!(resolver
            .resolve_endpoint(&mut store, &identity("sw1", Some("Switch"), ""))
            .is_err());
    }

    #[test]
    fn rollback_row_forgets_memo() {
        let (mut store, mut resolver) = setup();
        store.begin().unwrap();
        store.savepoint("row").unwrap();
        resolver.begin_row();
        resolver
            .resolve_endpoint(&mut store, &identity("sw1", Some("Switch"), "p1"))
            .unwrap();
        store.rollback_to("row").unwrap();
        store.release("row").unwrap();
        resolver.rollback_row();

        resolver.begin_row();
        resolver
            .resolve_endpoint(&mut store, &identity("sw1", Some("Switch"), "p1"))
            .unwrap();
        assert_eq!(resolver.commit_row().equipment, 1);
        store.commit().unwrap();
        assert_eq!(store.equipment_count(), 1);
    }
}
