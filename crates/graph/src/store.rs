//! The transactional graph store contract.
//!
//! The import engine never touches persistence directly; everything goes
//! through [`GraphStore`]. Lookups never create, creations never look up
//! (except for the uniqueness checks the store itself enforces), so the
//! resolver's lookup-or-create logic stays in one place.
//!
//! # Transactions
//!
//! Outside of `begin`/`commit` every mutation is applied immediately.
//! Inside a transaction, savepoints nest: `rollback_to(name)` discards
//! everything since `savepoint(name)` but keeps the savepoint open, and
//! `release(name)` folds it into the enclosing scope (SQL semantics).

use crate::error::StoreError;
use crate::ids::{EquipmentId, LinkId, LocationId, LocationTypeId, PortId, PropertyTypeId};
use crate::model::{
    Container, EntityKind, EntityRef, Equipment, EquipmentType, Link, Location, LocationType,
    NewPropertyType, Port, PortDefinition, PropertyType, PropertyValue, TypedValue,
};

pub trait GraphStore {
    // -- schema ------------------------------------------------------------

    /// Append a level to the location type hierarchy.
    fn add_location_type(&mut self, name: &str) -> Result<LocationTypeId, StoreError>;

    /// Location types ordered outermost first.
    fn location_types(&self) -> Result<Vec<LocationType>, StoreError>;

    /// Register a property type; it is appended to its entity kind's canonical order.
    fn add_property_type(&mut self, def: NewPropertyType) -> Result<PropertyTypeId, StoreError>;

    /// Property types of one entity kind in canonical order.
    fn property_types(&self, entity: EntityKind) -> Result<Vec<PropertyType>, StoreError>;

    /// Create or replace an equipment type's port definitions.
    fn define_equipment_type(
        &mut self,
        name: &str,
        ports: &[PortDefinition],
    ) -> Result<(), StoreError>;

    fn equipment_type(&self, name: &str) -> Result<Option<EquipmentType>, StoreError>;

    // -- locations ---------------------------------------------------------

    fn find_location(
        &self,
        parent: Option<LocationId>,
        name: &str,
    ) -> Result<Option<LocationId>, StoreError>;

    fn create_location(
        &mut self,
        parent: Option<LocationId>,
        name: &str,
        location_type: LocationTypeId,
    ) -> Result<LocationId, StoreError>;

    fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    // -- equipment ---------------------------------------------------------

    /// All equipment named `name` directly inside `container` (any type).
    fn find_equipment(
        &self,
        container: Container,
        name: &str,
    ) -> Result<Vec<Equipment>, StoreError>;

    /// Create equipment; an unknown equipment type is registered with no port definitions.
    fn create_equipment(
        &mut self,
        container: Container,
        name: &str,
        equipment_type: &str,
    ) -> Result<EquipmentId, StoreError>;

    fn equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, StoreError>;

    /// Remove equipment together with nested equipment, their ports, every
    /// link touching those ports and all affected property values.
    fn remove_equipment(&mut self, id: EquipmentId) -> Result<(), StoreError>;

    // -- ports -------------------------------------------------------------

    fn find_port(&self, equipment: EquipmentId, name: &str) -> Result<Option<PortId>, StoreError>;

    /// Create a port, binding the equipment type's port definition of the same name.
    fn create_port(&mut self, equipment: EquipmentId, name: &str) -> Result<PortId, StoreError>;

    fn port(&self, id: PortId) -> Result<Option<Port>, StoreError>;

    // -- links -------------------------------------------------------------

    /// The link connecting `a` and `b` in either order.
    fn find_link(&self, a: PortId, b: PortId) -> Result<Option<LinkId>, StoreError>;

    /// Create a link. Fails with [`StoreError::DuplicateLink`] when the pair is taken.
    fn create_link(&mut self, a: PortId, b: PortId) -> Result<LinkId, StoreError>;

    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError>;

    /// All links ordered by ID.
    fn links(&self) -> Result<Vec<Link>, StoreError>;

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError>;

    // -- properties --------------------------------------------------------

    fn property_value(
        &self,
        entity: EntityRef,
        property_type: PropertyTypeId,
    ) -> Result<Option<TypedValue>, StoreError>;

    /// Create or overwrite the single value for `(entity, property_type)`.
    fn upsert_property_value(
        &mut self,
        entity: EntityRef,
        property_type: PropertyTypeId,
        value: TypedValue,
    ) -> Result<(), StoreError>;

    /// All values attached to an entity, ordered by property type ID.
    fn property_values(&self, entity: EntityRef) -> Result<Vec<PropertyValue>, StoreError>;

    // -- transactions ------------------------------------------------------

    /// Whether a whole batch can be committed or rolled back as one unit.
    fn supports_atomic_batches(&self) -> bool {
        true
    }

    fn begin(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;
    fn savepoint(&mut self, name: &str) -> Result<(), StoreError>;
    fn release(&mut self, name: &str) -> Result<(), StoreError>;
    fn rollback_to(&mut self, name: &str) -> Result<(), StoreError>;
}

/// Savepoint names end up in SQL, keep them to identifiers.
pub(crate) fn check_savepoint_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StoreError::Transaction(format!("invalid savepoint name: {name:?}")))
    }
}

/// Find the property type for `entity`'s kind, or fail with a constraint error.
pub(crate) fn property_type_for<'a>(
    types: impl IntoIterator<Item = &'a PropertyType>,
    entity: EntityRef,
    property_type: PropertyTypeId,
) -> Result<&'a PropertyType, StoreError> {
    let pt = types
        .into_iter()
        .find(|pt| pt.id == property_type)
        .ok_or_else(|| StoreError::NotFound(format!("property type {property_type}")))?;
    if pt.entity != entity.kind() {
        return Err(StoreError::Constraint(format!(
            "property type '{}' belongs to {}, not {}",
            pt.name,
            pt.entity,
            entity.kind()
        )));
    }
    Ok(pt)
}
