//! `netinv-graph`: Network inventory graph.
//!
//! Locations, equipment, ports, links and typed property values behind a
//! transactional [`GraphStore`] contract, with an in-memory and a SQLite
//! implementation. No CSV or import logic lives here.

pub mod error;
pub mod ids;
pub mod memory;
pub mod model;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use ids::{EquipmentId, LinkId, LocationId, LocationTypeId, PortId, PropertyTypeId};
pub use memory::MemoryStore;
pub use model::{
    Container, EntityKind, EntityRef, Equipment, EquipmentType, Link, Location, LocationType,
    NewPropertyType, Port, PortDefinition, PropertyKind, PropertyType, PropertyValue, TypedValue,
};
pub use sqlite::SqliteStore;
pub use store::GraphStore;
