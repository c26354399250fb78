// Persistent graph store backed by SQLite

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::StoreError;
use crate::ids::{EquipmentId, LinkId, LocationId, LocationTypeId, PortId, PropertyTypeId};
use crate::model::{
    check_value, port_pair, Container, EntityKind, EntityRef, Equipment, EquipmentType, Link,
    Location, LocationType, NewPropertyType, Port, PortDefinition, PropertyKind, PropertyType,
    PropertyValue, TypedValue,
};
use crate::store::{check_savepoint_name, property_type_for, GraphStore};

const SCHEMA_VERSION: &str = "1";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS location_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    idx INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    location_type INTEGER NOT NULL REFERENCES location_types(id),
    parent INTEGER REFERENCES locations(id)
);
CREATE UNIQUE INDEX IF NOT EXISTS locations_parent_name ON locations(IFNULL(parent, 0), name);

CREATE TABLE IF NOT EXISTS equipment_types (
    name TEXT PRIMARY KEY,
    ports TEXT NOT NULL              -- JSON array of port definitions
);

CREATE TABLE IF NOT EXISTS equipment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    equipment_type TEXT NOT NULL REFERENCES equipment_types(name),
    container_kind TEXT NOT NULL,    -- 'location' | 'equipment'
    container_id INTEGER NOT NULL,
    UNIQUE (container_kind, container_id, name, equipment_type)
);

CREATE TABLE IF NOT EXISTS ports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    equipment INTEGER NOT NULL REFERENCES equipment(id),
    port_type TEXT,
    UNIQUE (equipment, name)
);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    port_a INTEGER NOT NULL REFERENCES ports(id),
    port_b INTEGER NOT NULL REFERENCES ports(id),
    CHECK (port_a < port_b),
    UNIQUE (port_a, port_b)
);

CREATE TABLE IF NOT EXISTS property_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL,            -- 'link' | 'equipment' | 'port'
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    default_value TEXT,              -- JSON-encoded typed value
    enum_values TEXT NOT NULL,       -- JSON array
    idx INTEGER NOT NULL,
    UNIQUE (entity, name)
);

CREATE TABLE IF NOT EXISTS property_values (
    entity_kind TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    property_type INTEGER NOT NULL REFERENCES property_types(id),
    kind TEXT NOT NULL,
    int_val INTEGER,
    bool_val INTEGER,
    float_val REAL,
    string_val TEXT,
    PRIMARY KEY (entity_kind, entity_id, property_type)
);
"#;

const CASCADE_SAVEPOINT: &str = "netinv_cascade";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    /// Open savepoints, innermost last.
    savepoints: Vec<String>,
}

impl SqliteStore {
    /// Open (or create) an inventory database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        log::debug!("opened inventory database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        let version: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        if version != SCHEMA_VERSION {
            return Err(StoreError::Sqlite(format!(
                "unsupported schema version {version} (expected {SCHEMA_VERSION})"
            )));
        }
        Ok(Self {
            conn,
            savepoints: Vec::new(),
        })
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Run `f` inside an internal savepoint so multi-statement mutations
    /// apply all-or-nothing even outside of an explicit transaction.
    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {CASCADE_SAVEPOINT}"))?;
        match f(&self.conn) {
            Ok(v) => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {CASCADE_SAVEPOINT}"))?;
                Ok(v)
            }
            Err(e) => {
                self.conn.execute_batch(&format!(
                    "ROLLBACK TO SAVEPOINT {CASCADE_SAVEPOINT}; RELEASE SAVEPOINT {CASCADE_SAVEPOINT}"
                ))?;
                Err(e)
            }
        }
    }

    fn all_property_types(&self) -> Result<Vec<PropertyType>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity, name, kind, default_value, enum_values, idx
             FROM property_types ORDER BY entity, idx",
        )?;
        let raw = stmt
            .query_map([], raw_property_type)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawPropertyType::decode).collect()
    }

    fn entity_exists(&self, entity: EntityRef) -> Result<bool, StoreError> {
        let table = match entity {
            EntityRef::Link(_) => "links",
            EntityRef::Equipment(_) => "equipment",
            EntityRef::Port(_) => "ports",
        };
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {table} WHERE id = ?1"),
                params![entity.raw()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::Sqlite(format!("corrupt inventory data: {what}"))
}

fn container_columns(container: Container) -> (&'static str, i64) {
    match container {
        Container::Location(id) => ("location", id.raw()),
        Container::Equipment(id) => ("equipment", id.raw()),
    }
}

fn container_from(kind: &str, id: i64) -> Result<Container, StoreError> {
    match kind {
        "location" => Ok(Container::Location(LocationId(id))),
        "equipment" => Ok(Container::Equipment(EquipmentId(id))),
        other => Err(corrupt(format!("container kind '{other}'"))),
    }
}

struct RawEquipment {
    id: i64,
    name: String,
    equipment_type: String,
    container_kind: String,
    container_id: i64,
}

const EQUIPMENT_COLUMNS: &str = "id, name, equipment_type, container_kind, container_id";

fn raw_equipment(row: &Row<'_>) -> rusqlite::Result<RawEquipment> {
    Ok(RawEquipment {
        id: row.get(0)?,
        name: row.get(1)?,
        equipment_type: row.get(2)?,
        container_kind: row.get(3)?,
        container_id: row.get(4)?,
    })
}

impl RawEquipment {
    fn decode(self) -> Result<Equipment, StoreError> {
        Ok(Equipment {
            id: EquipmentId(self.id),
            name: self.name,
            equipment_type: self.equipment_type,
            container: container_from(&self.container_kind, self.container_id)?,
        })
    }
}

struct RawPropertyType {
    id: i64,
    entity: String,
    name: String,
    kind: String,
    default_value: Option<String>,
    enum_values: String,
    idx: i64,
}

fn raw_property_type(row: &Row<'_>) -> rusqlite::Result<RawPropertyType> {
    Ok(RawPropertyType {
        id: row.get(0)?,
        entity: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        default_value: row.get(4)?,
        enum_values: row.get(5)?,
        idx: row.get(6)?,
    })
}

impl RawPropertyType {
    fn decode(self) -> Result<PropertyType, StoreError> {
        let default = match self.default_value {
            Some(json) => Some(serde_json::from_str(&json).map_err(corrupt)?),
            None => None,
        };
        Ok(PropertyType {
            id: PropertyTypeId(self.id),
            entity: self.entity.parse().map_err(corrupt)?,
            name: self.name,
            kind: self.kind.parse().map_err(corrupt)?,
            default,
            enum_values: serde_json::from_str(&self.enum_values).map_err(corrupt)?,
            index: self.idx as usize,
        })
    }
}

struct RawValue {
    property_type: i64,
    kind: String,
    int_val: Option<i64>,
    bool_val: Option<bool>,
    float_val: Option<f64>,
    string_val: Option<String>,
}

const VALUE_COLUMNS: &str = "property_type, kind, int_val, bool_val, float_val, string_val";

fn raw_value(row: &Row<'_>) -> rusqlite::Result<RawValue> {
    Ok(RawValue {
        property_type: row.get(0)?,
        kind: row.get(1)?,
        int_val: row.get(2)?,
        bool_val: row.get(3)?,
        float_val: row.get(4)?,
        string_val: row.get(5)?,
    })
}

impl RawValue {
    fn decode(self) -> Result<PropertyValue, StoreError> {
        let kind: PropertyKind = self.kind.parse().map_err(corrupt)?;
        let missing = || corrupt(format!("{kind} value without payload"));
        let value = match kind {
            PropertyKind::Integer => TypedValue::Integer(self.int_val.ok_or_else(missing)?),
            PropertyKind::Boolean => TypedValue::Boolean(self.bool_val.ok_or_else(missing)?),
            PropertyKind::Decimal => TypedValue::Decimal(self.float_val.ok_or_else(missing)?),
            PropertyKind::String => TypedValue::String(self.string_val.ok_or_else(missing)?),
            PropertyKind::Enumerated => {
                TypedValue::Enumerated(self.string_val.ok_or_else(missing)?)
            }
        };
        Ok(PropertyValue {
            property_type: PropertyTypeId(self.property_type),
            value,
        })
    }
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn delete_values_of(conn: &Connection, kind: EntityKind, id: i64) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM property_values WHERE entity_kind = ?1 AND entity_id = ?2",
        params![kind.as_str(), id],
    )?;
    Ok(())
}

fn delete_link(conn: &Connection, id: i64) -> Result<(), StoreError> {
    delete_values_of(conn, EntityKind::Link, id)?;
    conn.execute("DELETE FROM links WHERE id = ?1", params![id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

impl GraphStore for SqliteStore {
    fn add_location_type(&mut self, name: &str) -> Result<LocationTypeId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Constraint("location type name must not be empty".into()));
        }
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM location_types", [], |row| row.get(0))?;
        match self.conn.execute(
            "INSERT INTO location_types (name, idx) VALUES (?1, ?2)",
            params![name, count],
        ) {
            Ok(_) => Ok(LocationTypeId(self.conn.last_insert_rowid())),
            Err(e) if is_constraint(&e) => Err(StoreError::Constraint(format!(
                "location type '{name}' already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn location_types(&self) -> Result<Vec<LocationType>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, idx FROM location_types ORDER BY idx")?;
        let types = stmt
            .query_map([], |row| {
                Ok(LocationType {
                    id: LocationTypeId(row.get(0)?),
                    name: row.get(1)?,
                    index: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(types)
    }

    fn add_property_type(&mut self, def: NewPropertyType) -> Result<PropertyTypeId, StoreError> {
        def.check().map_err(StoreError::Constraint)?;
        let name = def.name.trim();
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM property_types WHERE entity = ?1",
            params![def.entity.as_str()],
            |row| row.get(0),
        )?;
        let default_json = def
            .default
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        let enum_json = serde_json::to_string(&def.enum_values)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        match self.conn.execute(
            "INSERT INTO property_types (entity, name, kind, default_value, enum_values, idx)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                def.entity.as_str(),
                name,
                def.kind.as_str(),
                default_json,
                enum_json,
                count
            ],
        ) {
            Ok(_) => Ok(PropertyTypeId(self.conn.last_insert_rowid())),
            Err(e) if is_constraint(&e) => Err(StoreError::Constraint(format!(
                "{} property type '{name}' already exists",
                def.entity
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn property_types(&self, entity: EntityKind) -> Result<Vec<PropertyType>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity, name, kind, default_value, enum_values, idx
             FROM property_types WHERE entity = ?1 ORDER BY idx",
        )?;
        let raw = stmt
            .query_map(params![entity.as_str()], raw_property_type)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawPropertyType::decode).collect()
    }

    fn define_equipment_type(
        &mut self,
        name: &str,
        ports: &[PortDefinition],
    ) -> Result<(), StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Constraint("equipment type name must not be empty".into()));
        }
        let json =
            serde_json::to_string(ports).map_err(|e| StoreError::Constraint(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO equipment_types (name, ports) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET ports = excluded.ports",
            params![name, json],
        )?;
        Ok(())
    }

    fn equipment_type(&self, name: &str) -> Result<Option<EquipmentType>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT ports FROM equipment_types WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(EquipmentType {
                name: name.to_string(),
                ports: serde_json::from_str(&json).map_err(corrupt)?,
            })),
            None => Ok(None),
        }
    }

    fn find_location(
        &self,
        parent: Option<LocationId>,
        name: &str,
    ) -> Result<Option<LocationId>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM locations WHERE parent IS ?1 AND name = ?2",
                params![parent.map(LocationId::raw), name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(LocationId))
    }

    fn create_location(
        &mut self,
        parent: Option<LocationId>,
        name: &str,
        location_type: LocationTypeId,
    ) -> Result<LocationId, StoreError> {
        let known: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM location_types WHERE id = ?1",
                params![location_type.raw()],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(StoreError::NotFound(format!("location type {location_type}")));
        }
        if let Some(p) = parent {
            if self.location(p)?.is_none() {
                return Err(StoreError::NotFound(format!("location {p}")));
            }
        }
        match self.conn.execute(
            "INSERT INTO locations (name, location_type, parent) VALUES (?1, ?2, ?3)",
            params![name, location_type.raw(), parent.map(LocationId::raw)],
        ) {
            Ok(_) => Ok(LocationId(self.conn.last_insert_rowid())),
            Err(e) if is_constraint(&e) => Err(StoreError::Constraint(format!(
                "location '{name}' already exists under this parent"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let loc = self
            .conn
            .query_row(
                "SELECT id, name, location_type, parent FROM locations WHERE id = ?1",
                params![id.raw()],
                |row| {
                    Ok(Location {
                        id: LocationId(row.get(0)?),
                        name: row.get(1)?,
                        location_type: LocationTypeId(row.get(2)?),
                        parent: row.get::<_, Option<i64>>(3)?.map(LocationId),
                    })
                },
            )
            .optional()?;
        Ok(loc)
    }

    fn find_equipment(
        &self,
        container: Container,
        name: &str,
    ) -> Result<Vec<Equipment>, StoreError> {
        let (kind, id) = container_columns(container);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment
             WHERE container_kind = ?1 AND container_id = ?2 AND name = ?3 ORDER BY id"
        ))?;
        let raw = stmt
            .query_map(params![kind, id, name], raw_equipment)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawEquipment::decode).collect()
    }

    fn create_equipment(
        &mut self,
        container: Container,
        name: &str,
        equipment_type: &str,
    ) -> Result<EquipmentId, StoreError> {
        let exists = match container {
            Container::Location(id) => self.location(id)?.is_some(),
            Container::Equipment(id) => self.equipment(id)?.is_some(),
        };
        if !exists {
            return Err(StoreError::NotFound(format!("container {container:?}")));
        }
        if name.is_empty() || equipment_type.is_empty() {
            return Err(StoreError::Constraint(
                "equipment needs a name and an equipment type".into(),
            ));
        }
        let (kind, container_id) = container_columns(container);
        self.atomically(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO equipment_types (name, ports) VALUES (?1, '[]')",
                params![equipment_type],
            )?;
            match conn.execute(
                "INSERT INTO equipment (name, equipment_type, container_kind, container_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, equipment_type, kind, container_id],
            ) {
                Ok(_) => Ok(EquipmentId(conn.last_insert_rowid())),
                Err(e) if is_constraint(&e) => Err(StoreError::Constraint(format!(
                    "equipment '{name}' of type '{equipment_type}' already exists in this container"
                ))),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1"),
                params![id.raw()],
                raw_equipment,
            )
            .optional()?;
        raw.map(RawEquipment::decode).transpose()
    }

    fn remove_equipment(&mut self, id: EquipmentId) -> Result<(), StoreError> {
        if self.equipment(id)?.is_none() {
            return Err(StoreError::NotFound(format!("equipment {id}")));
        }
        self.atomically(|conn| {
            let mut doomed = vec![id.raw()];
            let mut i = 0;
            {
                let mut children = conn.prepare(
                    "SELECT id FROM equipment WHERE container_kind = 'equipment' AND container_id = ?1",
                )?;
                while i < doomed.len() {
                    let nested = children
                        .query_map(params![doomed[i]], |row| row.get::<_, i64>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    doomed.extend(nested);
                    i += 1;
                }
            }

            for eq in doomed.iter().rev() {
                let ports = {
                    let mut stmt = conn.prepare("SELECT id FROM ports WHERE equipment = ?1")?;
                    let ids = stmt
                        .query_map(params![eq], |row| row.get::<_, i64>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    ids
                };
                for port in ports {
                    let links = {
                        let mut stmt = conn
                            .prepare("SELECT id FROM links WHERE port_a = ?1 OR port_b = ?1")?;
                        let ids = stmt
                            .query_map(params![port], |row| row.get::<_, i64>(0))?
                            .collect::<Result<Vec<_>, _>>()?;
                        ids
                    };
                    for link in links {
                        delete_link(conn, link)?;
                    }
                    delete_values_of(conn, EntityKind::Port, port)?;
                    conn.execute("DELETE FROM ports WHERE id = ?1", params![port])?;
                }
                delete_values_of(conn, EntityKind::Equipment, *eq)?;
                conn.execute("DELETE FROM equipment WHERE id = ?1", params![eq])?;
            }
            log::debug!("removed {} equipment rooted at {id}", doomed.len());
            Ok(())
        })
    }

    fn find_port(&self, equipment: EquipmentId, name: &str) -> Result<Option<PortId>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM ports WHERE equipment = ?1 AND name = ?2",
                params![equipment.raw(), name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(PortId))
    }

    fn create_port(&mut self, equipment: EquipmentId, name: &str) -> Result<PortId, StoreError> {
        let eq = self
            .equipment(equipment)?
            .ok_or_else(|| StoreError::NotFound(format!("equipment {equipment}")))?;
        if name.is_empty() {
            return Err(StoreError::Constraint("port name must not be empty".into()));
        }
        let port_type = self
            .equipment_type(&eq.equipment_type)?
            .and_then(|t| t.port_definition(name).map(|d| d.port_type.clone()));
        match self.conn.execute(
            "INSERT INTO ports (name, equipment, port_type) VALUES (?1, ?2, ?3)",
            params![name, equipment.raw(), port_type],
        ) {
            Ok(_) => Ok(PortId(self.conn.last_insert_rowid())),
            Err(e) if is_constraint(&e) => Err(StoreError::Constraint(format!(
                "port '{name}' already exists on equipment '{}'",
                eq.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn port(&self, id: PortId) -> Result<Option<Port>, StoreError> {
        let port = self
            .conn
            .query_row(
                "SELECT id, name, equipment, port_type FROM ports WHERE id = ?1",
                params![id.raw()],
                |row| {
                    Ok(Port {
                        id: PortId(row.get(0)?),
                        name: row.get(1)?,
                        equipment: EquipmentId(row.get(2)?),
                        port_type: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(port)
    }

    fn find_link(&self, a: PortId, b: PortId) -> Result<Option<LinkId>, StoreError> {
        let (a, b) = port_pair(a, b);
        let id = self
            .conn
            .query_row(
                "SELECT id FROM links WHERE port_a = ?1 AND port_b = ?2",
                params![a.raw(), b.raw()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(LinkId))
    }

    fn create_link(&mut self, a: PortId, b: PortId) -> Result<LinkId, StoreError> {
        if a == b {
            return Err(StoreError::Constraint(format!("cannot link {a} to itself")));
        }
        for p in [a, b] {
            if self.port(p)?.is_none() {
                return Err(StoreError::NotFound(format!("port {p}")));
            }
        }
        if let Some(existing) = self.find_link(a, b)? {
            return Err(StoreError::DuplicateLink { existing });
        }
        let (lo, hi) = port_pair(a, b);
        match self.conn.execute(
            "INSERT INTO links (port_a, port_b) VALUES (?1, ?2)",
            params![lo.raw(), hi.raw()],
        ) {
            Ok(_) => Ok(LinkId(self.conn.last_insert_rowid())),
            Err(e) if is_constraint(&e) => match self.find_link(lo, hi)? {
                Some(existing) => Err(StoreError::DuplicateLink { existing }),
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        let link = self
            .conn
            .query_row(
                "SELECT id, port_a, port_b FROM links WHERE id = ?1",
                params![id.raw()],
                |row| {
                    Ok(Link {
                        id: LinkId(row.get(0)?),
                        a: PortId(row.get(1)?),
                        b: PortId(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(link)
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, port_a, port_b FROM links ORDER BY id")?;
        let links = stmt
            .query_map([], |row| {
                Ok(Link {
                    id: LinkId(row.get(0)?),
                    a: PortId(row.get(1)?),
                    b: PortId(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError> {
        if self.link(id)?.is_none() {
            return Err(StoreError::NotFound(format!("link {id}")));
        }
        self.atomically(|conn| delete_link(conn, id.raw()))
    }

    fn property_value(
        &self,
        entity: EntityRef,
        property_type: PropertyTypeId,
    ) -> Result<Option<TypedValue>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {VALUE_COLUMNS} FROM property_values
                     WHERE entity_kind = ?1 AND entity_id = ?2 AND property_type = ?3"
                ),
                params![entity.kind().as_str(), entity.raw(), property_type.raw()],
                raw_value,
            )
            .optional()?;
        Ok(raw.map(RawValue::decode).transpose()?.map(|pv| pv.value))
    }

    fn upsert_property_value(
        &mut self,
        entity: EntityRef,
        property_type: PropertyTypeId,
        value: TypedValue,
    ) -> Result<(), StoreError> {
        if !self.entity_exists(entity)? {
            return Err(StoreError::NotFound(format!("{} {entity}", entity.kind())));
        }
        let types = self.all_property_types()?;
        let pt = property_type_for(&types, entity, property_type)?;
        check_value(&pt.name, pt.kind, &pt.enum_values, &value).map_err(StoreError::Constraint)?;

        let (int_val, bool_val, float_val, string_val) = match &value {
            TypedValue::Integer(v) => (Some(*v), None, None, None),
            TypedValue::Boolean(v) => (None, Some(*v), None, None),
            TypedValue::Decimal(v) => (None, None, Some(*v), None),
            TypedValue::String(v) | TypedValue::Enumerated(v) => {
                (None, None, None, Some(v.as_str()))
            }
        };
        self.conn.execute(
            "INSERT INTO property_values
                 (entity_kind, entity_id, property_type, kind, int_val, bool_val, float_val, string_val)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(entity_kind, entity_id, property_type) DO UPDATE SET
                 kind = excluded.kind,
                 int_val = excluded.int_val,
                 bool_val = excluded.bool_val,
                 float_val = excluded.float_val,
                 string_val = excluded.string_val",
            params![
                entity.kind().as_str(),
                entity.raw(),
                property_type.raw(),
                value.kind().as_str(),
                int_val,
                bool_val,
                float_val,
                string_val
            ],
        )?;
        Ok(())
    }

    fn property_values(&self, entity: EntityRef) -> Result<Vec<PropertyValue>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VALUE_COLUMNS} FROM property_values
             WHERE entity_kind = ?1 AND entity_id = ?2 ORDER BY property_type"
        ))?;
        let raw = stmt
            .query_map(params![entity.kind().as_str(), entity.raw()], raw_value)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawValue::decode).collect()
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_transaction() {
            return Err(StoreError::Transaction("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("no open transaction".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        self.savepoints.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("no open transaction".into()));
        }
        self.conn.execute_batch("ROLLBACK")?;
        self.savepoints.clear();
        Ok(())
    }

    fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        if !self.in_transaction() {
            return Err(StoreError::Transaction("savepoint outside of a transaction".into()));
        }
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        self.savepoints.push(name.to_string());
        Ok(())
    }

    fn release(&mut self, name: &str) -> Result<(), StoreError> {
        let idx = self
            .savepoints
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| StoreError::Transaction(format!("no such savepoint: {name}")))?;
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
        self.savepoints.truncate(idx);
        Ok(())
    }

    fn rollback_to(&mut self, name: &str) -> Result<(), StoreError> {
        let idx = self
            .savepoints
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| StoreError::Transaction(format!("no such savepoint: {name}")))?;
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))?;
        self.savepoints.truncate(idx + 1);
        Ok(())
    }
}
