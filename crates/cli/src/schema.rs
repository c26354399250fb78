//! `netinv init`, `location-type`, `property` and `equipment-type`: the
//! definitions an import's row schema is derived from.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Subcommand;
use netinv_graph::{EntityKind, GraphStore, NewPropertyType, PortDefinition, PropertyKind, SqliteStore};

use crate::util::open_store;
use crate::CliError;

#[derive(Subcommand)]
pub enum LocationTypeCommands {
    /// Append a location type below the current innermost one
    #[command(after_help = "\
Examples:
  netinv location-type add inventory.db Site
  netinv location-type add inventory.db Room")]
    Add {
        db: PathBuf,
        name: String,
    },

    /// List location types, outermost first
    List {
        db: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum PropertyCommands {
    /// Define a typed property
    #[command(after_help = "\
Examples:
  netinv property add inventory.db --name weight --kind integer
  netinv property add inventory.db --name speed --kind enumerated --values 1G,10G --default 1G
  netinv property add inventory.db --name vendor --kind string --entity equipment")]
    Add {
        db: PathBuf,

        #[arg(long)]
        name: String,

        /// integer, boolean, decimal, string or enumerated
        #[arg(long)]
        kind: PropertyKind,

        /// Owning entity kind: link, equipment or port
        #[arg(long, default_value = "link")]
        entity: EntityKind,

        /// Allowed values for enumerated properties (comma-separated)
        #[arg(long, value_delimiter = ',')]
        values: Vec<String>,

        /// Default value, attached when an import creates the entity
        #[arg(long)]
        default: Option<String>,
    },

    /// List property definitions in column order
    List {
        db: PathBuf,

        /// Only this entity kind
        #[arg(long)]
        entity: Option<EntityKind>,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum EquipmentTypeCommands {
    /// Define (or redefine) an equipment type's port definitions
    #[command(after_help = "\
Examples:
  netinv equipment-type add inventory.db Switch --port ge-0/0/0:sfp --port ge-0/0/1:sfp")]
    Add {
        db: PathBuf,
        name: String,

        /// Port definition as NAME:TYPE (repeatable)
        #[arg(long = "port", value_name = "NAME:TYPE")]
        ports: Vec<String>,
    },
}

// ============================================================================
// init
// ============================================================================

pub fn cmd_init(db: PathBuf) -> Result<(), CliError> {
    let existed = db.exists();
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| CliError::io(format!("cannot create {}: {e}", parent.display())))?;
    }
    SqliteStore::open(&db).map_err(CliError::store)?;
    if existed {
        eprintln!("inventory already initialized: {}", db.display());
    } else {
        eprintln!("created {}", db.display());
    }
    Ok(())
}

// ============================================================================
// location-type
// ============================================================================

pub fn cmd_location_type(cmd: LocationTypeCommands) -> Result<(), CliError> {
    match cmd {
        LocationTypeCommands::Add { db, name } => {
            let mut store = open_store(&db)?;
            store.add_location_type(&name).map_err(CliError::store)?;
            let depth = store.location_types().map_err(CliError::store)?.len();
            eprintln!("added location type '{}' at depth {}", name.trim(), depth);
            Ok(())
        }
        LocationTypeCommands::List { db } => {
            let store = open_store(&db)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for lt in store.location_types().map_err(CliError::store)? {
                writeln!(out, "{}\t{}", lt.index, lt.name).map_err(|e| CliError::io(e.to_string()))?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// property
// ============================================================================

pub fn cmd_property(cmd: PropertyCommands) -> Result<(), CliError> {
    match cmd {
        PropertyCommands::Add { db, name, kind, entity, values, default } => {
            let values: Vec<String> = values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            let mut def = NewPropertyType::new(entity, name, kind).with_enum_values(values);
            if let Some(raw) = default {
                let parsed = netinv_recon::codec::parse_kind(kind, &def.enum_values, &raw)
                    .map_err(|e| CliError::args(format!("--default: {e}")))?;
                if let Some(value) = parsed {
                    def = def.with_default(value);
                }
            }
            def.check().map_err(CliError::args)?;

            let mut store = open_store(&db)?;
            store.add_property_type(def.clone()).map_err(CliError::store)?;
            eprintln!("added {} property '{}' ({})", def.entity, def.name.trim(), def.kind);
            Ok(())
        }
        PropertyCommands::List { db, entity, json } => {
            let store = open_store(&db)?;
            let kinds = match entity {
                Some(kind) => vec![kind],
                None => vec![EntityKind::Link, EntityKind::Equipment, EntityKind::Port],
            };
            let mut all = Vec::new();
            for kind in kinds {
                all.extend(store.property_types(kind).map_err(CliError::store)?);
            }

            if json {
                let json_str = serde_json::to_string_pretty(&all)
                    .map_err(|e| CliError::new(crate::exit_codes::EXIT_ERROR, e.to_string()))?;
                println!("{json_str}");
                return Ok(());
            }

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for pt in &all {
                let default = pt
                    .default
                    .as_ref()
                    .map(netinv_recon::codec::format)
                    .unwrap_or_default();
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    pt.entity,
                    pt.name,
                    pt.kind,
                    pt.enum_values.join(","),
                    default
                )
                .map_err(|e| CliError::io(e.to_string()))?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// equipment-type
// ============================================================================

pub fn cmd_equipment_type(cmd: EquipmentTypeCommands) -> Result<(), CliError> {
    match cmd {
        EquipmentTypeCommands::Add { db, name, ports } => {
            let defs = ports
                .iter()
                .map(|p| parse_port_definition(p))
                .collect::<Result<Vec<_>, _>>()?;
            let mut store = open_store(&db)?;
            store.define_equipment_type(name.trim(), &defs).map_err(CliError::store)?;
            eprintln!("defined equipment type '{}' with {} ports", name.trim(), defs.len());
            Ok(())
        }
    }
}

fn parse_port_definition(raw: &str) -> Result<PortDefinition, CliError> {
    match raw.rsplit_once(':') {
        Some((name, port_type)) if !name.trim().is_empty() && !port_type.trim().is_empty() => {
            Ok(PortDefinition {
                name: name.trim().to_string(),
                port_type: port_type.trim().to_string(),
            })
        }
        _ => Err(CliError::args(format!("invalid port definition {raw:?}"))
            .with_hint("expected NAME:TYPE, e.g. --port eth0:rj45")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_definition_splits_on_last_colon() {
        let def = parse_port_definition("slot:1:sfp").unwrap();
        assert_eq!(def.name, "slot:1");
        assert_eq!(def.port_type, "sfp");
    }

    #[test]
    fn port_definition_needs_both_halves() {
        assert!(parse_port_definition("eth0").is_err());
        assert!(parse_port_definition(":rj45").is_err());
        assert!(parse_port_definition("eth0:").is_err());
    }
}
