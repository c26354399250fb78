use netinv_graph::{
    Container, EntityKind, EntityRef, GraphStore, MemoryStore, NewPropertyType, PortDefinition,
    PropertyKind, SqliteStore, StoreError, TypedValue,
};

fn stores() -> Vec<(&'static str, Box<dyn GraphStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::open_in_memory().unwrap())),
    ]
}

// -------------------------------------------------------------------------
// Hierarchy
// -------------------------------------------------------------------------

#[test]
fn location_types_keep_insertion_order() {
    for (name, mut store) in stores() {
        store.add_location_type("Site").unwrap();
        store.add_location_type("Building").unwrap();
        store.add_location_type("Room").unwrap();
        let types = store.location_types().unwrap();
        let names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Site", "Building", "Room"], "{name}");
        assert!(store.add_location_type("Room").is_err(), "{name}");
        assert!(store.add_location_type("  ").is_err(), "{name}");
    }
}

#[test]
fn nested_equipment_has_its_own_namespace() {
    for (name, mut store) in stores() {
        let site = store.add_location_type("Site").unwrap();
        let nyc = store.create_location(None, "NYC", site).unwrap();
        let chassis = store
            .create_equipment(Container::Location(nyc), "chassis", "Chassis")
            .unwrap();
        let card = store
            .create_equipment(Container::Equipment(chassis), "slot1", "Card")
            .unwrap();
        assert_eq!(
            store.find_equipment(Container::Equipment(chassis), "slot1").unwrap()[0].id,
            card,
            "{name}"
        );
        assert!(store
            .find_equipment(Container::Location(nyc), "slot1")
            .unwrap()
            .is_empty());
        assert!(store.equipment_type("Card").unwrap().is_some(), "{name}");
    }
}

#[test]
fn port_type_comes_from_equipment_type() {
    for (name, mut store) in stores() {
        let site = store.add_location_type("Site").unwrap();
        let nyc = store.create_location(None, "NYC", site).unwrap();
        store
            .define_equipment_type(
                "Patch Panel",
                &[
                    PortDefinition { name: "1".into(), port_type: "LC".into() },
                    PortDefinition { name: "2".into(), port_type: "LC".into() },
                ],
            )
            .unwrap();
        let pp = store
            .create_equipment(Container::Location(nyc), "pp1", "Patch Panel")
            .unwrap();
        let port = store.create_port(pp, "2").unwrap();
        assert_eq!(
            store.port(port).unwrap().unwrap().port_type.as_deref(),
            Some("LC"),
            "{name}"
        );
        assert!(store.create_port(pp, "2").is_err(), "{name}");
    }
}

// -------------------------------------------------------------------------
// Links and properties
// -------------------------------------------------------------------------

#[test]
fn links_are_unordered_and_unique() {
    for (name, mut store) in stores() {
        let site = store.add_location_type("Site").unwrap();
        let nyc = store.create_location(None, "NYC", site).unwrap();
        let eq = store
            .create_equipment(Container::Location(nyc), "sw1", "Switch")
            .unwrap();
        let p = store.create_port(eq, "a").unwrap();
        let q = store.create_port(eq, "b").unwrap();
        let r = store.create_port(eq, "c").unwrap();

        let first = store.create_link(q, p).unwrap();
        let second = store.create_link(p, r).unwrap();
        assert_eq!(store.find_link(p, q).unwrap(), Some(first), "{name}");
        assert!(matches!(
            store.create_link(p, q),
            Err(StoreError::DuplicateLink { existing }) if existing == first
        ));
        let ids: Vec<_> = store.links().unwrap().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![first, second], "{name}");

        store.remove_link(first).unwrap();
        assert_eq!(store.find_link(p, q).unwrap(), None, "{name}");
        assert!(store.remove_link(first).is_err(), "{name}");
    }
}

#[test]
fn values_are_checked_against_their_type() {
    for (name, mut store) in stores() {
        let site = store.add_location_type("Site").unwrap();
        let nyc = store.create_location(None, "NYC", site).unwrap();
        let eq = store
            .create_equipment(Container::Location(nyc), "sw1", "Switch")
            .unwrap();
        let p = store.create_port(eq, "a").unwrap();
        let q = store.create_port(eq, "b").unwrap();
        let link = EntityRef::Link(store.create_link(p, q).unwrap());
        let speed = store
            .add_property_type(
                NewPropertyType::new(EntityKind::Link, "speed", PropertyKind::Enumerated)
                    .with_enum_values(["1G", "10G"]),
            )
            .unwrap();
        let serial = store
            .add_property_type(NewPropertyType::new(
                EntityKind::Equipment,
                "serial",
                PropertyKind::String,
            ))
            .unwrap();

        assert!(store
            .upsert_property_value(link, speed, TypedValue::Enumerated("40G".into()))
            .is_err());
        assert!(store
            .upsert_property_value(link, speed, TypedValue::String("1G".into()))
            .is_err());
        assert!(store
            .upsert_property_value(link, serial, TypedValue::String("x".into()))
            .is_err());
        store
            .upsert_property_value(link, speed, TypedValue::Enumerated("10G".into()))
            .unwrap();
        store
            .upsert_property_value(EntityRef::Equipment(eq), serial, TypedValue::String("SN1".into()))
            .unwrap();
        assert_eq!(store.property_values(link).unwrap().len(), 1, "{name}");

        store.remove_equipment(eq).unwrap();
        assert!(store.property_values(link).unwrap().is_empty(), "{name}");
        assert!(store
            .property_values(EntityRef::Equipment(eq))
            .unwrap()
            .is_empty());
    }
}

// -------------------------------------------------------------------------
// Transactions
// -------------------------------------------------------------------------

#[test]
fn nested_savepoints_roll_back_independently() {
    for (name, mut store) in stores() {
        let site = store.add_location_type("Site").unwrap();
        store.begin().unwrap();
        store.create_location(None, "A", site).unwrap();
        store.savepoint("outer").unwrap();
        store.create_location(None, "B", site).unwrap();
        store.savepoint("inner").unwrap();
        store.create_location(None, "C", site).unwrap();
        store.rollback_to("inner").unwrap();
        store.release("inner").unwrap();
        store.release("outer").unwrap();
        store.commit().unwrap();

        assert!(store.find_location(None, "A").unwrap().is_some(), "{name}");
        assert!(store.find_location(None, "B").unwrap().is_some(), "{name}");
        assert!(store.find_location(None, "C").unwrap().is_none(), "{name}");
    }
}

#[test]
fn transaction_misuse_is_reported() {
    for (name, mut store) in stores() {
        assert!(matches!(store.commit(), Err(StoreError::Transaction(_))), "{name}");
        assert!(matches!(store.rollback(), Err(StoreError::Transaction(_))), "{name}");
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StoreError::Transaction(_))), "{name}");
        assert!(matches!(store.rollback_to("nope"), Err(StoreError::Transaction(_))), "{name}");
        assert!(store.savepoint("bad name").is_err(), "{name}");
        store.rollback().unwrap();
    }
}
