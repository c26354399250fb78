//! Entity identity.
//!
//! Every entity carries an opaque integer ID assigned by the store on
//! creation. IDs are stable for the lifetime of the entity and never reused
//! after deletion, so an exported Link ID can safely be checked on re-import.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[inline]
            pub fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            #[inline]
            pub fn raw(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a level of the location type hierarchy.
    LocationTypeId, "lt"
);
entity_id!(LocationId, "loc");
entity_id!(EquipmentId, "eq");
entity_id!(PortId, "port");
entity_id!(
    /// Identifies a link. Rendered bare in CSV exports (`raw()`), prefixed in logs.
    LinkId, "link"
);
entity_id!(PropertyTypeId, "pt");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed() {
        assert_eq!(LinkId::from_raw(7).to_string(), "link7");
        assert_eq!(PortId(3).to_string(), "port3");
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(PortId(2) < PortId(10));
        assert_eq!(PortId(4).max(PortId(9)), PortId(9));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&LinkId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
