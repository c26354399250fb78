//! Link matching by endpoint pair.

use netinv_graph::{GraphStore, LinkId, PortId, StoreError};

use crate::error::RowError;

/// Result of [`create_or_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMatch {
    Existing(LinkId),
    Created(LinkId),
}

impl LinkMatch {
    pub fn id(&self) -> LinkId {
        match self {
            Self::Existing(id) | Self::Created(id) => *id,
        }
    }
}

/// The link connecting `a` and `b`, in either order.
pub fn find_link<S: GraphStore + ?Sized>(
    store: &S,
    a: PortId,
    b: PortId,
) -> Result<Option<LinkId>, RowError> {
    if a == b {
        return Err(RowError::SameEndpoint);
    }
    Ok(store.find_link(a, b)?)
}

/// Create a link between `a` and `b` unless one already exists.
///
/// The pair is re-checked right before creating, and a duplicate rejection
/// from the store is treated as a match against the link that won.
pub fn create_or_match<S: GraphStore + ?Sized>(
    store: &mut S,
    a: PortId,
    b: PortId,
) -> Result<LinkMatch, RowError> {
    if let Some(existing) = find_link(store, a, b)? {
        return Ok(LinkMatch::Existing(existing));
    }
    match store.create_link(a, b) {
        Ok(id) => Ok(LinkMatch::Created(id)),
        Err(StoreError::DuplicateLink { existing }) => {
            log::warn!("link between {a} and {b} appeared concurrently, editing {existing}");
            Ok(LinkMatch::Existing(existing))
        }
        Err(e) => Err(e.into()),
    }
}
