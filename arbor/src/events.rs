//! Data-store change notifications.

use std::sync::Arc;

use crate::dbid::DBID;
use crate::errors::ArborResult;
use crate::relation::Relation;

/// A change to a relation, delivered after the change was applied.
pub enum DataStoreEvent<O: ?Sized> {
    /// Objects that were added.
    Inserted(Vec<DBID>),
    /// Objects that were removed, with their former contents.
    Removed(Vec<(DBID, Arc<O>)>),
}

impl<O: ?Sized> DataStoreEvent<O> {
    pub fn ids(&self) -> Vec<DBID> {
        match self {
            DataStoreEvent::Inserted(ids) => ids.clone(),
            DataStoreEvent::Removed(items) => items.iter().map(|(id, _)| *id).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DataStoreEvent::Inserted(ids) => ids.is_empty(),
            DataStoreEvent::Removed(items) => items.is_empty(),
        }
    }
}

impl<O: ?Sized> Clone for DataStoreEvent<O> {
    fn clone(&self) -> Self {
        match self {
            DataStoreEvent::Inserted(ids) => DataStoreEvent::Inserted(ids.clone()),
            DataStoreEvent::Removed(items) => DataStoreEvent::Removed(items.clone()),
        }
    }
}

impl<O: ?Sized> std::fmt::Debug for DataStoreEvent<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataStoreEvent::Inserted(ids) => write!(f, "Inserted({:?})", ids),
            DataStoreEvent::Removed(items) => {
                write!(f, "Removed({:?})", items.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            }
        }
    }
}

/// Receives change notifications from a relation.
///
/// An error aborts the notification of later listeners and is returned to
/// whoever modified the relation.
pub trait DataStoreListener<O: ?Sized>: Send + Sync {
    fn content_changed(
        &self,
        relation: &dyn Relation<Object = O>,
        event: &DataStoreEvent<O>,
    ) -> ArborResult<()>;
}
