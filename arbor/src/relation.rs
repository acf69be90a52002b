//! Relations map object identifiers to objects.
//!
//! The indexes reference a relation but never own or mutate it. Changes to
//! a [`MemoryRelation`] are broadcast to registered [`DataStoreListener`]s
//! so indexes and preprocessors can follow along.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::dbid::DBID;
use crate::errors::{ArborError, ArborResult, ErrorKind};
use crate::events::{DataStoreEvent, DataStoreListener};

/// Read access to a collection of identified objects.
pub trait Relation: Send + Sync {
    type Object: ?Sized;

    /// Number of objects currently stored.
    fn size(&self) -> usize;

    /// Looks up an object. `None` if the id is unknown or was deleted.
    fn get(&self, id: DBID) -> Option<Arc<Self::Object>>;

    /// Snapshot of all ids, in insertion order.
    ///
    /// The order only changes when the relation is modified.
    fn dbids(&self) -> Vec<DBID>;

    /// Vector dimensionality, if the relation holds fixed-length vectors.
    fn dimensionality(&self) -> Option<usize> {
        None
    }
}

/// An in-memory relation with change notification.
///
/// Ids are assigned sequentially and never reused.
pub struct MemoryRelation<O: ?Sized> {
    objects: RwLock<IndexMap<DBID, Arc<O>>>,
    next_id: AtomicU32,
    listeners: RwLock<Vec<Arc<dyn DataStoreListener<O>>>>,
    dimension_of: Option<fn(&O) -> usize>,
    dimensionality: RwLock<Option<usize>>,
}

/// A relation of real vectors of one dimensionality.
pub type VectorRelation = MemoryRelation<[f64]>;

impl<O: ?Sized + Send + Sync + 'static> MemoryRelation<O> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(IndexMap::new()),
            next_id: AtomicU32::new(0),
            listeners: RwLock::new(Vec::new()),
            dimension_of: None,
            dimensionality: RwLock::new(None),
        }
    }

    /// Registers a listener. Listeners are notified in registration order,
    /// so an index should be registered before anything that queries it.
    pub fn add_listener(&self, listener: Arc<dyn DataStoreListener<O>>) {
        self.listeners.write().push(listener);
    }

    /// Removes a previously registered listener. Returns false if unknown.
    pub fn remove_listener(&self, listener: &Arc<dyn DataStoreListener<O>>) -> bool {
        let mut listeners = self.listeners.write();
        let target = Arc::as_ptr(listener) as *const ();
        let before = listeners.len();
        listeners.retain(|l| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    /// Inserts one object and notifies listeners.
    pub fn insert(&self, object: Arc<O>) -> ArborResult<DBID> {
        let ids = self.insert_all(vec![object])?;
        Ok(ids[0])
    }

    /// Inserts a batch of objects, notifying listeners once for the batch.
    pub fn insert_all(&self, objects: Vec<Arc<O>>) -> ArborResult<Vec<DBID>> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensionality(&objects)?;

        let ids = {
            let mut store = self.objects.write();
            let mut ids = Vec::with_capacity(objects.len());
            for object in objects {
                let id = DBID::new(self.next_id.fetch_add(1, Ordering::Relaxed));
                store.insert(id, object);
                ids.push(id);
            }
            ids
        };

        log::trace!("inserted {} objects", ids.len());
        self.fire(DataStoreEvent::Inserted(ids.clone()))?;
        Ok(ids)
    }

    /// Deletes objects and notifies listeners with the removed objects.
    ///
    /// Fails without modifying anything if one of the ids is unknown.
    pub fn delete(&self, ids: &[DBID]) -> ArborResult<Vec<(DBID, Arc<O>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let removed = {
            let mut store = self.objects.write();
            if let Some(missing) = ids.iter().find(|id| !store.contains_key(*id)) {
                return Err(ArborError::new(
                    &format!("Cannot delete unknown object {}", missing),
                    ErrorKind::NotFound,
                ));
            }
            ids.iter()
                .filter_map(|id| store.shift_remove(id).map(|obj| (*id, obj)))
                .collect::<Vec<_>>()
        };

        log::trace!("deleted {} objects", removed.len());
        self.fire(DataStoreEvent::Removed(removed.clone()))?;
        Ok(removed)
    }

    fn check_dimensionality(&self, objects: &[Arc<O>]) -> ArborResult<()> {
        let Some(dimension_of) = self.dimension_of else {
            return Ok(());
        };
        let mut dim = self.dimensionality.write();
        for object in objects {
            let d = dimension_of(object.as_ref());
            match *dim {
                Some(expected) if expected != d => {
                    return Err(ArborError::new(
                        &format!(
                            "Object of dimensionality {} does not match relation dimensionality {}",
                            d, expected
                        ),
                        ErrorKind::InvalidArgument,
                    ))
                }
                Some(_) => {}
                None => *dim = Some(d),
            }
        }
        Ok(())
    }

    fn fire(&self, event: DataStoreEvent<O>) -> ArborResult<()> {
        // snapshot so listeners may read the relation while being notified
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.content_changed(self, &event)?;
        }
        Ok(())
    }
}

impl<O: ?Sized + Send + Sync + 'static> Default for MemoryRelation<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorRelation {
    /// A vector relation that enforces a uniform dimensionality.
    pub fn for_vectors() -> Self {
        Self {
            dimension_of: Some(<[f64]>::len as fn(&[f64]) -> usize),
            ..Self::new()
        }
    }

    /// Builds a relation from vectors; ids are assigned in input order
    /// starting at 0.
    pub fn from_vectors(vectors: Vec<Vec<f64>>) -> ArborResult<Self> {
        let relation = Self::for_vectors();
        relation.insert_all(vectors.into_iter().map(Arc::from).collect())?;
        Ok(relation)
    }

    pub fn insert_vector(&self, vector: Vec<f64>) -> ArborResult<DBID> {
        self.insert(Arc::from(vector))
    }
}

impl<O: ?Sized + Send + Sync + 'static> Relation for MemoryRelation<O> {
    type Object = O;

    fn size(&self) -> usize {
        self.objects.read().len()
    }

    fn get(&self, id: DBID) -> Option<Arc<O>> {
        self.objects.read().get(&id).cloned()
    }

    fn dbids(&self) -> Vec<DBID> {
        self.objects.read().keys().copied().collect()
    }

    fn dimensionality(&self) -> Option<usize> {
        *self.dimensionality.read()
    }
}
