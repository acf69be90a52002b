//! A tree behind a read-write lock, registered with its relation.

use arbor::dbid::DBID;
use arbor::distance::PrimitiveDistance;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::events::{DataStoreEvent, DataStoreListener};
use arbor::knn::{DoubleDBIDList, KnnList};
use arbor::query::{KnnIndex, KnnProvider};
use arbor::relation::Relation;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ApproximationScope, DynamicIndex, PartitionedIndex};
use crate::errors::SpatialResult;

/// Wraps an index so it can follow relation changes and serve queries
/// through shared references.
///
/// Change events take the write lock, queries the read lock: one writer,
/// many readers. Register the wrapper with the relation before anything
/// that queries it while handling the same event.
pub struct SharedIndex<T> {
    inner: RwLock<T>,
    name: String,
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<T> SharedIndex<T> {
    pub fn new(index: T) -> Self {
        Self {
            inner: RwLock::new(index),
            name: format!("Shared({})", short_type_name::<T>()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<O, T> DataStoreListener<O> for SharedIndex<T>
where
    O: ?Sized,
    T: DynamicIndex<O>,
{
    fn content_changed(
        &self,
        relation: &dyn Relation<Object = O>,
        event: &DataStoreEvent<O>,
    ) -> ArborResult<()> {
        let mut index = self.inner.write();
        match event {
            DataStoreEvent::Inserted(ids) => {
                for &id in ids {
                    let object = relation.get(id).ok_or_else(|| {
                        ArborError::new(
                            &format!("Inserted object {} is missing from the relation", id),
                            ErrorKind::NotFound,
                        )
                    })?;
                    index.insert(id, object.as_ref())?;
                }
            }
            DataStoreEvent::Removed(items) => {
                for (id, object) in items {
                    if !index.delete(*id, object.as_ref())? {
                        log::warn!("{}: removed object {} was not indexed", self.name, id);
                    }
                }
            }
        }
        log::trace!("{} applied {:?}", self.name, event);
        Ok(())
    }
}

impl<O, T> KnnIndex<O> for SharedIndex<T>
where
    O: ?Sized,
    T: KnnIndex<O>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, distance: &dyn PrimitiveDistance<O>) -> bool {
        self.inner.read().supports(distance)
    }

    fn knn(&self, distance: &dyn PrimitiveDistance<O>, query: &O, k: usize) -> ArborResult<KnnList> {
        self.inner.read().knn(distance, query, k)
    }

    fn range(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        radius: f64,
    ) -> ArborResult<DoubleDBIDList> {
        self.inner.read().range(distance, query, radius)
    }

    fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        self.inner.read().reverse_knn(distance, query, k, provider)
    }
}

impl<T: PartitionedIndex> PartitionedIndex for SharedIndex<T> {
    fn partitions(&self, scope: ApproximationScope) -> SpatialResult<Vec<Vec<DBID>>> {
        self.inner.read().partitions(scope)
    }
}
