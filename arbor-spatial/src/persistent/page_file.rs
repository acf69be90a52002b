//! Page files: the storage indirection between a tree and its nodes.
//!
//! Page 0 is reserved for the [`TreeHeader`]; data pages start at 1.
//! Freed pages are handed out again by later allocations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{SpatialError, SpatialResult};

/// Identifier of a page within a page file.
pub type PageId = u32;

/// Page reserved for the tree header.
pub const HEADER_PAGE: PageId = 0;

/// Index-wide metadata stored in page 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub root: PageId,
    pub height: usize,
    pub leaf_capacity: usize,
    pub dir_capacity: usize,
    pub leaf_minimum: usize,
    pub dir_minimum: usize,
    pub dimensionality: usize,
    pub size: usize,
}

/// Snapshot of page file counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageFileStats {
    pub reads: u64,
    pub writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub allocated_pages: u64,
    pub free_pages: u64,
}

/// Storage for tree nodes of type `P`.
///
/// Reads take `&self` so queries can run concurrently; everything that
/// changes the file takes `&mut self`.
pub trait PageFile<P>: Send + Sync {
    /// Size of a page in bytes, `None` for unbounded in-memory pages.
    fn page_size(&self) -> Option<usize>;

    fn read_page(&self, id: PageId) -> SpatialResult<Arc<P>>;

    /// Replaces the contents of an allocated page.
    fn write_page(&mut self, id: PageId, page: P) -> SpatialResult<()>;

    /// Reserves a page id, reusing freed pages first.
    fn allocate_page(&mut self) -> SpatialResult<PageId>;

    fn free_page(&mut self, id: PageId) -> SpatialResult<()>;

    /// The stored tree header, `None` for a fresh file.
    fn read_header(&self) -> SpatialResult<Option<TreeHeader>>;

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()>;

    /// Makes all writes durable.
    fn flush(&mut self) -> SpatialResult<()>;

    fn stats(&self) -> PageFileStats;

    /// Drops every page and the header.
    fn clear(&mut self) -> SpatialResult<()>;
}

/// Atomic counters behind [`PageFileStats`].
#[derive(Debug, Default)]
pub(crate) struct PageCounters {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl PageCounters {
    pub fn read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, allocated_pages: u64, free_pages: u64) -> PageFileStats {
        PageFileStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            allocated_pages,
            free_pages,
        }
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// In-memory page file
// ============================================================================

/// Page file keeping every page on the heap.
pub struct MemoryPageFile<P> {
    pages: Vec<Option<Arc<P>>>,
    free: Vec<PageId>,
    header: Option<TreeHeader>,
    page_size: Option<usize>,
    counters: PageCounters,
}

impl<P> MemoryPageFile<P> {
    pub fn new() -> Self {
        Self {
            // slot 0 stands for the header page
            pages: vec![None],
            free: Vec::new(),
            header: None,
            page_size: None,
            counters: PageCounters::default(),
        }
    }

    /// A memory page file that reports a page size, so trees derive their
    /// node capacities the same way they would on disk.
    pub fn with_page_size(page_size: usize) -> Self {
        let mut file = Self::new();
        file.page_size = Some(page_size);
        file
    }

    fn slot(&self, id: PageId) -> SpatialResult<usize> {
        let index = id as usize;
        if id == HEADER_PAGE || index >= self.pages.len() {
            return Err(SpatialError::InvalidOperation(format!(
                "Page {} is not a data page of this file",
                id
            )));
        }
        Ok(index)
    }
}

impl<P> Default for MemoryPageFile<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync> PageFile<P> for MemoryPageFile<P> {
    fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    fn read_page(&self, id: PageId) -> SpatialResult<Arc<P>> {
        let index = self.slot(id)?;
        self.counters.read();
        self.pages[index]
            .clone()
            .ok_or_else(|| SpatialError::InvalidOperation(format!("Page {} is not allocated", id)))
    }

    fn write_page(&mut self, id: PageId, page: P) -> SpatialResult<()> {
        let index = self.slot(id)?;
        if self.free.contains(&id) {
            return Err(SpatialError::InvalidOperation(format!(
                "Page {} was freed and must be allocated again before writing",
                id
            )));
        }
        self.counters.write();
        self.pages[index] = Some(Arc::new(page));
        Ok(())
    }

    fn allocate_page(&mut self) -> SpatialResult<PageId> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }
        let id = PageId::try_from(self.pages.len()).map_err(|_| {
            SpatialError::InvalidOperation("Page id space exhausted".into())
        })?;
        self.pages.push(None);
        Ok(id)
    }

    fn free_page(&mut self, id: PageId) -> SpatialResult<()> {
        let index = self.slot(id)?;
        if self.free.contains(&id) {
            return Err(SpatialError::InvalidOperation(format!("Page {} freed twice", id)));
        }
        self.pages[index] = None;
        self.free.push(id);
        Ok(())
    }

    fn read_header(&self) -> SpatialResult<Option<TreeHeader>> {
        Ok(self.header.clone())
    }

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        Ok(())
    }

    fn stats(&self) -> PageFileStats {
        let allocated = (self.pages.len() - 1 - self.free.len()) as u64;
        self.counters.snapshot(allocated, self.free.len() as u64)
    }

    fn clear(&mut self) -> SpatialResult<()> {
        self.pages.truncate(1);
        self.pages[0] = None;
        self.free.clear();
        self.header = None;
        self.counters.reset();
        Ok(())
    }
}
