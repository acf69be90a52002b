//! LRU cache of decoded pages.
//!
//! The cache is filled lazily: pages enter it only when they are read or
//! written. Dirty pages are written back by the owner when they are evicted
//! or when the file is flushed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::page_file::PageId;

struct CachedPage<P> {
    page: Arc<P>,
    dirty: bool,
}

/// A page pushed out of the cache.
pub struct Evicted<P> {
    pub id: PageId,
    pub page: Arc<P>,
    pub dirty: bool,
}

pub struct PageCache<P> {
    pages: HashMap<PageId, CachedPage<P>>,
    /// front = least recently used
    lru_order: VecDeque<PageId>,
    max_pages: usize,
}

impl<P> PageCache<P> {
    /// A cache holding at most `max_pages` pages (at least one).
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_order: VecDeque::new(),
            max_pages: max_pages.max(1),
        }
    }

    /// Looks a page up and marks it most recently used.
    pub fn get(&mut self, id: PageId) -> Option<Arc<P>> {
        let page = self.pages.get(&id)?.page.clone();
        self.touch(id);
        Some(page)
    }

    /// Puts a page into the cache. Returns the least recently used page
    /// when the cache was full.
    pub fn insert(&mut self, id: PageId, page: Arc<P>, dirty: bool) -> Option<Evicted<P>> {
        if let Some(cached) = self.pages.get_mut(&id) {
            cached.page = page;
            cached.dirty |= dirty;
            self.touch(id);
            return None;
        }

        let evicted = if self.pages.len() >= self.max_pages {
            self.evict_oldest()
        } else {
            None
        };
        self.pages.insert(id, CachedPage { page, dirty });
        self.lru_order.push_back(id);
        evicted
    }

    pub fn evict_oldest(&mut self) -> Option<Evicted<P>> {
        while let Some(id) = self.lru_order.pop_front() {
            if let Some(cached) = self.pages.remove(&id) {
                return Some(Evicted {
                    id,
                    page: cached.page,
                    dirty: cached.dirty,
                });
            }
        }
        None
    }

    /// Dirty pages, in ascending id order.
    pub fn dirty_pages(&self) -> Vec<(PageId, Arc<P>)> {
        let mut dirty: Vec<_> = self
            .pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, cached)| (*id, cached.page.clone()))
            .collect();
        dirty.sort_by_key(|(id, _)| *id);
        dirty
    }

    pub fn mark_clean(&mut self, id: PageId) {
        if let Some(cached) = self.pages.get_mut(&id) {
            cached.dirty = false;
        }
    }

    /// Forgets a page without writing it back.
    pub fn remove(&mut self, id: PageId) -> Option<Arc<P>> {
        self.lru_order.retain(|&other| other != id);
        self.pages.remove(&id).map(|cached| cached.page)
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.lru_order.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains_key(&id)
    }

    fn touch(&mut self, id: PageId) {
        if self.lru_order.back() != Some(&id) {
            self.lru_order.retain(|&other| other != id);
            self.lru_order.push_back(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = PageCache::new(3);
        assert!(cache.insert(1, Arc::new("a"), false).is_none());
        assert!(cache.insert(2, Arc::new("b"), true).is_none());
        assert!(cache.insert(3, Arc::new("c"), false).is_none());

        // touching 1 makes 2 the oldest
        assert_eq!(*cache.get(1).unwrap(), "a");
        let evicted = cache.insert(4, Arc::new("d"), false).unwrap();
        assert_eq!(evicted.id, 2);
        assert!(evicted.dirty);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(2));
    }

    #[test]
    fn test_reinsert_keeps_dirty_flag() {
        let mut cache = PageCache::new(2);
        cache.insert(1, Arc::new(1), true);
        cache.insert(1, Arc::new(2), false);
        assert_eq!(cache.dirty_pages().len(), 1);
        assert_eq!(*cache.get(1).unwrap(), 2);

        cache.mark_clean(1);
        assert!(cache.dirty_pages().is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = PageCache::new(4);
        cache.insert(5, Arc::new(()), true);
        cache.insert(6, Arc::new(()), false);
        assert!(cache.remove(5).is_some());
        assert!(cache.remove(5).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.evict_oldest().is_none());
    }

    #[test]
    fn test_zero_capacity_still_caches_one_page() {
        let mut cache = PageCache::new(0);
        cache.insert(1, Arc::new(1u8), false);
        let evicted = cache.insert(2, Arc::new(2u8), false).unwrap();
        assert_eq!(evicted.id, 1);
        assert_eq!(cache.len(), 1);
    }
}
