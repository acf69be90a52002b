//! Page file stored in an [`OnDiskArray`].
//!
//! Every page occupies one record of the array. A record starts with a
//! CRC32 of the encoded page and the encoded length, followed by the page
//! itself in bincode's legacy encoding:
//!
//! ```text
//! [checksum: u32][length: u32][bincode bytes ... zero padding]
//! ```
//!
//! A length of 0 marks a page that was allocated but never written. Freed
//! pages carry [`FREE_MARKER`] as their length and the id of the next free
//! page, forming a chain whose head lives in the array's extra header.
//! Record 0 holds the [`TreeHeader`].

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::on_disk_array::OnDiskArray;
use super::page_cache::PageCache;
use super::page_file::{PageCounters, PageFile, PageFileStats, PageId, TreeHeader, HEADER_PAGE};
use crate::constants::{PAGE_FILE_EXTRA_HEADER, PAGE_FILE_MAGIC, PAGE_FILE_VERSION};
use crate::errors::{SpatialError, SpatialResult};

/// Bytes in front of every encoded page.
pub const FRAME_OVERHEAD: usize = 8;

/// Length value marking a freed page.
const FREE_MARKER: u32 = u32::MAX;

/// Smallest page size that still holds a frame and a small node.
const MIN_PAGE_SIZE: usize = 64;

// ============================================================================
// File metadata and page framing
// ============================================================================

/// Allocation state kept in the array's extra header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileMeta {
    version: u32,
    free_list_head: PageId,
    free_page_count: u32,
    /// First page id never handed out.
    next_page: PageId,
}

impl FileMeta {
    fn fresh() -> Self {
        Self {
            version: PAGE_FILE_VERSION,
            free_list_head: 0,
            free_page_count: 0,
            next_page: HEADER_PAGE + 1,
        }
    }

    fn encode(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.free_list_head.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.free_page_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.next_page.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> SpatialResult<Self> {
        if bytes.len() < 16 {
            return Err(SpatialError::InvalidFormat("Page file header is truncated".into()));
        }
        Ok(Self {
            version: read_u32(bytes, 0),
            free_list_head: read_u32(bytes, 4),
            free_page_count: read_u32(bytes, 8),
            next_page: read_u32(bytes, 12),
        })
    }
}

fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

/// CRC32-MPEG2 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C11DB7;
    let mut crc: u32 = 0xFFFFFFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc ^ 0xFFFFFFFF
}

enum Frame<'a> {
    Empty,
    Free { next: PageId },
    Data(&'a [u8]),
}

fn parse_frame(id: PageId, record: &[u8]) -> SpatialResult<Frame<'_>> {
    let checksum = read_u32(record, 0);
    let length = read_u32(record, 4);
    match length {
        0 => Ok(Frame::Empty),
        FREE_MARKER => Ok(Frame::Free {
            next: read_u32(record, FRAME_OVERHEAD),
        }),
        _ => {
            let end = FRAME_OVERHEAD + length as usize;
            if end > record.len() {
                return Err(SpatialError::InvalidFormat(format!(
                    "Page {} claims {} bytes, more than the page holds",
                    id, length
                )));
            }
            let body = &record[FRAME_OVERHEAD..end];
            let actual = crc32(body);
            if actual != checksum {
                return Err(SpatialError::InvalidFormat(format!(
                    "Page {} checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                    id, checksum, actual
                )));
            }
            Ok(Frame::Data(body))
        }
    }
}

fn encode_frame<T: Serialize>(id: PageId, value: &T, page_size: usize) -> SpatialResult<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))?;
    if body.len() + FRAME_OVERHEAD > page_size {
        return Err(SpatialError::InvalidOperation(format!(
            "Page {} needs {} bytes but pages hold {}",
            id,
            body.len() + FRAME_OVERHEAD,
            page_size
        )));
    }
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + body.len());
    frame.extend_from_slice(&crc32(&body).to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn free_frame(next: PageId) -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[4..8].copy_from_slice(&FREE_MARKER.to_le_bytes());
    frame[8..12].copy_from_slice(&next.to_le_bytes());
    frame
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> SpatialResult<T> {
    bincode::serde::decode_from_slice(body, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

// ============================================================================
// Persistent page file
// ============================================================================

struct Inner<P> {
    array: OnDiskArray,
    cache: PageCache<P>,
    meta: FileMeta,
    closed: bool,
}

/// A page file backed by a memory-mapped file with an LRU write-back cache.
pub struct PersistentPageFile<P> {
    inner: Mutex<Inner<P>>,
    page_size: usize,
    counters: PageCounters,
}

impl<P> PersistentPageFile<P>
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    /// Creates a new, empty page file, replacing any file at `path`.
    pub fn create(path: impl AsRef<Path>, page_size: usize, cache_pages: usize) -> SpatialResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(SpatialError::Configuration(format!(
                "Page size of {} bytes is chosen too small (minimum {})",
                page_size, MIN_PAGE_SIZE
            )));
        }
        let mut array = OnDiskArray::create(path, PAGE_FILE_MAGIC, PAGE_FILE_EXTRA_HEADER, page_size, 1)?;
        let meta = FileMeta::fresh();
        array.write_extra_header(&meta.encode())?;
        log::debug!("created page file {:?} with {} byte pages", array.path(), page_size);

        Ok(Self::from_parts(array, meta, page_size, cache_pages))
    }

    /// Opens an existing page file. The page size is read from the file.
    pub fn open(path: impl AsRef<Path>, cache_pages: usize) -> SpatialResult<Self> {
        let path = path.as_ref();
        let page_size = OnDiskArray::peek_record_size(path, PAGE_FILE_MAGIC)?;
        let array = OnDiskArray::open(path, PAGE_FILE_MAGIC, PAGE_FILE_EXTRA_HEADER, page_size)?;
        let meta = FileMeta::decode(array.extra_header())?;
        if meta.version > PAGE_FILE_VERSION {
            return Err(SpatialError::InvalidFormat(format!(
                "Page file version {} is newer than supported version {}",
                meta.version, PAGE_FILE_VERSION
            )));
        }
        if meta.next_page as usize > array.num_records() {
            return Err(SpatialError::InvalidFormat(format!(
                "Page file claims {} pages but holds {}",
                meta.next_page,
                array.num_records()
            )));
        }
        log::debug!(
            "opened page file {:?}: {} pages, {} free",
            path,
            meta.next_page - 1,
            meta.free_page_count
        );

        Ok(Self::from_parts(array, meta, page_size, cache_pages))
    }

    fn from_parts(array: OnDiskArray, meta: FileMeta, page_size: usize, cache_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                array,
                cache: PageCache::new(cache_pages),
                meta,
                closed: false,
            }),
            page_size,
            counters: PageCounters::default(),
        }
    }

    /// Flushes and releases the file. Later calls fail with
    /// [`SpatialError::Closed`].
    pub fn close(&mut self) -> SpatialResult<()> {
        if self.inner.get_mut().closed {
            return Ok(());
        }
        self.flush()?;
        self.inner.get_mut().closed = true;
        Ok(())
    }

    fn check_open(inner: &Inner<P>) -> SpatialResult<()> {
        if inner.closed {
            Err(SpatialError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_data_page(inner: &Inner<P>, id: PageId) -> SpatialResult<()> {
        if id == HEADER_PAGE || id >= inner.meta.next_page {
            return Err(SpatialError::InvalidOperation(format!(
                "Page {} is not a data page of this file",
                id
            )));
        }
        Ok(())
    }

    fn write_back(&self, inner: &mut Inner<P>, id: PageId, page: &P) -> SpatialResult<()> {
        let frame = encode_frame(id, page, self.page_size)?;
        inner.array.write_record(id as usize, &frame)?;
        self.counters.write();
        Ok(())
    }

    fn cache_page(&self, inner: &mut Inner<P>, id: PageId, page: Arc<P>, dirty: bool) -> SpatialResult<()> {
        if let Some(evicted) = inner.cache.insert(id, page, dirty) {
            if evicted.dirty {
                self.write_back(inner, evicted.id, &evicted.page)?;
            }
        }
        Ok(())
    }

    fn store_meta(inner: &mut Inner<P>) -> SpatialResult<()> {
        let encoded = inner.meta.encode();
        inner.array.write_extra_header(&encoded)
    }
}

impl<P> PageFile<P> for PersistentPageFile<P>
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    fn page_size(&self) -> Option<usize> {
        Some(self.page_size)
    }

    fn read_page(&self, id: PageId) -> SpatialResult<Arc<P>> {
        let mut inner = self.inner.lock();
        Self::check_open(&inner)?;
        Self::check_data_page(&inner, id)?;

        if let Some(page) = inner.cache.get(id) {
            self.counters.hit();
            return Ok(page);
        }
        self.counters.miss();
        self.counters.read();

        let page: P = match parse_frame(id, inner.array.record(id as usize)?)? {
            Frame::Data(body) => decode_body(body)?,
            Frame::Empty => {
                return Err(SpatialError::InvalidOperation(format!(
                    "Page {} was allocated but never written",
                    id
                )))
            }
            Frame::Free { .. } => {
                return Err(SpatialError::InvalidOperation(format!("Page {} is free", id)))
            }
        };
        let page = Arc::new(page);
        self.cache_page(&mut inner, id, page.clone(), false)?;
        Ok(page)
    }

    fn write_page(&mut self, id: PageId, page: P) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        Self::check_open(&inner)?;
        Self::check_data_page(&inner, id)?;
        if !inner.cache.contains(id) {
            if let Frame::Free { .. } = parse_frame(id, inner.array.record(id as usize)?)? {
                return Err(SpatialError::InvalidOperation(format!(
                    "Page {} was freed and must be allocated again before writing",
                    id
                )));
            }
        }
        self.cache_page(&mut inner, id, Arc::new(page), true)
    }

    fn allocate_page(&mut self) -> SpatialResult<PageId> {
        let inner = self.inner.get_mut();
        Self::check_open(inner)?;

        let id = if inner.meta.free_list_head != 0 {
            let id = inner.meta.free_list_head;
            let next = match parse_frame(id, inner.array.record(id as usize)?)? {
                Frame::Free { next } => next,
                _ => {
                    return Err(SpatialError::InvalidFormat(format!(
                        "Free list head {} is not a free page",
                        id
                    )))
                }
            };
            inner.array.write_record(id as usize, &[])?;
            inner.meta.free_list_head = next;
            inner.meta.free_page_count = inner.meta.free_page_count.saturating_sub(1);
            id
        } else {
            let id = inner.meta.next_page;
            let needed = id as usize + 1;
            if inner.array.num_records() < needed {
                let grown = needed.max(inner.array.num_records() * 2);
                inner.array.resize(grown)?;
            }
            inner.meta.next_page = id.checked_add(1).ok_or_else(|| {
                SpatialError::InvalidOperation("Page id space exhausted".into())
            })?;
            id
        };
        Self::store_meta(inner)?;
        Ok(id)
    }

    fn free_page(&mut self, id: PageId) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        Self::check_open(inner)?;
        Self::check_data_page(inner, id)?;
        inner.cache.remove(id);
        if let Frame::Free { .. } = parse_frame(id, inner.array.record(id as usize)?)? {
            return Err(SpatialError::InvalidOperation(format!("Page {} freed twice", id)));
        }

        let frame = free_frame(inner.meta.free_list_head);
        inner.array.write_record(id as usize, &frame)?;
        inner.meta.free_list_head = id;
        inner.meta.free_page_count += 1;
        Self::store_meta(inner)
    }

    fn read_header(&self) -> SpatialResult<Option<TreeHeader>> {
        let inner = self.inner.lock();
        Self::check_open(&inner)?;
        match parse_frame(HEADER_PAGE, inner.array.record(HEADER_PAGE as usize)?)? {
            Frame::Data(body) => decode_body(body).map(Some),
            Frame::Empty => Ok(None),
            Frame::Free { .. } => Err(SpatialError::InvalidFormat(
                "Header page is marked free".into(),
            )),
        }
    }

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        let page_size = self.page_size;
        let inner = self.inner.get_mut();
        Self::check_open(inner)?;
        let frame = encode_frame(HEADER_PAGE, header, page_size)?;
        inner.array.write_record(HEADER_PAGE as usize, &frame)
    }

    fn flush(&mut self) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        Self::check_open(&inner)?;
        for (id, page) in inner.cache.dirty_pages() {
            self.write_back(&mut inner, id, &page)?;
            inner.cache.mark_clean(id);
        }
        Self::store_meta(&mut inner)?;
        inner.array.flush()
    }

    fn stats(&self) -> PageFileStats {
        let inner = self.inner.lock();
        let free = inner.meta.free_page_count as u64;
        let allocated = (inner.meta.next_page as u64 - 1).saturating_sub(free);
        self.counters.snapshot(allocated, free)
    }

    fn clear(&mut self) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        Self::check_open(inner)?;
        inner.cache.clear();
        inner.array.resize(1)?;
        inner.array.write_record(HEADER_PAGE as usize, &[])?;
        inner.meta = FileMeta::fresh();
        Self::store_meta(inner)?;
        self.counters.reset();
        Ok(())
    }
}

impl<P> Drop for PersistentPageFile<P> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.closed {
            return;
        }
        let dirty = inner.cache.dirty_pages();
        if !dirty.is_empty() {
            log::warn!(
                "page file {:?} dropped with {} unflushed pages; call flush or close first",
                inner.array.path(),
                dirty.len()
            );
        }
        if let Err(err) = inner.array.flush() {
            log::error!("failed to flush page file on drop: {}", err);
        }
    }
}
