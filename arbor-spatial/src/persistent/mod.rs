//! Node storage: page files in memory or on disk.
//!
//! - [`MemoryPageFile`]: pages on the heap
//! - [`PersistentPageFile`]: pages in a memory-mapped [`OnDiskArray`],
//!   checksummed, with an LRU write-back [`PageCache`] and a free list
//! - [`OnDiskUpperTriangleMatrix`]: symmetric record matrix on disk

mod on_disk_array;
mod page_cache;
mod page_file;
mod persistent_page_file;
mod upper_triangle;

pub use on_disk_array::OnDiskArray;
pub use page_cache::{Evicted, PageCache};
pub use page_file::{MemoryPageFile, PageFile, PageFileStats, PageId, TreeHeader, HEADER_PAGE};
pub use persistent_page_file::{crc32, PersistentPageFile, FRAME_OVERHEAD};
pub use upper_triangle::OnDiskUpperTriangleMatrix;
