//! Constants shared by the page files and trees.

/// Default page size (4KB) for persistent page files
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default cache size in number of pages
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Default node capacity when neither a capacity nor a page size is configured
pub const DEFAULT_CAPACITY: usize = 32;

/// Smallest node capacity a tree accepts
pub const MIN_CAPACITY: usize = 3;

/// Below this capacity trees degenerate and a warning is logged
pub const WARN_CAPACITY: usize = 10;

/// Relative minimum fill of a node (R*-tree paper value)
pub const DEFAULT_MIN_FILL: f64 = 0.4;

/// Share of entries removed for forced reinsertion (R*-tree paper value)
pub const DEFAULT_REINSERT_FRACTION: f64 = 0.3;

/// Magic number of persistent page files
pub const PAGE_FILE_MAGIC: u32 = 0x41524246; // "ARBF"

/// Magic number of upper triangle matrix files
pub const TRIANGLE_MAGIC: u32 = 0x41525554; // "ARUT"

/// Page file format version
pub const PAGE_FILE_VERSION: u32 = 1;

/// Bytes reserved for the page file's own header after the array header
pub const PAGE_FILE_EXTRA_HEADER: usize = 32;

/// Bytes around the entries of an encoded node: page checksum, page length,
/// enum tag and vector length
pub const NODE_OVERHEAD: usize = 4 + 4 + 4 + 8;
