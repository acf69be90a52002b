//! Memory-mapped array of fixed-size records.
//!
//! File layout (all integers little endian `u32`):
//!
//! ```text
//! 0  magic
//! 4  header size (16 + extra header)
//! 8  record size
//! 12 record count
//! 16 extra header bytes
//! .. records
//! ```
//!
//! Resizing only appends or truncates at the end. The record count in the
//! header never claims more records than the file holds: when growing the
//! file is extended before the count is written, when shrinking the count
//! is written before the file is cut.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::errors::{SpatialError, SpatialResult};

const INTERNAL_HEADER_SIZE: usize = 16;
const POS_MAGIC: usize = 0;
const POS_HEADER_SIZE: usize = 4;
const POS_RECORD_SIZE: usize = 8;
const POS_NUM_RECORDS: usize = 12;

pub struct OnDiskArray {
    file: File,
    map: MmapMut,
    path: PathBuf,
    header_size: usize,
    record_size: usize,
    num_records: usize,
}

impl OnDiskArray {
    /// Creates (or truncates) a file holding `initial_records` zeroed records.
    pub fn create(
        path: impl AsRef<Path>,
        magic: u32,
        extra_header_size: usize,
        record_size: usize,
        initial_records: usize,
    ) -> SpatialResult<Self> {
        if record_size == 0 {
            return Err(SpatialError::Configuration(
                "Record size must be positive".into(),
            ));
        }
        let path = path.as_ref().to_path_buf();
        let header_size = INTERNAL_HEADER_SIZE + extra_header_size;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len((header_size + record_size * initial_records) as u64)?;

        // SAFETY: the file is owned by this value and only resized through it
        let map = unsafe { MmapMut::map_mut(&file)? };
        let mut array = Self {
            file,
            map,
            path,
            header_size,
            record_size,
            num_records: initial_records,
        };
        array.put_u32(POS_MAGIC, magic);
        array.put_u32(POS_HEADER_SIZE, header_size as u32);
        array.put_u32(POS_RECORD_SIZE, record_size as u32);
        array.put_u32(POS_NUM_RECORDS, initial_records as u32);
        array.map.flush()?;

        log::debug!(
            "created on-disk array {:?} ({} records of {} bytes)",
            array.path,
            initial_records,
            record_size
        );
        Ok(array)
    }

    /// Opens an existing file, validating its header against the expected
    /// layout.
    pub fn open(
        path: impl AsRef<Path>,
        magic: u32,
        extra_header_size: usize,
        record_size: usize,
    ) -> SpatialResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < INTERNAL_HEADER_SIZE {
            return Err(SpatialError::InvalidFormat(format!(
                "{:?} is too short to hold a header",
                path
            )));
        }

        // SAFETY: see `create`
        let map = unsafe { MmapMut::map_mut(&file)? };
        let header_size = INTERNAL_HEADER_SIZE + extra_header_size;
        let mut array = Self {
            file,
            map,
            path,
            header_size,
            record_size,
            num_records: 0,
        };

        if array.get_u32(POS_MAGIC) != magic {
            return Err(SpatialError::InvalidFormat("Magic number does not match".into()));
        }
        if array.get_u32(POS_HEADER_SIZE) as usize != header_size {
            return Err(SpatialError::InvalidFormat(format!(
                "Header size {} does not match expected {}",
                array.get_u32(POS_HEADER_SIZE),
                header_size
            )));
        }
        if array.get_u32(POS_RECORD_SIZE) as usize != record_size {
            return Err(SpatialError::InvalidFormat(format!(
                "Record size {} does not match expected {}",
                array.get_u32(POS_RECORD_SIZE),
                record_size
            )));
        }
        let num_records = array.get_u32(POS_NUM_RECORDS) as usize;
        if file_len < header_size + num_records * record_size {
            return Err(SpatialError::InvalidFormat(format!(
                "File holds fewer than the {} records its header claims",
                num_records
            )));
        }
        array.num_records = num_records;
        Ok(array)
    }

    /// Reads the record size stored in a file header without opening it
    /// fully, so callers can discover the page size of an existing file.
    pub fn peek_record_size(path: impl AsRef<Path>, magic: u32) -> SpatialResult<usize> {
        use std::io::Read;
        let mut file = File::open(path.as_ref())?;
        let mut header = [0u8; INTERNAL_HEADER_SIZE];
        file.read_exact(&mut header)?;
        let read = |pos: usize| u32::from_le_bytes([header[pos], header[pos + 1], header[pos + 2], header[pos + 3]]);
        if read(POS_MAGIC) != magic {
            return Err(SpatialError::InvalidFormat("Magic number does not match".into()));
        }
        Ok(read(POS_RECORD_SIZE) as usize)
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The bytes of record `index`.
    pub fn record(&self, index: usize) -> SpatialResult<&[u8]> {
        let offset = self.record_offset(index)?;
        Ok(&self.map[offset..offset + self.record_size])
    }

    /// Overwrites record `index`; shorter data is zero padded.
    pub fn write_record(&mut self, index: usize, data: &[u8]) -> SpatialResult<()> {
        if data.len() > self.record_size {
            return Err(SpatialError::InvalidOperation(format!(
                "Record of {} bytes exceeds record size {}",
                data.len(),
                self.record_size
            )));
        }
        let offset = self.record_offset(index)?;
        let slot = &mut self.map[offset..offset + self.record_size];
        slot[..data.len()].copy_from_slice(data);
        slot[data.len()..].fill(0);
        Ok(())
    }

    pub fn extra_header(&self) -> &[u8] {
        &self.map[INTERNAL_HEADER_SIZE..self.header_size]
    }

    pub fn write_extra_header(&mut self, data: &[u8]) -> SpatialResult<()> {
        let capacity = self.header_size - INTERNAL_HEADER_SIZE;
        if data.len() > capacity {
            return Err(SpatialError::InvalidOperation(format!(
                "Extra header of {} bytes exceeds reserved {}",
                data.len(),
                capacity
            )));
        }
        let slot = &mut self.map[INTERNAL_HEADER_SIZE..self.header_size];
        slot[..data.len()].copy_from_slice(data);
        slot[data.len()..].fill(0);
        Ok(())
    }

    /// Changes the number of records, keeping the contents of the records
    /// that survive.
    pub fn resize(&mut self, new_records: usize) -> SpatialResult<()> {
        if new_records == self.num_records {
            return Ok(());
        }
        let new_len = (self.header_size + new_records * self.record_size) as u64;
        if new_records > self.num_records {
            self.map.flush()?;
            self.file.set_len(new_len)?;
            self.remap()?;
            self.put_u32(POS_NUM_RECORDS, new_records as u32);
            self.map.flush_range(0, INTERNAL_HEADER_SIZE)?;
        } else {
            self.put_u32(POS_NUM_RECORDS, new_records as u32);
            self.map.flush()?;
            self.file.set_len(new_len)?;
            self.remap()?;
        }
        self.num_records = new_records;
        Ok(())
    }

    pub fn flush(&self) -> SpatialResult<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Flushes and releases the file.
    pub fn close(self) -> SpatialResult<()> {
        self.map.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn remap(&mut self) -> SpatialResult<()> {
        // SAFETY: see `create`
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    fn record_offset(&self, index: usize) -> SpatialResult<usize> {
        if index >= self.num_records {
            return Err(SpatialError::InvalidOperation(format!(
                "Record {} out of range (0..{})",
                index, self.num_records
            )));
        }
        Ok(self.header_size + index * self.record_size)
    }

    fn get_u32(&self, pos: usize) -> u32 {
        u32::from_le_bytes([
            self.map[pos],
            self.map[pos + 1],
            self.map[pos + 2],
            self.map[pos + 3],
        ])
    }

    fn put_u32(&mut self, pos: usize, value: u32) {
        self.map[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }
}
