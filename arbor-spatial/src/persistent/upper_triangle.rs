//! Symmetric matrix of fixed-size records on disk.
//!
//! Only the upper triangle `i <= j` is stored, column by column, so record
//! `(i, j)` lives at `j * (j + 1) / 2 + i`. Growing the matrix therefore only
//! appends records and keeps every existing cell in place.

use std::path::Path;

use super::on_disk_array::OnDiskArray;
use crate::constants::TRIANGLE_MAGIC;
use crate::errors::{SpatialError, SpatialResult};

/// Bytes of the matrix's own header inside the array's extra header.
const MATRIX_HEADER: usize = 4;

pub struct OnDiskUpperTriangleMatrix {
    array: OnDiskArray,
    matrix_size: usize,
}

fn triangle_records(matrix_size: usize) -> usize {
    matrix_size * (matrix_size + 1) / 2
}

impl OnDiskUpperTriangleMatrix {
    /// Creates a `matrix_size x matrix_size` matrix with zeroed cells.
    pub fn create(
        path: impl AsRef<Path>,
        extra_header_size: usize,
        record_size: usize,
        matrix_size: usize,
    ) -> SpatialResult<Self> {
        let size_field = u32::try_from(matrix_size).map_err(|_| {
            SpatialError::Configuration(format!("Matrix size {} is too large", matrix_size))
        })?;
        let mut array = OnDiskArray::create(
            path,
            TRIANGLE_MAGIC,
            MATRIX_HEADER + extra_header_size,
            record_size,
            triangle_records(matrix_size),
        )?;
        let mut header = vec![0u8; MATRIX_HEADER + extra_header_size];
        header[..MATRIX_HEADER].copy_from_slice(&size_field.to_le_bytes());
        array.write_extra_header(&header)?;
        Ok(Self { array, matrix_size })
    }

    pub fn open(
        path: impl AsRef<Path>,
        extra_header_size: usize,
        record_size: usize,
    ) -> SpatialResult<Self> {
        let array = OnDiskArray::open(
            path,
            TRIANGLE_MAGIC,
            MATRIX_HEADER + extra_header_size,
            record_size,
        )?;
        let raw = array.extra_header();
        let matrix_size = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if triangle_records(matrix_size) != array.num_records() {
            return Err(SpatialError::InvalidFormat(format!(
                "Matrix of size {} needs {} records, file holds {}",
                matrix_size,
                triangle_records(matrix_size),
                array.num_records()
            )));
        }
        Ok(Self { array, matrix_size })
    }

    pub fn matrix_size(&self) -> usize {
        self.matrix_size
    }

    pub fn record_size(&self) -> usize {
        self.array.record_size()
    }

    /// Cell `(i, j)`; `(j, i)` addresses the same cell.
    pub fn record(&self, i: usize, j: usize) -> SpatialResult<&[u8]> {
        let index = self.index(i, j)?;
        self.array.record(index)
    }

    pub fn write_record(&mut self, i: usize, j: usize, data: &[u8]) -> SpatialResult<()> {
        let index = self.index(i, j)?;
        self.array.write_record(index, data)
    }

    /// Caller-defined header bytes.
    pub fn extra_header(&self) -> &[u8] {
        &self.array.extra_header()[MATRIX_HEADER..]
    }

    pub fn write_extra_header(&mut self, data: &[u8]) -> SpatialResult<()> {
        let mut header = self.array.extra_header().to_vec();
        let available = header.len() - MATRIX_HEADER;
        if data.len() > available {
            return Err(SpatialError::InvalidOperation(format!(
                "Extra header of {} bytes exceeds reserved {}",
                data.len(),
                available
            )));
        }
        header[MATRIX_HEADER..MATRIX_HEADER + data.len()].copy_from_slice(data);
        header[MATRIX_HEADER + data.len()..].fill(0);
        self.array.write_extra_header(&header)
    }

    /// Grows or shrinks the matrix. Cells with both coordinates below the
    /// new size keep their contents.
    pub fn resize_matrix(&mut self, new_size: usize) -> SpatialResult<()> {
        let size_field = u32::try_from(new_size).map_err(|_| {
            SpatialError::Configuration(format!("Matrix size {} is too large", new_size))
        })?;
        let mut header = self.array.extra_header().to_vec();
        header[..MATRIX_HEADER].copy_from_slice(&size_field.to_le_bytes());
        if new_size > self.matrix_size {
            self.array.resize(triangle_records(new_size))?;
            self.array.write_extra_header(&header)?;
        } else {
            self.array.write_extra_header(&header)?;
            self.array.resize(triangle_records(new_size))?;
        }
        self.matrix_size = new_size;
        Ok(())
    }

    pub fn flush(&self) -> SpatialResult<()> {
        self.array.flush()
    }

    pub fn close(self) -> SpatialResult<()> {
        self.array.close()
    }

    fn index(&self, i: usize, j: usize) -> SpatialResult<usize> {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        if hi >= self.matrix_size {
            return Err(SpatialError::InvalidOperation(format!(
                "Cell ({}, {}) outside matrix of size {}",
                i, j, self.matrix_size
            )));
        }
        Ok(hi * (hi + 1) / 2 + lo)
    }
}
