//! Aligned, fixed-size scratch buffers backing materialized contiguous copies.

use crate::{error::Error, result::Result};

/// An exclusively owned, zero-initialized, aligned byte block.
///
/// The size is fixed at creation. The data never moves while the buffer lives,
/// so a view may keep addressing it through the raw pointer returned by
/// [`CopyBuffer::as_mut_ptr`] after the buffer itself has been moved.
pub struct CopyBuffer {
    /// Backing storage, including leading alignment padding.
    inner: Vec<u8>,
    /// Offset of the aligned data within `inner`.
    start: usize,
    len: usize,
    alignment: usize,
}

impl CopyBuffer {
    /// Allocates `len` zeroed bytes aligned to `alignment` (a power of two).
    ///
    /// Fails with `OutOfMemory` instead of aborting when the allocation cannot
    /// be satisfied.
    pub fn try_zeroed(len: usize, alignment: usize) -> Result<CopyBuffer> {
        let alignment = alignment.max(1);
        debug_assert!(alignment.is_power_of_two());

        let oom = || Error::out_of_memory("contiguous copy buffer", len);
        let capacity = len.checked_add(alignment).ok_or_else(oom)?;
        let mut inner = Vec::<u8>::new();
        inner.try_reserve_exact(capacity).map_err(|_| oom())?;

        let p = inner.as_ptr() as usize;
        let start = round_up(p, alignment) - p;
        // Stays within the reserved capacity, so the data does not move.
        inner.resize(start + len, 0);
        Ok(CopyBuffer {
            inner,
            start,
            len,
            alignment,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr().wrapping_add(self.start)
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.inner.as_mut_ptr().wrapping_add(self.start)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner[self.start..]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.inner[self.start..]
    }

    /// Total allocated size in bytes, including alignment padding.
    pub fn heap_size(&self) -> usize {
        self.inner.capacity()
    }
}

impl std::fmt::Debug for CopyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyBuffer")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish_non_exhaustive()
    }
}

#[inline]
fn round_up(n: usize, block_size: usize) -> usize {
    n.div_ceil(block_size) * block_size
}
