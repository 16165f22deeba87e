//! Heap byte storage with a stable address, shareable across threads and writable
//! through raw pointers.

use std::ptr::NonNull;

/// A fixed-size heap allocation handed out to views by raw pointer.
///
/// Unlike `Vec<u8>`, `RawBytes` never hands out references that would alias the
/// writes a view performs, so fixture owners can keep it behind `&self`.
pub struct RawBytes {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: `RawBytes` uniquely owns its allocation; concurrent access is governed
// by the lease protocol of the owner holding it.
unsafe impl Send for RawBytes {}
unsafe impl Sync for RawBytes {}

impl RawBytes {
    pub fn from_vec(data: Vec<u8>) -> RawBytes {
        let len = data.len();
        let ptr = NonNull::from(Box::leak(data.into_boxed_slice())).cast::<u8>();
        RawBytes { ptr, len }
    }

    pub fn zeroed(len: usize) -> RawBytes {
        Self::from_vec(vec![0; len])
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
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Copies the current contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        // SAFETY: the allocation holds `len` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }.to_vec()
    }

    /// Overwrites `bytes.len()` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics when the range does not fit in the allocation.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "write out of range");
        // SAFETY: range checked above; callers do not write while a view is leased.
        unsafe {
            let dst = self.ptr.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len())
        };
    }
}

impl Drop for RawBytes {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: `ptr` and `len` come from the leaked boxed slice in `from_vec`.
        drop(unsafe { Box::from_raw(slice) });
    }
}

impl std::fmt::Debug for RawBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBytes")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_bytes() {
        let raw = RawBytes::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(raw.len(), 4);
        raw.write(1, &[9, 9]);
        assert_eq!(raw.to_vec(), vec![1, 9, 9, 4]);

        let empty = RawBytes::zeroed(0);
        assert!(empty.is_empty());
        assert!(empty.to_vec().is_empty());
    }
}
