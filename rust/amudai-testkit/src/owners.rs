//! Fixture data owners implementing [`BufferOwner`].

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use amudai_memview::{
    AccessMode, Addressing, BufferOwner, Error, LayoutDescriptor, OwnerRef, Result,
};

use crate::raw::RawBytes;

/// Counts the leases an owner hands out and gets back, and enforces that a
/// writable lease never coexists with any other lease.
#[derive(Debug, Default)]
pub struct LeaseCounters {
    describes: AtomicUsize,
    releases: AtomicUsize,
    outstanding: Mutex<Outstanding>,
}

#[derive(Debug, Default)]
struct Outstanding {
    readers: usize,
    writer: bool,
}

impl LeaseCounters {
    pub fn describes(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Leases currently outstanding.
    pub fn active(&self) -> usize {
        self.describes() - self.releases()
    }

    /// Whether a writable lease is currently outstanding.
    pub fn has_writer(&self) -> bool {
        self.lock().writer
    }

    /// Admits a new lease over `layout`, failing with `IncompatibleAccess` when it
    /// would share the memory with a writable lease.
    fn grant(&self, layout: &LayoutDescriptor) -> Result<()> {
        let mut outstanding = self.lock();
        if outstanding.writer {
            return Err(Error::incompatible_access("memory is leased for writing"));
        }
        if layout.read_only() {
            outstanding.readers += 1;
        } else if outstanding.readers > 0 {
            return Err(Error::incompatible_access(format!(
                "memory is leased by {} readers",
                outstanding.readers
            )));
        } else {
            outstanding.writer = true;
        }
        self.describes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn revoke(&self, layout: &LayoutDescriptor) {
        let mut outstanding = self.lock();
        if layout.read_only() {
            assert!(outstanding.readers > 0, "release of an unknown read lease");
            outstanding.readers -= 1;
        } else {
            assert!(outstanding.writer, "release of an unknown write lease");
            outstanding.writer = false;
        }
        let prev = self.releases.fetch_add(1, Ordering::SeqCst);
        assert!(
            prev < self.describes(),
            "release without a matching describe"
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Outstanding> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// An owner exposing a flat byte store through a shape and optional strides.
///
/// With explicit strides the store may contain gaps, or be traversed backwards
/// from `offset`. `ReadOnly` requests get read-only layouts and may overlap; a
/// writable lease excludes every other lease.
#[derive(Debug)]
pub struct StridedOwner {
    data: RawBytes,
    offset: usize,
    item_size: usize,
    shape: Vec<usize>,
    strides: Option<Vec<isize>>,
    read_only: bool,
    format: String,
    counters: LeaseCounters,
}

impl StridedOwner {
    /// A tightly packed row-major owner.
    pub fn contiguous(data: Vec<u8>, item_size: usize, shape: Vec<usize>) -> StridedOwner {
        Self::new(data, item_size, shape, None, 0)
    }

    /// An owner whose element `[0, ..., 0]` sits at byte `offset` of `data`.
    ///
    /// # Panics
    ///
    /// Panics when some element would fall outside `data`.
    pub fn strided(
        data: Vec<u8>,
        item_size: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
        offset: usize,
    ) -> StridedOwner {
        assert_eq!(shape.len(), strides.len());
        Self::new(data, item_size, shape, Some(strides), offset)
    }

    fn new(
        data: Vec<u8>,
        item_size: usize,
        shape: Vec<usize>,
        strides: Option<Vec<isize>>,
        offset: usize,
    ) -> StridedOwner {
        if let Some((lo, hi)) = byte_span(&shape, strides.as_deref(), item_size) {
            let start = offset as isize + lo;
            let end = offset as isize + hi;
            assert!(
                start >= 0 && end <= data.len() as isize,
                "elements span [{start}, {end}) outside a {} byte store",
                data.len()
            );
        }
        StridedOwner {
            data: RawBytes::from_vec(data),
            offset,
            item_size,
            shape,
            strides,
            read_only: false,
            format: "B".to_string(),
            counters: LeaseCounters::default(),
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> StridedOwner {
        self.read_only = read_only;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> StridedOwner {
        self.format = format.into();
        self
    }

    /// The owner's full backing store, gaps included.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Address of element `[0, ..., 0]`.
    pub fn base(&self) -> *const u8 {
        self.data.as_mut_ptr().wrapping_add(self.offset)
    }

    pub fn counters(&self) -> &LeaseCounters {
        &self.counters
    }

    pub fn into_ref(self) -> (Arc<StridedOwner>, OwnerRef) {
        let owner = Arc::new(self);
        let handle: OwnerRef = owner.clone();
        (owner, handle)
    }
}

// SAFETY: the store never moves or changes size, and nothing writes it while
// leased.
unsafe impl BufferOwner for StridedOwner {
    fn describe(&self, access: AccessMode) -> Result<LayoutDescriptor> {
        let base = self.data.as_mut_ptr().wrapping_add(self.offset);
        let mut builder = LayoutDescriptor::builder(base, self.item_size)
            .shape(self.shape.clone())
            .read_only(self.read_only || access == AccessMode::ReadOnly)
            .format(self.format.clone());
        if let Some(strides) = &self.strides {
            builder = builder.strides(strides.clone());
        }
        let layout = builder.build()?;
        self.counters.grant(&layout)?;
        Ok(layout)
    }

    fn release(&self, layout: &LayoutDescriptor) {
        self.counters.revoke(layout);
    }
}

/// A two-dimensional owner whose rows live in separate allocations, reached
/// through a table of row pointers.
///
/// Each row starts with a `header` of bytes that are not part of the data; the
/// first dimension's suboffset skips it.
#[derive(Debug)]
pub struct IndirectOwner {
    table: RawBytes,
    rows: Vec<RawBytes>,
    header: usize,
    item_size: usize,
    cols: usize,
    counters: LeaseCounters,
}

impl IndirectOwner {
    /// Builds an owner from `rows`, each holding `cols` items of `item_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics when a row has the wrong length.
    pub fn new(rows: Vec<Vec<u8>>, item_size: usize, cols: usize, header: usize) -> IndirectOwner {
        let rows: Vec<RawBytes> = rows
            .into_iter()
            .map(|row| {
                assert_eq!(row.len(), cols * item_size, "row length");
                let mut stored = vec![0xEE; header];
                stored.extend_from_slice(&row);
                RawBytes::from_vec(stored)
            })
            .collect();
        let table: Vec<u8> = rows
            .iter()
            .flat_map(|row| (row.as_mut_ptr() as usize).to_ne_bytes())
            .collect();
        IndirectOwner {
            table: RawBytes::from_vec(table),
            rows,
            header,
            item_size,
            cols,
            counters: LeaseCounters::default(),
        }
    }

    /// The data bytes of every row, headers excluded.
    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.rows
            .iter()
            .map(|row| row.to_vec().split_off(self.header))
            .collect()
    }

    /// Replaces the table entry of `row` with a null pointer.
    ///
    /// # Panics
    ///
    /// Panics when `row` is out of range or the owner is currently leased.
    pub fn clear_row_pointer(&self, row: usize) {
        assert_eq!(self.counters.active(), 0, "owner is leased");
        let width = std::mem::size_of::<usize>();
        self.table.write(row * width, &0usize.to_ne_bytes());
    }

    /// The headers are never part of a view; they must survive write-back.
    pub fn headers_intact(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.to_vec()[..self.header].iter().all(|&b| b == 0xEE))
    }

    pub fn counters(&self) -> &LeaseCounters {
        &self.counters
    }

    pub fn into_ref(self) -> (Arc<IndirectOwner>, OwnerRef) {
        let owner = Arc::new(self);
        let handle: OwnerRef = owner.clone();
        (owner, handle)
    }
}

// SAFETY: the table and the rows never move, and nothing writes them while leased.
unsafe impl BufferOwner for IndirectOwner {
    fn describe(&self, access: AccessMode) -> Result<LayoutDescriptor> {
        let layout = LayoutDescriptor::builder(self.table.as_mut_ptr(), self.item_size)
            .shape(vec![self.rows.len(), self.cols])
            .strides(vec![
                std::mem::size_of::<usize>() as isize,
                self.item_size as isize,
            ])
            .suboffsets(vec![Addressing::Indirect(self.header), Addressing::Direct])
            .read_only(access == AccessMode::ReadOnly)
            .build()?;
        self.counters.grant(&layout)?;
        Ok(layout)
    }

    fn release(&self, layout: &LayoutDescriptor) {
        self.counters.revoke(layout);
    }
}

/// An object that does not support buffer leases.
#[derive(Debug, Default)]
pub struct OpaqueOwner;

// SAFETY: never hands out a layout.
unsafe impl BufferOwner for OpaqueOwner {
    fn is_describable(&self) -> bool {
        false
    }

    fn describe(&self, _access: AccessMode) -> Result<LayoutDescriptor> {
        Err(Error::not_describable("opaque object"))
    }

    fn release(&self, _layout: &LayoutDescriptor) {
        unreachable!("opaque owners never grant a lease");
    }
}

/// Byte range `[lo, hi)` touched by the elements, relative to element `[0, ..., 0]`.
/// `None` for empty shapes.
fn byte_span(
    shape: &[usize],
    strides: Option<&[isize]>,
    item_size: usize,
) -> Option<(isize, isize)> {
    if shape.contains(&0) {
        return None;
    }
    let default;
    let strides: &[isize] = match strides {
        Some(strides) => strides,
        None => {
            default = amudai_memview::layout::packed_strides(
                shape,
                item_size,
                amudai_memview::Order::RowMajor,
            );
            &default
        }
    };
    let (mut lo, mut hi) = (0isize, item_size as isize);
    for (&extent, &stride) in shape.iter().zip(strides) {
        let reach = stride * (extent as isize - 1);
        if reach < 0 {
            lo += reach;
        } else {
            hi += reach;
        }
    }
    Some((lo, hi))
}
