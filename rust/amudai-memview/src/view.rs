//! `MemoryView`: a handle exposing the memory of a data owner through its layout.

use std::marker::PhantomData;

use tinyvec::TinyVec;

use crate::{
    contiguity,
    copy::{self, Direction},
    error::Error,
    layout::{Addressing, LayoutDescriptor, Order},
    owner::{AccessMode, Lease, OwnerRef},
    result::Result,
    shadow::{Backing, BackingKind},
};

/// Number of dimensions resolved without a heap allocation.
const INLINE_DIMS: usize = 8;

/// Result of element access: the bytes of one item, or a narrower view.
#[derive(Debug)]
pub enum Item<'a> {
    Bytes(&'a [u8]),
    View(SubView<'a>),
}

impl<'a> Item<'a> {
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Item::Bytes(bytes) => Some(*bytes),
            Item::View(_) => None,
        }
    }

    pub fn into_view(self) -> Option<SubView<'a>> {
        match self {
            Item::Bytes(_) => None,
            Item::View(view) => Some(view),
        }
    }
}

/// A read-only view over part of a [`MemoryView`], borrowed from it.
///
/// Produced by scalar indexing of a view with more than one dimension: the first
/// dimension is fixed and folded into the base address.
pub struct SubView<'a> {
    layout: LayoutDescriptor,
    _parent: PhantomData<&'a [u8]>,
}

impl<'a> SubView<'a> {
    fn new(layout: LayoutDescriptor) -> SubView<'a> {
        SubView {
            layout,
            _parent: PhantomData,
        }
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Multi-index access with the same rules as [`MemoryView::at`]. The result
    /// borrows from the parent view, not from this sub-view.
    pub fn at(&self, index: &[isize]) -> Result<Item<'a>> {
        // SAFETY: the parent view is borrowed for 'a and keeps the memory leased.
        unsafe { resolve_multi(&self.layout, index) }
    }

    /// Scalar access with the same rules as [`MemoryView::get`].
    pub fn get(&self, index: isize) -> Result<Item<'a>> {
        // SAFETY: as in `at`.
        unsafe { resolve_scalar(&self.layout, index) }
    }

    pub fn to_bytes(&self, order: Order) -> Result<Vec<u8>> {
        flatten(&self.layout, order)
    }
}

impl std::fmt::Debug for SubView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubView")
            .field("layout", &self.layout)
            .finish()
    }
}

/// A handle exposing a read-only or read-write window onto memory described by
/// a [`LayoutDescriptor`].
///
/// The view either wraps an owner's memory directly (holding its lease), owns a
/// contiguous copy of it, or owns a shadow copy that is written back into the
/// owner when the view is released. The layout never changes after creation.
///
/// A view is released exactly once: explicitly via [`MemoryView::release`], which
/// reports write-back failures, or implicitly when dropped.
pub struct MemoryView {
    layout: LayoutDescriptor,
    backing: Backing,
}

impl MemoryView {
    pub(crate) fn new(layout: LayoutDescriptor, backing: Backing) -> MemoryView {
        MemoryView { layout, backing }
    }

    /// Creates a view over `owner`'s memory, requesting full read-write access.
    ///
    /// On failure no lease is held.
    pub fn from_owner(owner: &OwnerRef) -> Result<MemoryView> {
        Self::from_owner_with(owner, AccessMode::ReadWrite)
    }

    /// Creates a view over `owner`'s memory with the requested access.
    pub fn from_owner_with(owner: &OwnerRef, access: AccessMode) -> Result<MemoryView> {
        let lease = Lease::acquire(owner, access)?;
        Ok(MemoryView::new(lease.view_layout(), Backing::ZeroCopy(lease)))
    }

    /// Creates a detached view over caller-supplied memory. Releasing it does not
    /// involve any owner.
    ///
    /// # Safety
    ///
    /// Every address reachable through `layout` must stay valid for reads, and for
    /// writes unless the layout is read-only, for as long as the view exists, and
    /// must not be written through any other path meanwhile.
    pub unsafe fn from_layout(layout: LayoutDescriptor) -> MemoryView {
        MemoryView::new(layout, Backing::Detached)
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    #[inline]
    pub fn format(&self) -> &str {
        self.layout.format()
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.layout.item_size()
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    #[inline]
    pub fn strides(&self) -> Option<&[isize]> {
        self.layout.strides()
    }

    #[inline]
    pub fn suboffsets(&self) -> Option<&[Addressing]> {
        self.layout.suboffsets()
    }

    /// Total number of bytes covered by the view's elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    #[inline]
    pub fn read_only(&self) -> bool {
        self.layout.read_only()
    }

    /// Address of the element at index `[0, ..., 0]`.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.layout.base()
    }

    pub fn backing_kind(&self) -> BackingKind {
        self.backing.kind()
    }

    pub fn is_contiguous(&self, order: Order) -> bool {
        contiguity::is_contiguous(&self.layout, order)
    }

    /// Multi-index element access, yielding the bytes of one item.
    ///
    /// `index` needs one component per dimension; a 0-dimensional view accepts only
    /// the empty index. Negative components count from the end of their dimension.
    /// Components outside the shape fail with `OutOfBounds`, an index of the wrong
    /// arity with `InvalidIndex`.
    pub fn at(&self, index: &[isize]) -> Result<Item<'_>> {
        // SAFETY: the result borrows `self`, which keeps the memory valid.
        unsafe { resolve_multi(&self.layout, index) }
    }

    /// Scalar element access along the first dimension.
    ///
    /// On a 1-dimensional view this yields the bytes of one item; on a view with
    /// more dimensions it yields a sub-view over the remaining ones. A negative
    /// index counts from the end. 0-dimensional views reject scalar indices with
    /// `InvalidIndex`.
    pub fn get(&self, index: isize) -> Result<Item<'_>> {
        // SAFETY: as in `at`.
        unsafe { resolve_scalar(&self.layout, index) }
    }

    /// Reads the item at `index` as a plain-old-data value.
    pub fn read_item<T>(&self, index: &[isize]) -> Result<T>
    where
        T: bytemuck::AnyBitPattern,
    {
        if std::mem::size_of::<T>() != self.item_size() {
            return Err(Error::invalid_arg(
                "T",
                format!(
                    "size {} does not match item size {}",
                    std::mem::size_of::<T>(),
                    self.item_size()
                ),
            ));
        }
        match self.at(index)? {
            Item::Bytes(bytes) => Ok(bytemuck::pod_read_unaligned(bytes)),
            Item::View(_) => Err(Error::invalid_index("index does not select a single item")),
        }
    }

    /// Overwrites the item at `index` (one component per dimension) with `value`.
    pub fn set(&mut self, index: &[isize], value: &[u8]) -> Result<()> {
        if self.read_only() {
            return Err(Error::incompatible_access("memory view is read-only"));
        }
        if value.len() != self.item_size() {
            return Err(Error::invalid_arg(
                "value",
                format!(
                    "length {} does not match item size {}",
                    value.len(),
                    self.item_size()
                ),
            ));
        }
        check_arity(&self.layout, index)?;
        let ptr = locate(&self.layout, index)?;
        // SAFETY: the view is writable and exclusively borrowed; `ptr` addresses
        // one item of `item_size` bytes inside the leased memory.
        unsafe { std::ptr::copy_nonoverlapping(value.as_ptr(), ptr, value.len()) };
        Ok(())
    }

    /// The view's bytes as one slice, when they form a gapless direct run in
    /// either order.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if !contiguity::is_contiguous_any(&self.layout) {
            return None;
        }
        if self.layout.is_empty() {
            return Some(&[]);
        }
        // SAFETY: contiguous layouts start at `base` and span `len` bytes, all of
        // which stay valid while `self` is borrowed.
        Some(unsafe { std::slice::from_raw_parts(self.layout.base(), self.layout.len()) })
    }

    /// Mutable counterpart of [`MemoryView::as_bytes`]. Fails with
    /// `IncompatibleAccess` for read-only or non-contiguous views.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        if self.read_only() {
            return Err(Error::incompatible_access("memory view is read-only"));
        }
        if !contiguity::is_contiguous_any(&self.layout) {
            return Err(Error::incompatible_access("memory view is not contiguous"));
        }
        if self.layout.is_empty() {
            return Ok(&mut []);
        }
        // SAFETY: as in `as_bytes`, with the view exclusively borrowed and writable.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.layout.base(), self.layout.len()) })
    }

    /// Copies the view's elements into a new packed buffer in `order`.
    pub fn to_bytes(&self, order: Order) -> Result<Vec<u8>> {
        flatten(&self.layout, order)
    }

    /// Ends the view's lifetime: writes back a shadow copy, then releases any lease
    /// held on the owner.
    pub fn release(mut self) -> Result<()> {
        self.backing.release()
    }
}

impl Drop for MemoryView {
    fn drop(&mut self) {
        if self.backing.is_released() {
            return;
        }
        if let Err(e) = self.backing.release() {
            log::error!("failed to release memory view at {:p}: {e}", self.layout.base());
        }
    }
}

impl std::fmt::Debug for MemoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<memory at {:p}, {:?}, shape {:?}>",
            self.layout.base(),
            self.backing,
            self.layout.shape()
        )
    }
}

/// Resolves a full multi-index against `layout`.
///
/// # Safety
///
/// The caller picks `'a` so that the memory described by `layout` stays valid
/// and unwritten for its duration.
unsafe fn resolve_multi<'a>(layout: &LayoutDescriptor, index: &[isize]) -> Result<Item<'a>> {
    check_arity(layout, index)?;
    let ptr = locate(layout, index)?;
    Ok(Item::Bytes(unsafe { item_bytes(ptr, layout.item_size()) }))
}

/// Resolves a scalar index along the first dimension of `layout`.
///
/// # Safety
///
/// Same as [`resolve_multi`].
unsafe fn resolve_scalar<'a>(layout: &LayoutDescriptor, index: isize) -> Result<Item<'a>> {
    match layout.ndim() {
        0 => Err(Error::invalid_index("invalid indexing of 0-dim memory")),
        1 => unsafe { resolve_multi(layout, &[index]) },
        _ => {
            let i = normalize_index(index, 0, layout.shape()[0])?;
            Ok(Item::View(SubView::new(unsafe { layout.narrow_first(i)? })))
        }
    }
}

fn check_arity(layout: &LayoutDescriptor, index: &[isize]) -> Result<()> {
    if index.len() == layout.ndim() {
        return Ok(());
    }
    if layout.ndim() == 0 {
        return Err(Error::invalid_index("invalid indexing of 0-dim memory"));
    }
    Err(Error::invalid_index(format!(
        "expected {} indices, got {}",
        layout.ndim(),
        index.len()
    )))
}

/// Bounds-checks a full multi-index and returns the address of its element.
fn locate(layout: &LayoutDescriptor, index: &[isize]) -> Result<*mut u8> {
    debug_assert_eq!(index.len(), layout.ndim());
    let mut resolved = TinyVec::<[usize; INLINE_DIMS]>::with_capacity(index.len());
    for (dim, (&i, &extent)) in index.iter().zip(layout.shape()).enumerate() {
        resolved.push(normalize_index(i, dim, extent)?);
    }
    // SAFETY: every component lies within its extent.
    unsafe { layout.element_ptr(&resolved) }
}

/// Applies negative-index wraparound and checks `0 <= index < extent`.
fn normalize_index(index: isize, dim: usize, extent: usize) -> Result<usize> {
    let extent_signed = isize::try_from(extent).unwrap_or(isize::MAX);
    let adjusted = if index < 0 {
        index + extent_signed
    } else {
        index
    };
    if adjusted < 0 || adjusted >= extent_signed {
        return Err(Error::out_of_bounds(index, dim, extent));
    }
    Ok(adjusted as usize)
}

#[inline]
unsafe fn item_bytes<'a>(ptr: *const u8, item_size: usize) -> &'a [u8] {
    unsafe { std::slice::from_raw_parts(ptr, item_size) }
}

fn flatten(layout: &LayoutDescriptor, order: Order) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(layout.len())
        .map_err(|_| Error::out_of_memory("flattened copy", layout.len()))?;
    out.resize(layout.len(), 0);
    // SAFETY: `out` holds `layout.len()` bytes and is distinct from the region.
    unsafe { copy::copy_layout(out.as_mut_ptr(), layout, order, Direction::Gather)? };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn detached(data: &mut [u8], item_size: usize, shape: Vec<usize>) -> MemoryView {
        let layout = LayoutDescriptor::contiguous(data.as_mut_ptr(), item_size, shape).unwrap();
        unsafe { MemoryView::from_layout(layout) }
    }

    #[test]
    fn test_scalar_index_wraparound() {
        let mut data = [10u8, 11, 12, 13, 14];
        let view = detached(&mut data, 1, vec![5]);
        assert_eq!(view.get(-1).unwrap().as_bytes(), Some(&[14u8][..]));
        assert_eq!(view.get(0).unwrap().as_bytes(), Some(&[10u8][..]));
        assert_eq!(view.get(-5).unwrap().as_bytes(), Some(&[10u8][..]));

        for bad in [5, -6, 100] {
            let err = view.get(bad).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::OutOfBounds { index, .. } if *index == bad),
                "{err}"
            );
        }
    }

    #[test]
    fn test_zero_dim_access() {
        let mut data = 0x0102_0304u32.to_ne_bytes();
        let layout = LayoutDescriptor::builder(data.as_mut_ptr(), 4)
            .format("I")
            .build()
            .unwrap();
        let view = unsafe { MemoryView::from_layout(layout) };
        let item = view.at(&[]).unwrap();
        assert_eq!(item.as_bytes(), Some(&0x0102_0304u32.to_ne_bytes()[..]));
        assert_eq!(view.read_item::<u32>(&[]).unwrap(), 0x0102_0304);

        for err in [
            view.get(0).unwrap_err(),
            view.at(&[0]).unwrap_err(),
            view.at(&[0, 0]).unwrap_err(),
        ] {
            assert!(matches!(err.kind(), ErrorKind::InvalidIndex { .. }));
        }
    }

    #[test]
    fn test_multi_index() {
        let mut data: Vec<u8> = (0..12).collect();
        let view = detached(&mut data, 2, vec![2, 3]);
        assert_eq!(view.at(&[1, 2]).unwrap().as_bytes(), Some(&[10u8, 11][..]));
        assert_eq!(view.at(&[-1, -3]).unwrap().as_bytes(), Some(&[6u8, 7][..]));
        assert!(matches!(
            view.at(&[2, 0]).unwrap_err().kind(),
            ErrorKind::OutOfBounds { dim: 0, extent: 2, .. }
        ));
        assert!(matches!(
            view.at(&[0, 3]).unwrap_err().kind(),
            ErrorKind::OutOfBounds { dim: 1, extent: 3, .. }
        ));
        assert!(matches!(
            view.at(&[1]).unwrap_err().kind(),
            ErrorKind::InvalidIndex { .. }
        ));
        assert_eq!(view.read_item::<u16>(&[0, 1]).unwrap(), u16::from_ne_bytes([2, 3]));
        assert!(view.read_item::<u32>(&[0, 1]).is_err());
    }

    #[test]
    fn test_scalar_index_yields_sub_view() {
        let mut data: Vec<u8> = (0..24).collect();
        let view = detached(&mut data, 1, vec![2, 3, 4]);
        let sub = view.get(1).unwrap().into_view().unwrap();
        assert_eq!(sub.shape(), &[3, 4]);
        assert_eq!(sub.len(), 12);
        assert_eq!(sub.at(&[0, 0]).unwrap().as_bytes(), Some(&[12u8][..]));
        assert_eq!(sub.at(&[2, 3]).unwrap().as_bytes(), Some(&[23u8][..]));

        let row = sub.get(-1).unwrap().into_view().unwrap();
        assert_eq!(row.shape(), &[4]);
        assert_eq!(row.to_bytes(Order::RowMajor).unwrap(), vec![20, 21, 22, 23]);
        assert_eq!(row.get(-1).unwrap().as_bytes(), Some(&[23u8][..]));

        assert!(view.get(2).is_err());
        assert!(view.get(-3).is_err());
    }

    #[test]
    fn test_set_and_flat_access() {
        let mut data = vec![0u8; 6];
        let mut view = detached(&mut data, 2, vec![3]);
        view.set(&[-1], &[7, 8]).unwrap();
        view.set(&[0], &[1, 2]).unwrap();
        assert!(view.set(&[0], &[1]).is_err());
        assert!(view.set(&[3], &[1, 2]).is_err());
        assert_eq!(view.as_bytes(), Some(&[1u8, 2, 0, 0, 7, 8][..]));
        view.as_bytes_mut().unwrap()[2] = 5;
        assert_eq!(view.get(1).unwrap().as_bytes(), Some(&[5u8, 0][..]));
        drop(view);
        assert_eq!(data, vec![1, 2, 5, 0, 7, 8]);
    }

    #[test]
    fn test_read_only_detached_view() {
        let mut data = vec![1u8, 2];
        let layout = LayoutDescriptor::builder(data.as_mut_ptr(), 1)
            .shape(vec![2])
            .read_only(true)
            .build()
            .unwrap();
        let mut view = unsafe { MemoryView::from_layout(layout) };
        assert!(matches!(
            view.set(&[0], &[9]).unwrap_err().kind(),
            ErrorKind::IncompatibleAccess { .. }
        ));
        assert!(view.as_bytes_mut().is_err());
        assert_eq!(view.as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_non_contiguous_has_no_flat_bytes() {
        let mut data: Vec<u8> = (0..8).collect();
        let layout = LayoutDescriptor::builder(data.as_mut_ptr(), 1)
            .shape(vec![4])
            .strides(vec![2])
            .build()
            .unwrap();
        let mut view = unsafe { MemoryView::from_layout(layout) };
        assert!(view.as_bytes().is_none());
        assert!(view.as_bytes_mut().is_err());
        assert_eq!(view.to_bytes(Order::RowMajor).unwrap(), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_detached_release() {
        let mut data = [0u8; 4];
        let view = detached(&mut data, 1, vec![4]);
        assert_eq!(view.backing_kind(), BackingKind::Detached);
        assert!(format!("{view:?}").starts_with("<memory at "));
        view.release().unwrap();
    }
}
