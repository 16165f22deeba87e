//! Layout descriptors: the shape, strides and indirection of a leased memory region.
//!
//! A [`LayoutDescriptor`] is captured once, when an owner grants a lease, and is never
//! mutated afterwards. Views narrow or repack a descriptor by building a new one.

use std::borrow::Cow;

use crate::{error::Error, result::Result, verify_layout};

/// Element format used when an owner does not specify one (unsigned bytes).
pub const DEFAULT_FORMAT: &str = "B";

/// Element order used when linearizing a multi-dimensional region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    /// Row-major ("C"): the last dimension varies fastest.
    RowMajor,
    /// Column-major ("Fortran"): the first dimension varies fastest.
    ColumnMajor,
}

impl Order {
    /// Parses the conventional single-character order tag (`'C'` or `'F'`).
    pub fn from_char(c: char) -> Option<Order> {
        match c {
            'C' | 'c' => Some(Order::RowMajor),
            'F' | 'f' => Some(Order::ColumnMajor),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Order::RowMajor => 'C',
            Order::ColumnMajor => 'F',
        }
    }
}

/// How the next dimension is reached from the running address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Addressing {
    /// Plain stride arithmetic.
    #[default]
    Direct,
    /// The running address holds a pointer: follow it, then add the offset.
    Indirect(usize),
}

impl Addressing {
    /// Converts a signed suboffset, where any negative value means direct addressing.
    pub fn from_suboffset(suboffset: isize) -> Addressing {
        if suboffset < 0 {
            Addressing::Direct
        } else {
            Addressing::Indirect(suboffset as usize)
        }
    }

    /// Signed suboffset representation (`-1` for direct addressing).
    pub fn suboffset(self) -> isize {
        match self {
            Addressing::Direct => -1,
            Addressing::Indirect(offset) => offset as isize,
        }
    }

    #[inline]
    pub fn is_indirect(self) -> bool {
        matches!(self, Addressing::Indirect(_))
    }
}

/// Immutable description of a memory region.
///
/// `base` is the address of the element at index `[0, 0, ..., 0]`. The descriptor
/// itself does not own or borrow the memory; validity is guaranteed by whoever
/// granted the lease (see [`crate::owner::BufferOwner`]).
#[derive(Debug, Clone)]
pub struct LayoutDescriptor {
    base: *mut u8,
    len: usize,
    item_size: usize,
    shape: Vec<usize>,
    strides: Option<Vec<isize>>,
    /// `Some` only when at least one dimension is indirect.
    suboffsets: Option<Vec<Addressing>>,
    read_only: bool,
    format: String,
}

impl LayoutDescriptor {
    /// Starts building a descriptor for a region at `base` holding items of
    /// `item_size` bytes. Without further configuration this describes a
    /// single scalar.
    pub fn builder(base: *mut u8, item_size: usize) -> LayoutBuilder {
        LayoutBuilder {
            base,
            item_size,
            shape: Vec::new(),
            strides: None,
            suboffsets: None,
            len: None,
            read_only: false,
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    /// Describes a tightly packed row-major region with default strides.
    pub fn contiguous(base: *mut u8, item_size: usize, shape: Vec<usize>) -> Result<Self> {
        Self::builder(base, item_size).shape(shape).build()
    }

    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Total number of bytes spanned by the elements (`item_size * product(shape)`).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Explicit strides, or `None` when the region uses default row-major strides.
    #[inline]
    pub fn strides(&self) -> Option<&[isize]> {
        self.strides.as_deref()
    }

    /// Strides in effect, computing the row-major defaults when none were given.
    pub fn strides_or_default(&self) -> Cow<'_, [isize]> {
        match &self.strides {
            Some(strides) => Cow::Borrowed(strides),
            None => Cow::Owned(self.default_strides(Order::RowMajor)),
        }
    }

    /// Tightly packed strides for this shape and item size in the given order.
    pub fn default_strides(&self, order: Order) -> Vec<isize> {
        packed_strides(&self.shape, self.item_size, order)
    }

    /// Per-dimension addressing, or `None` when every dimension is direct.
    #[inline]
    pub fn suboffsets(&self) -> Option<&[Addressing]> {
        self.suboffsets.as_deref()
    }

    /// Addressing of dimension `dim`.
    #[inline]
    pub fn addressing(&self, dim: usize) -> Addressing {
        self.suboffsets
            .as_ref()
            .map_or(Addressing::Direct, |s| s[dim])
    }

    #[inline]
    pub fn is_indirect(&self) -> bool {
        self.suboffsets.is_some()
    }

    #[inline]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Number of elements (`product(shape)`, `1` for a scalar).
    #[inline]
    pub fn item_count(&self) -> usize {
        self.len / self.item_size
    }

    /// The same descriptor with writes disallowed.
    pub(crate) fn to_read_only(&self) -> LayoutDescriptor {
        LayoutDescriptor {
            read_only: true,
            ..self.clone()
        }
    }

    /// A descriptor for the same elements packed at `base` in `order`, with direct
    /// addressing throughout.
    pub(crate) fn packed(&self, base: *mut u8, order: Order, read_only: bool) -> LayoutDescriptor {
        LayoutDescriptor {
            base,
            len: self.len,
            item_size: self.item_size,
            shape: self.shape.clone(),
            strides: Some(self.default_strides(order)),
            suboffsets: None,
            read_only,
            format: self.format.clone(),
        }
    }

    /// Resolves a full multi-index to the address of its element.
    ///
    /// Fails with `InvalidLayout` when an indirect dimension holds a null pointer.
    ///
    /// # Safety
    ///
    /// `index` must have `ndim` components, each within its extent, and every
    /// pointer table reached through an indirect dimension must be readable.
    pub(crate) unsafe fn element_ptr(&self, index: &[usize]) -> Result<*mut u8> {
        unsafe { self.element_ptr_with(&self.strides_or_default(), index) }
    }

    /// [`Self::element_ptr`] with the strides in effect supplied by the caller, for
    /// loops resolving many indices.
    ///
    /// # Safety
    ///
    /// As for [`Self::element_ptr`]; `strides` must be this layout's strides.
    pub(crate) unsafe fn element_ptr_with(
        &self,
        strides: &[isize],
        index: &[usize],
    ) -> Result<*mut u8> {
        debug_assert_eq!(index.len(), self.ndim());
        debug_assert_eq!(strides.len(), self.ndim());
        let mut ptr = self.base;
        for (dim, (&i, &stride)) in index.iter().zip(strides).enumerate() {
            ptr = ptr.wrapping_offset(stride * i as isize);
            if let Addressing::Indirect(suboffset) = self.addressing(dim) {
                ptr = unsafe { follow(ptr, suboffset, dim)? };
            }
        }
        Ok(ptr)
    }

    /// Narrows the first dimension to `index`, folding it into the base address.
    ///
    /// Fails with `InvalidLayout` when an indirect first dimension holds a null
    /// pointer at `index`.
    ///
    /// # Safety
    ///
    /// `ndim` must be at least 1, `index` must be below `shape[0]`, and when the
    /// first dimension is indirect its pointer table must be readable.
    pub(crate) unsafe fn narrow_first(&self, index: usize) -> Result<LayoutDescriptor> {
        debug_assert!(self.ndim() >= 1 && index < self.shape[0]);
        let strides = self.strides_or_default();
        let mut base = self.base.wrapping_offset(strides[0] * index as isize);
        if let Addressing::Indirect(suboffset) = self.addressing(0) {
            base = unsafe { follow(base, suboffset, 0)? };
        }
        let shape = self.shape[1..].to_vec();
        let item_count: usize = shape.iter().product();
        Ok(LayoutDescriptor {
            base,
            len: item_count * self.item_size,
            item_size: self.item_size,
            shape,
            strides: self.strides.as_ref().map(|s| s[1..].to_vec()),
            suboffsets: self
                .suboffsets
                .as_ref()
                .and_then(|s| normalize_suboffsets(s[1..].to_vec())),
            read_only: self.read_only,
            format: self.format.clone(),
        })
    }
}

/// Builder for [`LayoutDescriptor`]; [`LayoutBuilder::build`] validates the result.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    base: *mut u8,
    item_size: usize,
    shape: Vec<usize>,
    strides: Option<Vec<isize>>,
    suboffsets: Option<Vec<Addressing>>,
    len: Option<usize>,
    read_only: bool,
    format: String,
}

impl LayoutBuilder {
    pub fn shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    pub fn strides(mut self, strides: Vec<isize>) -> Self {
        self.strides = Some(strides);
        self
    }

    pub fn suboffsets(mut self, suboffsets: Vec<Addressing>) -> Self {
        self.suboffsets = Some(suboffsets);
        self
    }

    /// Declares the total length; `build` rejects it unless it equals
    /// `item_size * product(shape)`.
    pub fn len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn build(self) -> Result<LayoutDescriptor> {
        verify_layout!(item_size, self.item_size > 0);
        let ndim = self.shape.len();
        if let Some(strides) = &self.strides {
            verify_layout!(strides, strides.len() == ndim);
        }
        if let Some(suboffsets) = &self.suboffsets {
            verify_layout!(suboffsets, suboffsets.len() == ndim);
        }

        let computed = self
            .shape
            .iter()
            .try_fold(self.item_size, |acc, &extent| acc.checked_mul(extent));
        verify_layout!(len, computed.is_some());
        let len = computed.unwrap_or_default();
        verify_layout!(len, len <= isize::MAX as usize);
        if let Some(declared) = self.len {
            verify_layout!(len, declared == len);
        }

        Ok(LayoutDescriptor {
            base: self.base,
            len,
            item_size: self.item_size,
            shape: self.shape,
            strides: self.strides,
            suboffsets: self.suboffsets.and_then(normalize_suboffsets),
            read_only: self.read_only,
            format: self.format,
        })
    }
}

/// Tightly packed strides for `shape` in the given order.
pub fn packed_strides(shape: &[usize], item_size: usize, order: Order) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut stride = item_size;
    let mut assign = |dim: usize| {
        strides[dim] = stride as isize;
        stride = stride.saturating_mul(shape[dim]);
    };
    match order {
        Order::RowMajor => (0..shape.len()).rev().for_each(&mut assign),
        Order::ColumnMajor => (0..shape.len()).for_each(&mut assign),
    }
    strides
}

fn normalize_suboffsets(suboffsets: Vec<Addressing>) -> Option<Vec<Addressing>> {
    suboffsets
        .iter()
        .any(|a| a.is_indirect())
        .then_some(suboffsets)
}

/// Reads the pointer stored at `ptr` for indirect dimension `dim` and offsets it
/// by `suboffset`.
///
/// # Safety
///
/// `ptr` must be valid for reading a pointer (no alignment requirement).
#[inline]
unsafe fn follow(ptr: *mut u8, suboffset: usize, dim: usize) -> Result<*mut u8> {
    let target = unsafe { ptr.cast::<*mut u8>().read_unaligned() };
    if target.is_null() {
        return Err(Error::invalid_layout(format!(
            "null pointer in indirect dimension {dim}"
        )));
    }
    Ok(target.wrapping_add(suboffset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_scalar_layout() {
        let mut value = 7u32;
        let layout = LayoutDescriptor::builder((&mut value as *mut u32).cast(), 4)
            .format("I")
            .build()
            .unwrap();
        assert_eq!(layout.ndim(), 0);
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.item_count(), 1);
        assert_eq!(layout.format(), "I");
        assert!(layout.strides().is_none());
        assert!(layout.strides_or_default().is_empty());
    }

    #[test]
    fn test_build_rejects_bad_layouts() {
        let base = std::ptr::null_mut();
        let err = LayoutDescriptor::builder(base, 0).build().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLayout { .. }));

        let err = LayoutDescriptor::builder(base, 1)
            .shape(vec![2, 3])
            .strides(vec![3])
            .build()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLayout { .. }));

        let err = LayoutDescriptor::builder(base, 2)
            .shape(vec![2, 3])
            .len(6)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared == len"));

        let err = LayoutDescriptor::builder(base, 8)
            .shape(vec![usize::MAX, 2])
            .build()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLayout { .. }));
    }

    #[test]
    fn test_packed_strides() {
        assert_eq!(packed_strides(&[2, 3, 4], 8, Order::RowMajor), vec![96, 32, 8]);
        assert_eq!(
            packed_strides(&[2, 3, 4], 8, Order::ColumnMajor),
            vec![8, 16, 48]
        );
        assert!(packed_strides(&[], 8, Order::RowMajor).is_empty());
    }

    #[test]
    fn test_direct_suboffsets_are_dropped() {
        let layout = LayoutDescriptor::builder(std::ptr::null_mut(), 1)
            .shape(vec![2, 2])
            .suboffsets(vec![Addressing::from_suboffset(-1), Addressing::Direct])
            .build()
            .unwrap();
        assert!(layout.suboffsets().is_none());
        assert!(!layout.is_indirect());
    }

    #[test]
    fn test_addressing_suboffset_conversion() {
        assert_eq!(Addressing::from_suboffset(-5), Addressing::Direct);
        assert_eq!(Addressing::from_suboffset(3), Addressing::Indirect(3));
        assert_eq!(Addressing::Indirect(3).suboffset(), 3);
        assert_eq!(Addressing::Direct.suboffset(), -1);
    }

    #[test]
    fn test_element_ptr_direct() {
        let mut data: Vec<u8> = (0..24).collect();
        let layout = LayoutDescriptor::contiguous(data.as_mut_ptr(), 2, vec![3, 4]).unwrap();
        let p = unsafe { layout.element_ptr(&[2, 1]) }.unwrap();
        assert_eq!(unsafe { *p }, 2 * 8 + 2);
    }

    #[test]
    fn test_element_ptr_indirect() {
        let mut row0 = [0u8, 0, 10, 11, 12];
        let mut row1 = [0u8, 0, 20, 21, 22];
        let mut table = [row0.as_mut_ptr(), row1.as_mut_ptr()];
        let layout = LayoutDescriptor::builder(table.as_mut_ptr().cast(), 1)
            .shape(vec![2, 3])
            .strides(vec![std::mem::size_of::<*mut u8>() as isize, 1])
            .suboffsets(vec![Addressing::Indirect(2), Addressing::Direct])
            .build()
            .unwrap();
        assert!(layout.is_indirect());
        assert_eq!(unsafe { *layout.element_ptr(&[0, 0]).unwrap() }, 10);
        assert_eq!(unsafe { *layout.element_ptr(&[1, 2]).unwrap() }, 22);

        let row = unsafe { layout.narrow_first(1) }.unwrap();
        assert_eq!(row.shape(), &[3]);
        assert_eq!(row.len(), 3);
        assert!(!row.is_indirect());
        assert_eq!(unsafe { *row.element_ptr(&[1]).unwrap() }, 21);
    }

    #[test]
    fn test_null_row_pointer() {
        let mut row0 = [10u8, 11];
        let mut table = [row0.as_mut_ptr(), std::ptr::null_mut()];
        let layout = LayoutDescriptor::builder(table.as_mut_ptr().cast(), 1)
            .shape(vec![2, 2])
            .strides(vec![std::mem::size_of::<*mut u8>() as isize, 1])
            .suboffsets(vec![Addressing::Indirect(0), Addressing::Direct])
            .build()
            .unwrap();
        assert_eq!(unsafe { *layout.element_ptr(&[0, 1]).unwrap() }, 11);
        let err = unsafe { layout.element_ptr(&[1, 0]) }.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLayout { .. }));
        assert!(unsafe { layout.narrow_first(1) }.is_err());
    }

    #[test]
    fn test_to_read_only() {
        let mut data = [0u8; 4];
        let layout = LayoutDescriptor::contiguous(data.as_mut_ptr(), 1, vec![4]).unwrap();
        let frozen = layout.to_read_only();
        assert!(!layout.read_only());
        assert!(frozen.read_only());
        assert_eq!(frozen.base(), layout.base());
        assert_eq!(frozen.shape(), layout.shape());
    }

    #[test]
    fn test_narrow_first_keeps_strides() {
        let mut data: Vec<u8> = (0..24).collect();
        let layout = LayoutDescriptor::builder(data.as_mut_ptr(), 1)
            .shape(vec![3, 4])
            .strides(vec![1, 6])
            .build()
            .unwrap();
        let sub = unsafe { layout.narrow_first(2) }.unwrap();
        assert_eq!(sub.shape(), &[4]);
        assert_eq!(sub.strides(), Some(&[6isize][..]));
        assert_eq!(unsafe { *sub.element_ptr(&[3]).unwrap() }, 20);
    }

    #[test]
    fn test_order_chars() {
        assert_eq!(Order::from_char('C'), Some(Order::RowMajor));
        assert_eq!(Order::from_char('F'), Some(Order::ColumnMajor));
        assert_eq!(Order::from_char('A'), None);
        assert_eq!(Order::ColumnMajor.as_char(), 'F');
    }
}
