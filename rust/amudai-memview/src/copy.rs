//! Copy engines between a strided (possibly indirect) region and a packed buffer.
//!
//! Both engines run in either [`Direction`]: gathering a region into a packed
//! buffer, or scattering a packed buffer back over the region's stride pattern.

use std::ptr;

use crate::{
    error::Error,
    layout::{LayoutDescriptor, Order},
    result::Result,
};

/// Direction of a copy between a packed buffer and a strided region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Strided region to packed buffer.
    Gather,
    /// Packed buffer to strided region.
    Scatter,
}

/// Copies every element of `layout` to or from `packed`, choosing the strided
/// engine for direct layouts and the indirect engine otherwise.
///
/// # Safety
///
/// `packed` must be valid for `layout.len()` bytes (writes for `Gather`, reads
/// for `Scatter`), the region described by `layout` must be valid for the
/// opposite access, and the two must not overlap.
pub unsafe fn copy_layout(
    packed: *mut u8,
    layout: &LayoutDescriptor,
    order: Order,
    direction: Direction,
) -> Result<()> {
    if layout.is_indirect() {
        unsafe { copy_indirect(packed, layout, order, direction) }
    } else {
        unsafe {
            copy_strided(
                packed,
                layout.base(),
                layout.shape(),
                &layout.strides_or_default(),
                layout.item_size(),
                order,
                direction,
            );
        }
        Ok(())
    }
}

/// Recursively copies an N-dimensional strided region with direct addressing.
///
/// The packed side is written (or read) tightly, with no gaps, in `order`.
///
/// # Safety
///
/// Same contract as [`copy_layout`]; `shape` and `strides` must have equal
/// length and describe no indirect dimension.
pub unsafe fn copy_strided(
    packed: *mut u8,
    strided: *mut u8,
    shape: &[usize],
    strides: &[isize],
    item_size: usize,
    order: Order,
    direction: Direction,
) {
    debug_assert_eq!(shape.len(), strides.len());
    match shape.len() {
        0 => unsafe { copy_item(packed, strided, item_size, direction) },
        1 => {
            let mut packed = packed;
            let mut strided = strided;
            for _ in 0..shape[0] {
                unsafe { copy_item(packed, strided, item_size, direction) };
                packed = packed.wrapping_add(item_size);
                strided = strided.wrapping_offset(strides[0]);
            }
        }
        nd => {
            // Row-major splits off the first dimension, column-major the last, so
            // the remaining dimensions are always copied by the recursive call.
            let (outer, inner) = match order {
                Order::RowMajor => (0, 1..nd),
                Order::ColumnMajor => (nd - 1, 0..nd - 1),
            };
            let inner_shape = &shape[inner.clone()];
            let inner_strides = &strides[inner];
            let outstride = item_size * inner_shape.iter().product::<usize>();
            let mut packed = packed;
            let mut strided = strided;
            for _ in 0..shape[outer] {
                unsafe {
                    copy_strided(
                        packed,
                        strided,
                        inner_shape,
                        inner_strides,
                        item_size,
                        order,
                        direction,
                    )
                };
                packed = packed.wrapping_add(outstride);
                strided = strided.wrapping_offset(strides[outer]);
            }
        }
    }
}

/// Copies a region with indirect dimensions by walking an explicit multi-index.
///
/// Fails with `OutOfMemory` when the index vector cannot be allocated, and with
/// `InvalidLayout` when a pointer table holds a null entry. Elements visited
/// before the failure have already been copied.
///
/// # Safety
///
/// Same contract as [`copy_layout`], including readability of every pointer
/// table reached through an indirect dimension.
pub unsafe fn copy_indirect(
    packed: *mut u8,
    layout: &LayoutDescriptor,
    order: Order,
    direction: Direction,
) -> Result<()> {
    let item_size = layout.item_size();
    let strides = layout.strides_or_default();
    let mut odometer = Odometer::try_new(layout.shape(), order)?;
    let mut packed = packed;
    for _ in 0..layout.item_count() {
        let item = unsafe { layout.element_ptr_with(&strides, odometer.index())? };
        unsafe { copy_item(packed, item, item_size, direction) };
        packed = packed.wrapping_add(item_size);
        odometer.advance();
    }
    Ok(())
}

/// Multi-dimensional index that steps through a shape in a given order.
///
/// Starts at all zeros and is advanced after each visit (post-increment), so the
/// first visited index is `[0, ..., 0]` and the last is `shape - 1` in every
/// dimension. Advancing past the last index wraps back to all zeros.
#[derive(Debug, Clone)]
pub struct Odometer<'a> {
    index: Vec<usize>,
    shape: &'a [usize],
    order: Order,
}

impl<'a> Odometer<'a> {
    pub fn try_new(shape: &'a [usize], order: Order) -> Result<Odometer<'a>> {
        let mut index = Vec::new();
        index.try_reserve_exact(shape.len()).map_err(|_| {
            Error::out_of_memory("index vector", shape.len() * std::mem::size_of::<usize>())
        })?;
        index.resize(shape.len(), 0);
        Ok(Odometer { index, shape, order })
    }

    #[inline]
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Steps to the next index: row-major bumps the last dimension first,
    /// column-major the first, carrying on overflow.
    pub fn advance(&mut self) {
        let dims = self.index.iter_mut().zip(self.shape.iter());
        match self.order {
            Order::RowMajor => carry(dims.rev()),
            Order::ColumnMajor => carry(dims),
        }
    }
}

fn carry<'i, 's>(dims: impl Iterator<Item = (&'i mut usize, &'s usize)>) {
    for (i, &extent) in dims {
        *i += 1;
        if *i < extent {
            return;
        }
        *i = 0;
    }
}

#[inline]
unsafe fn copy_item(packed: *mut u8, strided: *mut u8, item_size: usize, direction: Direction) {
    unsafe {
        match direction {
            Direction::Gather => ptr::copy_nonoverlapping(strided, packed, item_size),
            Direction::Scatter => ptr::copy_nonoverlapping(packed, strided, item_size),
        }
    }
}
