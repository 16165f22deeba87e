//! Contiguity checks over layout descriptors.

use crate::layout::{LayoutDescriptor, Order};

/// Returns `true` when the elements of `layout` form a gapless run of memory when
/// walked in `order`.
///
/// Layouts with indirect dimensions are never contiguous. Dimensions of extent 0
/// or 1 never cause a mismatch, and a layout with no elements is trivially
/// contiguous.
pub fn is_contiguous(layout: &LayoutDescriptor, order: Order) -> bool {
    if layout.is_indirect() {
        return false;
    }
    if layout.ndim() == 0 || layout.shape().contains(&0) {
        return true;
    }
    strides_are_packed(
        layout.shape(),
        &layout.strides_or_default(),
        layout.item_size(),
        order,
    )
}

/// Returns `true` when `layout` is contiguous in either order (the `'A'` order tag).
pub fn is_contiguous_any(layout: &LayoutDescriptor) -> bool {
    is_contiguous(layout, Order::RowMajor) || is_contiguous(layout, Order::ColumnMajor)
}

/// Compares `strides` against the tightly packed strides for `order`, ignoring
/// dimensions of extent 1.
pub fn strides_are_packed(
    shape: &[usize],
    strides: &[isize],
    item_size: usize,
    order: Order,
) -> bool {
    debug_assert_eq!(shape.len(), strides.len());
    let mut expected = item_size as isize;
    let mut check = |dim: usize| {
        let extent = shape[dim];
        if extent > 1 && strides[dim] != expected {
            return false;
        }
        expected = expected.saturating_mul(extent as isize);
        true
    };
    match order {
        Order::RowMajor => (0..shape.len()).rev().all(&mut check),
        Order::ColumnMajor => (0..shape.len()).all(&mut check),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Addressing;

    fn strided(shape: Vec<usize>, strides: Vec<isize>, item_size: usize) -> LayoutDescriptor {
        LayoutDescriptor::builder(std::ptr::null_mut(), item_size)
            .shape(shape)
            .strides(strides)
            .build()
            .unwrap()
    }

    #[test]
    fn test_scalar_is_contiguous() {
        let layout = LayoutDescriptor::builder(std::ptr::null_mut(), 8)
            .build()
            .unwrap();
        assert!(is_contiguous(&layout, Order::RowMajor));
        assert!(is_contiguous(&layout, Order::ColumnMajor));
    }

    #[test]
    fn test_default_strides_are_row_major() {
        let layout = LayoutDescriptor::contiguous(std::ptr::null_mut(), 4, vec![2, 3]).unwrap();
        assert!(is_contiguous(&layout, Order::RowMajor));
        assert!(!is_contiguous(&layout, Order::ColumnMajor));
        assert!(is_contiguous_any(&layout));
    }

    #[test]
    fn test_column_major_strides() {
        let layout = strided(vec![2, 3], vec![4, 8], 4);
        assert!(!is_contiguous(&layout, Order::RowMajor));
        assert!(is_contiguous(&layout, Order::ColumnMajor));
    }

    #[test]
    fn test_unit_extent_ignores_stride() {
        for stride in [-100, 0, 1, 7, 1000] {
            let layout = strided(vec![1], vec![stride], 1);
            assert!(is_contiguous(&layout, Order::RowMajor));
            assert!(is_contiguous(&layout, Order::ColumnMajor));
        }

        let layout = strided(vec![3, 1, 2], vec![2, 999, 1], 1);
        assert!(is_contiguous(&layout, Order::RowMajor));
        assert!(!is_contiguous(&layout, Order::ColumnMajor));
    }

    #[test]
    fn test_gaps_and_negative_strides() {
        let layout = strided(vec![4], vec![2], 1);
        assert!(!is_contiguous_any(&layout));

        let layout = strided(vec![4], vec![-1], 1);
        assert!(!is_contiguous_any(&layout));

        let layout = strided(vec![2, 3], vec![4, 1], 1);
        assert!(!is_contiguous(&layout, Order::RowMajor));
    }

    #[test]
    fn test_empty_is_contiguous() {
        let layout = strided(vec![0, 5], vec![7, 3], 1);
        assert!(is_contiguous(&layout, Order::RowMajor));
        assert!(is_contiguous(&layout, Order::ColumnMajor));
    }

    #[test]
    fn test_indirect_is_never_contiguous() {
        let layout = LayoutDescriptor::builder(std::ptr::null_mut(), 1)
            .shape(vec![1, 1])
            .suboffsets(vec![Addressing::Indirect(0), Addressing::Direct])
            .build()
            .unwrap();
        assert!(!is_contiguous(&layout, Order::RowMajor));
        assert!(!is_contiguous(&layout, Order::ColumnMajor));
    }
}
