//! Contiguous views over arbitrary owners, copying only when the owner's layout
//! is not already contiguous in the requested order.

use crate::{
    buffer::CopyBuffer,
    contiguity,
    copy::{self, Direction},
    error::Error,
    layout::{LayoutDescriptor, Order},
    options::ContiguousOptions,
    owner::{AccessMode, Lease, OwnerRef},
    result::Result,
    shadow::Backing,
    view::MemoryView,
};

/// What the caller intends to do with a contiguous view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContiguousMode {
    /// Read only; a copy is made when needed and detached from the owner.
    ReadOnly,
    /// Writable in place; non-contiguous owners are rejected.
    Write,
    /// Writable; non-contiguous owners get a shadow copy that is written back on
    /// release. The owner stays leased until then.
    Shadow,
}

impl ContiguousMode {
    fn access(self) -> AccessMode {
        match self {
            ContiguousMode::ReadOnly => AccessMode::ReadOnly,
            ContiguousMode::Write | ContiguousMode::Shadow => AccessMode::ReadWrite,
        }
    }
}

impl MemoryView {
    /// Returns a view over `owner`'s data that is contiguous in `order`, using
    /// default [`ContiguousOptions`].
    pub fn get_contiguous(
        owner: &OwnerRef,
        mode: ContiguousMode,
        order: Order,
    ) -> Result<MemoryView> {
        Self::get_contiguous_with(owner, mode, order, &ContiguousOptions::default())
    }

    /// Returns a view over `owner`'s data that is contiguous in `order`.
    ///
    /// When the owner's layout already is, the view wraps the owner's memory
    /// directly. Otherwise `Write` mode fails with `IncompatibleAccess`, and the
    /// other modes copy the data into a packed buffer. Any lease taken here is
    /// released again when an error is returned.
    pub fn get_contiguous_with(
        owner: &OwnerRef,
        mode: ContiguousMode,
        order: Order,
        options: &ContiguousOptions,
    ) -> Result<MemoryView> {
        options.validate()?;
        let lease = Lease::acquire(owner, mode.access())?;

        if contiguity::is_contiguous(lease.layout(), order) {
            log::trace!(
                "zero-copy {}-contiguous view over {} bytes at {:p}",
                order.as_char(),
                lease.layout().len(),
                lease.layout().base()
            );
            return Ok(MemoryView::new(lease.view_layout(), Backing::ZeroCopy(lease)));
        }

        if mode == ContiguousMode::Write {
            return Err(Error::incompatible_access(
                "writable contiguous buffer requested for a non-contiguous object",
            ));
        }

        let mut copy = materialize(lease.layout(), order, options)?;
        let view = match mode {
            ContiguousMode::Shadow => {
                let layout = lease.layout().packed(copy.as_mut_ptr(), order, false);
                MemoryView::new(layout, Backing::ShadowPending { lease, copy, order })
            }
            _ => {
                let layout = lease.layout().packed(copy.as_mut_ptr(), order, true);
                lease.release();
                MemoryView::new(layout, Backing::OwnedCopy { _buffer: copy })
            }
        };
        Ok(view)
    }
}

/// Copies the elements of `layout` into a new packed buffer in `order`.
fn materialize(
    layout: &LayoutDescriptor,
    order: Order,
    options: &ContiguousOptions,
) -> Result<CopyBuffer> {
    let len = layout.len();
    if !options.allows_copy(len) {
        return Err(Error::out_of_memory(
            format!("contiguous copy (limit {:?})", options.copy_limit),
            len,
        ));
    }
    let mut copy = CopyBuffer::try_zeroed(len, options.alignment)?;
    log::debug!(
        "materializing {len} bytes in {}-order via the {} copy engine",
        order.as_char(),
        if layout.is_indirect() { "indirect" } else { "strided" }
    );
    // SAFETY: the copy holds `len` bytes, and the caller's lease keeps the region
    // valid for reads.
    unsafe { copy::copy_layout(copy.as_mut_ptr(), layout, order, Direction::Gather)? };
    Ok(copy)
}
