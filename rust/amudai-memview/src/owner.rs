//! `BufferOwner`: the capability of a data owner to lease its memory to views.

use std::sync::Arc;

use crate::{error::Error, layout::LayoutDescriptor, result::Result};

/// Access requested when leasing an owner's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A data owner able to describe its memory and lease it to views.
///
/// # Safety
///
/// Implementors must guarantee that, between a successful `describe` and the
/// matching `release`:
/// - every address reachable through the returned layout, including pointer
///   tables of indirect dimensions, remains valid for reads, and for writes when
///   the layout is not read-only;
/// - the memory is neither moved, resized nor reshaped, and the owner itself does
///   not write to it;
/// - a lease whose layout is writable is exclusive: it is granted only while no
///   other lease on the same memory is outstanding, and no other lease is granted
///   until it is released.
///
/// Read-only layouts may be leased any number of times concurrently. An owner may
/// answer a `ReadWrite` request with a read-only layout; the lease is then handed
/// back and the request fails.
pub unsafe trait BufferOwner {
    /// Returns `false` when this owner cannot produce a layout at all.
    fn is_describable(&self) -> bool {
        true
    }

    /// Describes the owner's memory and takes a lease on it.
    fn describe(&self, access: AccessMode) -> Result<LayoutDescriptor>;

    /// Ends a lease taken by a successful `describe`. Called exactly once per lease,
    /// with the layout that `describe` returned.
    fn release(&self, layout: &LayoutDescriptor);
}

/// Counted handle to a data owner, keeping it alive for as long as views need it.
pub type OwnerRef = Arc<dyn BufferOwner + Send + Sync>;

/// A lease held on an owner's memory, released when dropped.
///
/// Every exit path that drops a `Lease`, including error propagation, releases
/// it exactly once.
pub struct Lease {
    owner: OwnerRef,
    layout: LayoutDescriptor,
    access: AccessMode,
}

impl Lease {
    /// Asks `owner` to describe its memory under `access` and takes the lease.
    pub fn acquire(owner: &OwnerRef, access: AccessMode) -> Result<Lease> {
        if !owner.is_describable() {
            return Err(Error::not_describable(
                "object does not support buffer leases",
            ));
        }
        let layout = owner.describe(access)?;
        let lease = Lease {
            owner: owner.clone(),
            layout,
            access,
        };
        if access == AccessMode::ReadWrite && lease.layout.read_only() {
            // Dropping the lease hands it back before reporting.
            return Err(Error::incompatible_access(
                "writable lease requested, owner granted a read-only layout",
            ));
        }
        Ok(lease)
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    #[inline]
    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    #[inline]
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// The layout a view over this lease exposes: read-only unless the lease was
    /// taken for writing.
    pub(crate) fn view_layout(&self) -> LayoutDescriptor {
        match self.access {
            AccessMode::ReadOnly => self.layout.to_read_only(),
            AccessMode::ReadWrite => self.layout.clone(),
        }
    }

    /// Releases the lease now rather than at the end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        log::debug!(
            "releasing {:?} lease on {} bytes at {:p}",
            self.access,
            self.layout.len(),
            self.layout.base()
        );
        self.owner.release(&self.layout);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("access", &self.access)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
