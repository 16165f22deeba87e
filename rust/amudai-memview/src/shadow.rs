//! What keeps a view's memory alive, and the release protocol for each case,
//! including the write-back of shadow copies.

use crate::{
    buffer::CopyBuffer,
    copy::{self, Direction},
    error::Error,
    layout::Order,
    owner::Lease,
    result::Result,
};

/// Memory backing a [`crate::MemoryView`].
pub(crate) enum Backing {
    /// Caller-supplied memory; no release-time protocol.
    Detached,
    /// The owner's memory itself, leased for the view's lifetime.
    ZeroCopy(Lease),
    /// An independent copy; the owner's lease was already released. Only held so
    /// the view's layout keeps pointing at live memory.
    OwnedCopy { _buffer: CopyBuffer },
    /// A writable copy that goes back into the leased memory on release.
    ShadowPending {
        lease: Lease,
        copy: CopyBuffer,
        order: Order,
    },
    /// The release protocol has run.
    Released,
}

/// Kind of memory backing a view, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    Detached,
    ZeroCopy,
    OwnedCopy,
    Shadow,
    Released,
}

impl Backing {
    pub(crate) fn kind(&self) -> BackingKind {
        match self {
            Backing::Detached => BackingKind::Detached,
            Backing::ZeroCopy(_) => BackingKind::ZeroCopy,
            Backing::OwnedCopy { .. } => BackingKind::OwnedCopy,
            Backing::ShadowPending { .. } => BackingKind::Shadow,
            Backing::Released => BackingKind::Released,
        }
    }

    #[inline]
    pub(crate) fn is_released(&self) -> bool {
        matches!(self, Backing::Released)
    }

    /// Runs the release protocol once and leaves the backing `Released`.
    ///
    /// A shadow copy is scattered back over the owner's original layout before
    /// the lease ends. The lease is released even when the write-back fails.
    pub(crate) fn release(&mut self) -> Result<()> {
        match std::mem::replace(self, Backing::Released) {
            Backing::Released => {
                debug_assert!(false, "memory view released twice");
                Err(Error::invalid_operation("release of a released memory view"))
            }
            Backing::Detached | Backing::OwnedCopy { .. } => Ok(()),
            Backing::ZeroCopy(lease) => {
                lease.release();
                Ok(())
            }
            Backing::ShadowPending {
                lease,
                mut copy,
                order,
            } => {
                log::debug!(
                    "writing back {} byte shadow copy ({}-order) into {:p}",
                    copy.len(),
                    order.as_char(),
                    lease.layout().base()
                );
                // SAFETY: the copy holds exactly `layout.len()` packed bytes and the
                // lease keeps the original region valid for writes until dropped.
                let result = unsafe {
                    copy::copy_layout(copy.as_mut_ptr(), lease.layout(), order, Direction::Scatter)
                };
                lease.release();
                result
            }
        }
    }
}

impl std::fmt::Debug for Backing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind().fmt(f)
    }
}
