//! Test utilities for the memory view crates.
//!
//! This crate provides fixture data owners that lease their memory through
//! [`amudai_memview::BufferOwner`]:
//! - [`owners::StridedOwner`] for contiguous and strided layouts, optionally read-only
//! - [`owners::IndirectOwner`] for pointer-table layouts with suboffsets
//! - [`owners::OpaqueOwner`] for objects that cannot describe their memory
//!
//! Every owner counts its leases, so tests can check that each `describe` is
//! matched by exactly one `release`.

pub mod owners;
pub mod raw;

pub use owners::{IndirectOwner, LeaseCounters, OpaqueOwner, StridedOwner};
pub use raw::RawBytes;
