//! Memory views: lightweight handles exposing a read-only or read-write window onto
//! the memory of a data owner, copying it only when a contiguous layout is required
//! and the owner's layout is not.
//!
//! # Modules
//!
//! - [`layout`]: layout descriptors (shape, strides, indirection) and element order
//! - [`contiguity`]: contiguity checks in row-major and column-major order
//! - [`copy`]: strided and indirect copy engines, in both directions
//! - [`owner`]: the [`BufferOwner`] lease contract
//! - [`view`]: [`MemoryView`] and element access
//! - [`materialize`]: contiguous views with optional shadow copies
//!
//! # Example
//!
//! ```
//! use amudai_memview::{LayoutDescriptor, MemoryView, Order};
//!
//! let mut data = *b"abcdef";
//! let layout = LayoutDescriptor::builder(data.as_mut_ptr(), 1)
//!     .shape(vec![2, 3])
//!     .build()
//!     .unwrap();
//! // SAFETY: `data` outlives the view and is not touched while it exists.
//! let view = unsafe { MemoryView::from_layout(layout) };
//! assert_eq!(view.to_bytes(Order::ColumnMajor).unwrap(), b"adbecf");
//! assert_eq!(view.at(&[1, -1]).unwrap().as_bytes(), Some(&b"f"[..]));
//! ```

pub mod buffer;
pub mod contiguity;
pub mod copy;
pub mod error;
pub mod layout;
pub mod materialize;
pub mod options;
pub mod owner;
pub mod result;
pub mod shadow;
pub mod view;

pub use error::{Error, ErrorKind};
pub use layout::{Addressing, LayoutBuilder, LayoutDescriptor, Order};
pub use materialize::ContiguousMode;
pub use options::ContiguousOptions;
pub use owner::{AccessMode, BufferOwner, Lease, OwnerRef};
pub use result::Result;
pub use shadow::BackingKind;
pub use view::{Item, MemoryView, SubView};
