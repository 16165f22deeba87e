//! Options controlling how contiguous copies are materialized.

use crate::{error::Error, result::Result};

/// Default alignment of materialized copy buffers, in bytes.
pub const DEFAULT_COPY_ALIGNMENT: usize = 64;

/// Largest accepted copy buffer alignment.
pub const MAX_COPY_ALIGNMENT: usize = 4096;

/// Configuration for [`crate::MemoryView::get_contiguous_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContiguousOptions {
    /// Alignment of the copy buffer when a copy is needed. Must be a power of two.
    pub alignment: usize,
    /// Maximum size of a single copy, in bytes. Larger copies fail with
    /// `OutOfMemory` before anything is allocated. `None` means unlimited.
    pub copy_limit: Option<usize>,
}

impl Default for ContiguousOptions {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_COPY_ALIGNMENT,
            copy_limit: None,
        }
    }
}

impl ContiguousOptions {
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_copy_limit(mut self, limit: usize) -> Self {
        self.copy_limit = Some(limit);
        self
    }

    /// Validates the options, failing with `InvalidArgument`.
    pub fn validate(&self) -> Result<()> {
        if !self.alignment.is_power_of_two() {
            return Err(Error::invalid_arg(
                "alignment",
                format!("{} is not a power of two", self.alignment),
            ));
        }
        if self.alignment > MAX_COPY_ALIGNMENT {
            return Err(Error::invalid_arg(
                "alignment",
                format!("{} exceeds {MAX_COPY_ALIGNMENT}", self.alignment),
            ));
        }
        Ok(())
    }

    /// Returns `true` when a copy of `len` bytes fits within `copy_limit`.
    pub fn allows_copy(&self, len: usize) -> bool {
        self.copy_limit.is_none_or(|limit| len <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let options = ContiguousOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.alignment, DEFAULT_COPY_ALIGNMENT);
        assert!(options.allows_copy(usize::MAX));
    }

    #[test]
    fn test_invalid_alignment() {
        assert!(
            ContiguousOptions::default()
                .with_alignment(48)
                .validate()
                .is_err()
        );
        assert!(
            ContiguousOptions::default()
                .with_alignment(0)
                .validate()
                .is_err()
        );
        assert!(
            ContiguousOptions::default()
                .with_alignment(8192)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_copy_limit() {
        let options = ContiguousOptions::default().with_copy_limit(16);
        assert!(options.allows_copy(16));
        assert!(!options.allows_copy(17));
    }
}
