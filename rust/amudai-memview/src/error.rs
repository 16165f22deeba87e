use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn not_describable(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::NotDescribable {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn incompatible_access(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::IncompatibleAccess {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn out_of_memory(context: impl Into<String>, requested: usize) -> Error {
        Error(
            ErrorKind::OutOfMemory {
                context: context.into(),
                requested,
            }
            .into(),
        )
    }

    pub fn out_of_bounds(index: isize, dim: usize, extent: usize) -> Error {
        Error(ErrorKind::OutOfBounds { index, dim, extent }.into())
    }

    pub fn invalid_index(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidIndex {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_layout(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidLayout {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    /// Returns `true` for lease-level failures raised by the owner or by the
    /// access negotiation, as opposed to indexing failures.
    pub fn is_lease_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotDescribable { .. } | ErrorKind::IncompatibleAccess { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("object cannot describe its memory: {message}")]
    NotDescribable { message: String },

    #[error("incompatible access: {message}")]
    IncompatibleAccess { message: String },

    #[error("out of memory allocating {requested} bytes for {context}")]
    OutOfMemory { context: String, requested: usize },

    #[error("index {index} out of bounds for dimension {dim} of extent {extent}")]
    OutOfBounds {
        index: isize,
        dim: usize,
        extent: usize,
    },

    #[error("invalid index: {message}")]
    InvalidIndex { message: String },

    #[error("invalid layout: {message}")]
    InvalidLayout { message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_roundtrip() {
        let e = Error::out_of_bounds(-6, 0, 5);
        assert!(matches!(
            e.kind(),
            ErrorKind::OutOfBounds {
                index: -6,
                dim: 0,
                extent: 5
            }
        ));
        assert_eq!(
            e.to_string(),
            "index -6 out of bounds for dimension 0 of extent 5"
        );
        assert!(matches!(e.into_kind(), ErrorKind::OutOfBounds { .. }));
    }

    #[test]
    fn test_lease_errors() {
        assert!(Error::not_describable("x").is_lease_error());
        assert!(Error::incompatible_access("x").is_lease_error());
        assert!(!Error::invalid_index("x").is_lease_error());
        assert!(!Error::out_of_memory("x", 1).is_lease_error());
    }

    #[test]
    fn test_error_is_small() {
        assert_eq!(
            std::mem::size_of::<Error>(),
            std::mem::size_of::<usize>()
        );
    }
}
