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

    pub fn index_out_of_bounds(index: usize, len: usize) -> Error {
        ErrorKind::IndexOutOfBounds { index, len }.into()
    }

    pub fn invariant(context: impl Into<String>) -> Error {
        ErrorKind::InvariantViolation {
            context: context.into(),
        }
        .into()
    }

    pub fn allocation_failed(requested: usize) -> Error {
        ErrorKind::AllocationFailed { requested }.into()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    /// Whether this error is a bounds violation the caller can recover from by
    /// retrying with a valid index.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self.kind(), ErrorKind::IndexOutOfBounds { .. })
    }

    pub fn is_allocation_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::AllocationFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("internal invariant violated: {context}")]
    InvariantViolation { context: String },

    #[error("failed to allocate storage for {requested} slots")]
    AllocationFailed { requested: usize },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },
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
    fn test_out_of_bounds_display() {
        let e = Error::index_out_of_bounds(5, 3);
        assert!(e.is_out_of_bounds());
        assert_eq!(e.to_string(), "index 5 out of bounds for length 3");
    }

    #[test]
    fn test_into_kind() {
        let e = Error::allocation_failed(2048);
        assert!(e.is_allocation_failure());
        assert!(!e.is_out_of_bounds());
        match e.into_kind() {
            ErrorKind::AllocationFailed { requested } => assert_eq!(requested, 2048),
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
