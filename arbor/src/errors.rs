use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for index and query operations.
///
/// Each kind names a category of failure so callers can react to it
/// without parsing messages.
///
/// # Examples
///
/// ```rust
/// use arbor::errors::{ArborError, ArborResult, ErrorKind};
///
/// fn example() -> ArborResult<()> {
///     Err(ArborError::new("no index supports ArcCosineDistance", ErrorKind::Configuration))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Setup-time failure: no compatible index, unsupported distance, bad parameters
    Configuration,
    /// An argument is outside of its domain (dimensionality mismatch, negative radius)
    InvalidArgument,
    /// The requested object or page does not exist
    NotFound,
    /// The operation is not valid in the current state
    InvalidOperation,
    /// The structure does not implement the requested operation
    Unsupported,
    /// Generic IO error
    IOError,
    /// Error encoding or decoding persisted data
    EncodingError,
    /// A structural invariant was found broken
    InvariantViolation,
    /// Error from an extension crate; the string names the extension
    Extension(String),
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "Configuration error"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::Unsupported => write!(f, "Unsupported operation"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InvariantViolation => write!(f, "Invariant violation"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type shared by all arbor crates.
///
/// Carries a message, a kind, an optional cause and the backtrace captured
/// at construction time.
#[derive(Clone)]
pub struct ArborError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<ArborError>>,
    backtrace: Arc<Backtrace>,
}

impl ArborError {
    /// Creates a new `ArborError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        ArborError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `ArborError` wrapping the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: ArborError) -> Self {
        ArborError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&ArborError> {
        self.cause.as_deref()
    }
}

impl Display for ArborError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for ArborError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // message with backtrace, or the cause chain
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(f, "{} ({})\n{:?}", self.message, self.error_kind, self.backtrace),
        }
    }
}

impl Error for ArborError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, ArborError>`.
pub type ArborResult<T> = Result<T, ArborError>;

impl From<std::io::Error> for ArborError {
    fn from(err: std::io::Error) -> Self {
        ArborError::new(&format!("IO error: {}", err), ErrorKind::IOError)
    }
}

impl From<std::fmt::Error> for ArborError {
    fn from(err: std::fmt::Error) -> Self {
        ArborError::new(&format!("Formatting error: {}", err), ErrorKind::InternalError)
    }
}

/// Builds a configuration error; shorthand used at setup boundaries.
pub fn configuration_error(message: impl AsRef<str>) -> ArborError {
    ArborError::new(message.as_ref(), ErrorKind::Configuration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_error_has_no_cause() {
        let error = ArborError::new("bad k", ErrorKind::InvalidArgument);
        assert_eq!(error.message(), "bad k");
        assert_eq!(error.kind(), &ErrorKind::InvalidArgument);
        assert!(error.cause().is_none());
        assert!(error.source().is_none());
    }

    #[test]
    fn test_error_with_cause_exposes_source() {
        let cause = ArborError::new("page 7 unreadable", ErrorKind::IOError);
        let error = ArborError::new_with_cause("kNN query failed", ErrorKind::InternalError, cause);
        assert_eq!(error.cause().map(|c| c.message()), Some("page 7 unreadable"));
        assert!(error.source().is_some());
        assert!(format!("{:?}", error).contains("Caused by: page 7 unreadable"));
    }

    #[test]
    fn test_io_error_converts_to_io_kind() {
        let err: ArborError = std::io::Error::other("disk gone").into();
        assert_eq!(err.kind(), &ErrorKind::IOError);
        assert!(err.message().contains("disk gone"));
    }

    #[test]
    fn test_extension_kind_display() {
        assert_eq!(ErrorKind::Extension("Betula".into()).to_string(), "Betula error");
        assert_eq!(ErrorKind::Configuration.to_string(), "Configuration error");
    }

    #[test]
    fn test_configuration_error_helper() {
        let err = configuration_error("no index");
        assert_eq!(err.kind(), &ErrorKind::Configuration);
        assert_eq!(err.to_string(), "no index");
    }
}
