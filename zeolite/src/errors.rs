use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic, ReadExecutor};

/// Error kinds for Zeolite operations.
///
/// Each kind describes a category of failure so callers can react precisely:
/// `NotFound` and `Conflict` are expected, recoverable outcomes that
/// applications handle in retry loops or UI flows, while `InvalidState`
/// indicates a logic error (using a handle after its collection or database
/// is gone) and should be treated as non-recoverable within that call path.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// The operation targets a document ID with no current revision
    NotFound,
    /// A save/delete's assumed base revision no longer matches the stored
    /// current revision, or a conflict resolver declined to merge
    Conflict,
    /// Cross-collection handle misuse, malformed collection/scope name,
    /// or otherwise invalid arguments
    InvalidParameter,
    /// Operating on an invalidated collection or a closed database
    InvalidState,
    /// Unexpected internal failure (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::InvalidParameter => write!(f, "Invalid parameter"),
            ErrorKind::InvalidState => write!(f, "Invalid state"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Zeolite error type.
///
/// `ZeoliteError` encapsulates the error message, kind, and an optional
/// cause. It supports error chaining and backtraces for debugging.
///
/// The `ZeoliteResult<T>` alias is equivalent to `Result<T, ZeoliteError>`
/// and is used throughout the codebase for operations that can fail.
#[derive(Clone)]
pub struct ZeoliteError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<ZeoliteError>>,
    backtrace: Atomic<Backtrace>,
}

impl ZeoliteError {
    /// Creates a new `ZeoliteError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        ZeoliteError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `ZeoliteError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: ZeoliteError) -> Self {
        ZeoliteError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&Box<ZeoliteError>> {
        self.cause.as_ref()
    }
}

impl Display for ZeoliteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for ZeoliteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => self
                .backtrace
                .read_with(|bt| write!(f, "{}\n{:?}", self.message, bt)),
        }
    }
}

impl Error for ZeoliteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Zeolite operations.
pub type ZeoliteResult<T> = Result<T, ZeoliteError>;

impl From<String> for ZeoliteError {
    fn from(msg: String) -> Self {
        ZeoliteError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for ZeoliteError {
    fn from(msg: &str) -> Self {
        ZeoliteError::new(msg, ErrorKind::InternalError)
    }
}
