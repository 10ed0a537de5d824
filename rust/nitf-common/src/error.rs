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

    pub fn invalid_handle(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidHandle {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn use_after_destroy(operation: impl Into<String>) -> Error {
        Error(
            ErrorKind::UseAfterDestroy {
                operation: operation.into(),
            }
            .into(),
        )
    }

    pub fn already_destroyed() -> Error {
        Error(ErrorKind::AlreadyDestroyed.into())
    }

    pub fn no_source_attached() -> Error {
        Error(ErrorKind::NoSourceAttached.into())
    }

    pub fn invalid_source(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidSource {
                message: message.into(),
            }
            .into(),
        )
    }
}

/// Failure taxonomy for the segment write path.
///
/// `InvalidHandle` and `UseAfterDestroy` indicate programmer misuse and leave
/// the affected instance permanently unusable; the remaining variants describe
/// recoverable conditions the caller can react to.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid native handle: {message}")]
    InvalidHandle { message: String },

    #[error("'{operation}' invoked on a destroyed handle")]
    UseAfterDestroy { operation: String },

    #[error("native handle has already been destroyed")]
    AlreadyDestroyed,

    #[error("no segment source has been attached")]
    NoSourceAttached,

    #[error("invalid segment source: {message}")]
    InvalidSource { message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
