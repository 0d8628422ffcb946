use std::fmt;

use crate::failure::Failure;

/// Errors surfaced by the public API of the runtime.
///
/// Public operations validate their arguments eagerly and fail fast; a
/// [`ProcessError`] is never produced by code running *inside* an instance
/// (see [`ProcessErrorKind::UserError`] for how those are handled instead).
#[derive(Debug)]
pub struct ProcessError {
    kind: ProcessErrorKind,
}

#[derive(Debug)]
enum ProcessErrorKind {
    InvalidArgument(&'static str),
    NotAssociated,
    NotWrapped,
    AlreadyWrapped,
    NotFound,
    UserError(Failure),
}

impl ProcessError {
    pub(crate) fn invalid_argument(msg: &'static str) -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::InvalidArgument(msg),
        }
    }

    pub(crate) fn not_associated() -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::NotAssociated,
        }
    }

    pub(crate) fn not_wrapped() -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::NotWrapped,
        }
    }

    pub(crate) fn already_wrapped() -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::AlreadyWrapped,
        }
    }

    pub(crate) fn not_found() -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::NotFound,
        }
    }

    pub(crate) fn user_error(failure: Failure) -> ProcessError {
        ProcessError {
            kind: ProcessErrorKind::UserError(failure),
        }
    }

    /// Returns `true` if this error signals that `spawn` was called on a
    /// process with no pool attached.
    pub fn is_not_associated(&self) -> bool {
        matches!(self.kind, ProcessErrorKind::NotAssociated)
    }

    /// Returns `true` if this error signals that `spawn` was called before
    /// `wrap`.
    pub fn is_not_wrapped(&self) -> bool {
        matches!(self.kind, ProcessErrorKind::NotWrapped)
    }

    /// Returns `true` if this error signals a second call to `wrap`.
    pub fn is_already_wrapped(&self) -> bool {
        matches!(self.kind, ProcessErrorKind::AlreadyWrapped)
    }

    /// Returns `true` if a lookup by address found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ProcessErrorKind::NotFound)
    }

    /// If this error wraps a failure captured inside an instance's user
    /// function, returns a reference to it.
    pub fn failure(&self) -> Option<&Failure> {
        match self.kind {
            ProcessErrorKind::UserError(ref failure) => Some(failure),
            _ => None,
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ProcessErrorKind::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            ProcessErrorKind::NotAssociated => {
                write!(f, "process has no pool associated with it")
            }
            ProcessErrorKind::NotWrapped => write!(f, "process has not been wrapped yet"),
            ProcessErrorKind::AlreadyWrapped => write!(f, "process has already been wrapped"),
            ProcessErrorKind::NotFound => write!(f, "no entity found for that address"),
            ProcessErrorKind::UserError(ref failure) => {
                write!(f, "error in instance: {}", failure)
            }
        }
    }
}

impl From<Failure> for ProcessError {
    fn from(failure: Failure) -> ProcessError {
        ProcessError::user_error(failure)
    }
}
