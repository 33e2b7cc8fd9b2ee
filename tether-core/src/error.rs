use crate::{Error, Result, ResultCode};
use std::fmt::Display;
use thiserror::Error;

/// Attributable failure carried inside [`crate::Error`].
///
/// Retrieve it with `error.downcast_ref::<SqliteError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqliteError {
    /// The engine returned a non success code.
    #[error("{message} (code {code})")]
    Engine { code: ResultCode, message: String },
    /// Operation on a disposed connection, reopening or an invalid open mode.
    #[error("misuse: {0}")]
    Misuse(String),
    /// The connection was never opened or it was closed while working.
    #[error("not opened: {0}")]
    NotOpened(String),
    /// A confined operation was called from a thread that does not own the connection.
    #[error("confinement violated: {0}")]
    ConfinementViolated(String),
    /// The engine broke its own contract or bookkeeping got out of sync.
    #[error("internal inconsistency: {0}")]
    Inconsistent(String),
}

impl SqliteError {
    pub fn code(&self) -> ResultCode {
        match self {
            SqliteError::Engine { code, .. } => *code,
            SqliteError::Misuse(..) => ResultCode::WRAPPER_MISUSE,
            SqliteError::NotOpened(..) => ResultCode::WRAPPER_NOT_OPENED,
            SqliteError::ConfinementViolated(..) => ResultCode::WRAPPER_CONFINEMENT_VIOLATED,
            SqliteError::Inconsistent(..) => ResultCode::WRAPPER_WEIRD,
        }
    }
}

/// Returns the [`SqliteError`] carried by `error`, if any.
pub fn sqlite_error(error: &Error) -> Option<&SqliteError> {
    error.downcast_ref::<SqliteError>()
}

/// Report a broken invariant without raising it.
///
/// Fatal ones mean the bookkeeping is wrong, the others are expected under misuse.
pub fn recoverable_error(source: impl Display, message: impl Display, fatal: bool) {
    if fatal {
        log::error!("{} {}", source, message);
    } else {
        log::warn!("{} {}", source, message);
    }
}

/// Run a diagnostic call whose failure must never escape, the failure is logged and discarded.
pub fn best_effort<T>(what: impl Display, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{}: {:#}", what, e);
            None
        }
    }
}
