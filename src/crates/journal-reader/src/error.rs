//! Error types for journal reader operations.

use nix::errno::Errno;
use std::ffi::c_int;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    /// A backend primitive returned a negative status code.
    #[error("{description} ({code})")]
    Backend {
        code: c_int,
        description: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} is not supported by the underlying journal backend")]
    Unsupported(&'static str),

    #[error("journal is closed")]
    Closed,

    #[error("journal failed to recover its backend handle and must be reopened")]
    Failed,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

static_assertions::const_assert!(std::mem::size_of::<JournalError>() <= 32);

impl JournalError {
    /// Build a backend error from a negative status code.
    pub fn from_code(code: c_int) -> Self {
        JournalError::Backend {
            code,
            description: Errno::from_raw(code.saturating_abs()).desc(),
        }
    }

    /// The raw (negative) status code, for backend failures.
    pub fn code(&self) -> Option<c_int> {
        match self {
            JournalError::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The errno carried by a backend failure.
    pub fn errno(&self) -> Option<Errno> {
        self.code().map(|code| Errno::from_raw(code.saturating_abs()))
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;

/// Translate a status code: negative values become errors, anything else is
/// passed through.
pub(crate) fn check(rc: c_int) -> Result<c_int> {
    if rc < 0 {
        Err(JournalError::from_code(rc))
    } else {
        Ok(rc)
    }
}
