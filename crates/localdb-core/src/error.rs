//! Error types for the LocalDB wrapper.
//!
//! Two kinds matter to callers: validation errors (raised before any native
//! call) and native-call errors (a non-success result code from the vendor
//! API). Display output is the full caller-facing message; native-call
//! errors embed the symbolic code name when the code is recognized.

use crate::ffi::HResult;
use thiserror::Error;

/// Main error type for LocalDB operations.
#[derive(Debug, Error)]
pub enum LocalDbError {
    /// An argument failed validation. The native layer was never invoked.
    #[error("{0}")]
    InvalidArgument(String),

    /// A native management call reported a non-success result.
    ///
    /// Formats as `"<method> returned <SYMBOL> (0x<hex>)"` for recognized
    /// result codes, `"<method> returned 0x<hex>"` otherwise.
    #[error("{method} returned {code}")]
    Api {
        method: &'static str,
        code: HResult,
    },

    /// The enumeration name buffer could not be allocated.
    #[error("Failed to allocate name buffer")]
    Allocation,

    /// No LocalDB installation was found on this machine.
    #[error("SQL Server LocalDB is not installed")]
    NotInstalled,

    /// An instance API library was found but could not be loaded.
    #[error("Failed to load the LocalDB instance API: {0}")]
    Library(String),
}

/// Result type alias for LocalDB operations.
pub type Result<T> = std::result::Result<T, LocalDbError>;

impl LocalDbError {
    /// The native result code, when this error came from a native call.
    pub fn code(&self) -> Option<HResult> {
        match self {
            LocalDbError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for errors raised by argument validation, before any native call.
    pub fn is_validation(&self) -> bool {
        matches!(self, LocalDbError::InvalidArgument(_))
    }
}
