//! The controller's error taxonomy.
//!
//! Every property accessor, Future terminal result, and fallible Controller
//! entry point returns (or resolves to) a [`ControllerError`]. The variants
//! map one-to-one onto the result-code taxonomy a C-style binding would
//! expose at an RPC/FFI boundary, so the mapping stays mechanical if one is
//! ever added.

use thiserror::Error;

/// The result-code taxonomy, one-to-one with what an FFI boundary would expose.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("operation timed out")]
    Timeout,

    #[error("requested data is not loaded yet")]
    NotLoaded,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("property is read-only")]
    ReadOnly,

    #[error("memory allocation failed")]
    MemoryAlloc,

    #[error("property id {0} is not a recognized enum value for this object")]
    InvalidEnum(u32),

    #[error("property accessed with the wrong primitive type")]
    InvalidType,

    #[error("index {index} is out of range (num_entries = {num_entries})")]
    OutOfRange { index: u64, num_entries: u64 },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation is still pending")]
    Pending,

    #[error("duplicate request or entry")]
    Duplicate,
}

pub type Result<T> = std::result::Result<T, ControllerError>;

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        ControllerError::Unknown(err.to_string())
    }
}
