//! Error types for the bal sockets layer

use core::fmt;
use std::io;

use crate::socket::Descriptor;

/// Result type for bal operations
pub type BalResult<T> = Result<T, BalError>;

/// Errors that can occur in socket and poller operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalError {
    /// The poller thread could not be spawned (OS code when known)
    SpawnFailed(Option<i32>),

    /// The poller is not running and was not started
    NotInitialized,

    /// The poller is shutting down; registration refused
    ShuttingDown,

    /// The watch list is at its bound
    CapacityExceeded { limit: usize },

    /// Descriptor cannot be represented in the multiplexer's sets
    DescriptorOutOfRange(Descriptor),

    /// Descriptor already has a watch entry (use update)
    AlreadyRegistered(Descriptor),

    /// Descriptor has no watch entry
    NotRegistered(Descriptor),

    /// Invalid argument passed by the caller
    InvalidArgument(&'static str),

    /// Name resolution failed
    Resolve { host: String, reason: String },

    /// OS error with its raw code
    Os(i32),

    /// I/O error without an OS code
    Io(io::ErrorKind),
}

impl BalError {
    /// Build from the calling thread's last OS error.
    pub fn last_os_error() -> Self {
        io::Error::last_os_error().into()
    }

    /// The raw OS code, if this error carries one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            BalError::Os(code) => Some(*code),
            BalError::SpawnFailed(code) => *code,
            _ => None,
        }
    }

    /// Whether the operation should be retried once the socket is ready.
    pub fn is_would_block(&self) -> bool {
        match self {
            BalError::Os(code) => {
                io::Error::from_raw_os_error(*code).kind() == io::ErrorKind::WouldBlock
            }
            BalError::Io(kind) => *kind == io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

impl fmt::Display for BalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalError::SpawnFailed(Some(code)) => {
                write!(f, "failed to spawn poller thread: {}", describe_os_error(*code))
            }
            BalError::SpawnFailed(None) => write!(f, "failed to spawn poller thread"),
            BalError::NotInitialized => write!(f, "async I/O not initialized"),
            BalError::ShuttingDown => write!(f, "async I/O shutting down"),
            BalError::CapacityExceeded { limit } => {
                write!(f, "watch list full ({} entries)", limit)
            }
            BalError::DescriptorOutOfRange(sd) => {
                write!(f, "descriptor {} out of range for the multiplexer", sd)
            }
            BalError::AlreadyRegistered(sd) => write!(f, "descriptor {} already registered", sd),
            BalError::NotRegistered(sd) => write!(f, "descriptor {} not registered", sd),
            BalError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            BalError::Resolve { host, reason } => {
                write!(f, "failed to resolve '{}': {}", host, reason)
            }
            BalError::Os(code) => write!(f, "{}", describe_os_error(*code)),
            BalError::Io(kind) => write!(f, "I/O error: {}", kind),
        }
    }
}

impl std::error::Error for BalError {}

impl From<io::Error> for BalError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(code) => BalError::Os(code),
            None => BalError::Io(e.kind()),
        }
    }
}

/// Render an OS error code as `error <code> (<message>)`.
pub fn describe_os_error(code: i32) -> String {
    format!("error {} ({})", code, io::Error::from_raw_os_error(code))
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
