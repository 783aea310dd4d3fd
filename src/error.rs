//! Error taxonomy for registry operations.
//!
//! Every failure surfaced to a caller maps to one [`RegistryError`] variant.
//! [`RegistryError::kind`] gives the stable name that travels over the wire.

use thiserror::Error;

/// Result alias used throughout the library.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Operation invoked with the wrong number of positional arguments.
    #[error("Incorrect number of arguments for {operation}. Expecting {expected}, got {got}")]
    ArgumentCount {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// One of two related writes/deletes succeeded while the other failed.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Chain already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Root certificate and root private key do not form a key pair")]
    RootKeyMismatch,

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl RegistryError {
    /// Stable, machine-readable error name.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::ArgumentCount { .. } => "ArgumentCountError",
            RegistryError::UnknownOperation(_) => "UnknownOperationError",
            RegistryError::NotFound(_) => "NotFoundError",
            RegistryError::Parse(_) => "ParseError",
            RegistryError::Storage(_) => "StorageError",
            RegistryError::Consistency(_) => "ConsistencyError",
            RegistryError::AlreadyRegistered(_) => "AlreadyRegisteredError",
            RegistryError::RootKeyMismatch => "RootKeyMismatchError",
            RegistryError::Crypto(_) => "CryptoError",
        }
    }
}

impl From<openssl::error::ErrorStack> for RegistryError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        RegistryError::Crypto(e.to_string())
    }
}
