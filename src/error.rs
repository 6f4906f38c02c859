// Varseal - Top-level error types
//
// Aggregates errors from the config, enclave, crypto and store modules into a
// single error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Varseal operations.
#[derive(Debug, Error)]
pub enum VarsealError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Enclave error: {0}")]
    Enclave(#[from] crate::enclave::EnclaveError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VarsealError>;
