// Varseal - Store error types
//
// Integrity, Sealing and Serialization abort the current storage operation.
// LegacyDecode is only ever constructed inside the project read hook, where
// it is logged and healed instead of propagated.

use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity check failed for {table} row {id}: signature does not match")]
    Integrity { table: &'static str, id: i64 },

    #[error("Sealing failed for {table} row {id}: {source}")]
    Sealing {
        table: &'static str,
        id: i64,
        #[source]
        source: CryptoError,
    },

    #[error("Canonical form error: {0}")]
    Canonical(#[from] CryptoError),

    #[error("Legacy document could not be decoded: {0}")]
    LegacyDecode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Entity type {0} is not registered")]
    Unregistered(&'static str),

    #[error("Table {0} holds signed rows and must be written through the signing path")]
    SignatureRequired(&'static str),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// True for the tamper-evidence failure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}
