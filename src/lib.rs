// Varseal - Library root
//
// Re-exports the crypto, model, store, enclave, config and CLI modules.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod enclave;
pub mod error;
pub mod model;
pub mod store;

pub use config::VarsealConfig;
pub use crypto::KeyMaterial;
pub use error::{Result, VarsealError};
pub use store::{Database, ProjectStore, SqliteProjectStore};
