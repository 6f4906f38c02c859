// Varseal - Enclave Module
//
// Handles platform-native master secret storage and Argon2id derivation of
// the field-sealing and row-signing keys. The master secret is stored in the
// OS keyring (Keychain/DPAPI/libsecret) and never written to the database.

mod error;
mod provider;

pub use error::EnclaveError;
pub use provider::{
    KeyringProvider, MasterKeyProvider, DEFAULT_KEYRING_SERVICE, DEFAULT_KEYRING_USER,
};

#[cfg(test)]
pub use provider::mock;
