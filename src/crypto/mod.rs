// Varseal - Crypto Module
//
// Canonical forms, row signatures and field sealing. Everything here is a
// pure function of its input and the process-wide key material.

pub mod canonical;
mod error;
pub mod seal;
pub mod signature;

pub use canonical::{Canonical, CanonicalForms};
pub use error::CryptoError;
pub use seal::Sealer;
pub use signature::Signer;

/// Bundle of the process-wide keys used by the storage hooks.
/// Read-only once built; shared by reference across calls.
pub struct KeyMaterial {
    pub sealer: Sealer,
    pub signer: Signer,
}

impl KeyMaterial {
    pub fn new(sealer: Sealer, signer: Signer) -> Self {
        Self { sealer, signer }
    }

    /// Build key material from raw 32-byte keys.
    pub fn from_bytes(seal_key: &[u8; 32], sign_key: &[u8; 32]) -> Self {
        Self {
            sealer: Sealer::from_bytes(seal_key),
            signer: Signer::from_bytes(sign_key),
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("sealer", &"[REDACTED]")
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
