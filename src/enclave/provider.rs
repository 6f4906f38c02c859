// Varseal - Master Key Provider
//
// Manages the lifecycle of the master secret from which the field-sealing and
// row-signing keys are derived. The master secret is stored in the platform's
// native keyring and never exposed in logs or debug output.
//
// Flow:
//   1. `get_or_create_master_secret()` retrieves from keyring, or generates and stores a new one
//   2. `derive_key_material()` runs Argon2id twice with domain-separated salts
//   3. The resulting `KeyMaterial` is shared by reference with the store

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::KeyMaterial;

use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default service name for the keyring entry.
pub const DEFAULT_KEYRING_SERVICE: &str = "varseal-master-key";

/// Default username for the keyring entry.
pub const DEFAULT_KEYRING_USER: &str = "master-secret";

/// Length of the randomly generated master secret in bytes (256-bit entropy).
const MASTER_SECRET_LEN: usize = 32;

/// Length of each derived key in bytes.
const DERIVED_KEY_LEN: usize = 32;

// Argon2id parameters: m=65536 (64 MiB), t=3, p=4
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

const SEAL_DOMAIN: &[u8] = b"field-seal";
const SIGN_DOMAIN: &[u8] = b"row-sign";

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over master secret storage, enabling platform-specific backends
/// and mock implementations for testing.
pub trait MasterKeyProvider {
    /// Retrieve the master secret, generating and storing one on first run.
    fn get_or_create_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Retrieve the master secret. Fails with `MasterSecretNotFound` if absent.
    fn load_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Check if a master secret already exists.
    fn has_master_secret(&self) -> Result<bool, EnclaveError>;

    /// Delete the master secret.
    /// WARNING: every sealed value and signature becomes unreadable.
    fn delete_master_secret(&self) -> Result<(), EnclaveError>;

    /// Installation-specific input mixed into both derivation salts.
    fn salt_seed(&self) -> Vec<u8>;

    /// Derive the sealing and signing keys from the master secret.
    fn derive_key_material(&self, master_secret: &[u8]) -> Result<KeyMaterial, EnclaveError> {
        if master_secret.len() != MASTER_SECRET_LEN {
            return Err(EnclaveError::InvalidLength(
                master_secret.len(),
                MASTER_SECRET_LEN,
            ));
        }

        let seed = self.salt_seed();
        let seal_key = derive_subkey(master_secret, &seed, SEAL_DOMAIN)?;
        let sign_key = derive_subkey(master_secret, &seed, SIGN_DOMAIN)?;
        tracing::debug!("Key material derived");
        Ok(KeyMaterial::from_bytes(&seal_key, &sign_key))
    }
}

/// Salt = SHA-256(seed || "::" || domain). Distinct domains give independent keys.
fn build_salt(seed: &[u8], domain: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(b"::");
    hasher.update(domain);
    hasher.finalize().to_vec()
}

fn derive_subkey(
    master_secret: &[u8],
    seed: &[u8],
    domain: &[u8],
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, EnclaveError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(DERIVED_KEY_LEN))
        .map_err(|e| EnclaveError::Derivation(format!("invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon2
        .hash_password_into(master_secret, &build_salt(seed, domain), &mut key[..])
        .map_err(|e| EnclaveError::Derivation(format!("Argon2id hash failed: {}", e)))?;
    Ok(key)
}

fn generate_master_secret() -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
    rand::rng().fill_bytes(&mut secret);
    secret
}

// ─── Platform Implementation ─────────────────────────────────────────────────

/// Production implementation using the `keyring` crate.
/// Dispatches to:
///   - Linux: D-Bus Secret Service (GNOME Keyring / KDE Wallet)
///   - macOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
pub struct KeyringProvider {
    service: String,
    user: String,
}

impl KeyringProvider {
    pub fn new(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| EnclaveError::Keyring(format!("failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE, DEFAULT_KEYRING_USER)
    }
}

impl MasterKeyProvider for KeyringProvider {
    fn get_or_create_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        match self.load_master_secret() {
            Ok(secret) => Ok(secret),
            Err(EnclaveError::MasterSecretNotFound) => {
                tracing::info!("No master secret found, generating a new one");
                let secret = generate_master_secret();
                self.entry()?.set_secret(&secret).map_err(|e| {
                    EnclaveError::Keyring(format!("failed to store master secret: {}", e))
                })?;
                tracing::info!(service = %self.service, "Master secret stored in platform keyring");
                Ok(secret)
            }
            Err(e) => Err(e),
        }
    }

    fn load_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        match self.entry()?.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved existing master secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => Err(EnclaveError::MasterSecretNotFound),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    fn has_master_secret(&self) -> Result<bool, EnclaveError> {
        match self.load_master_secret() {
            Ok(_) => Ok(true),
            Err(EnclaveError::MasterSecretNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_master_secret(&self) -> Result<(), EnclaveError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                tracing::warn!("Master secret deleted from keyring, sealed values are now unreadable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No master secret to delete");
                Ok(())
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to delete master secret: {}",
                e
            ))),
        }
    }

    fn salt_seed(&self) -> Vec<u8> {
        format!("{}::{}", self.service, self.user).into_bytes()
    }
}

// ─── In-Memory Mock for Testing ──────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::MockKeyProvider;
    use super::*;
    use crate::crypto::CanonicalForms;

    fn forms() -> CanonicalForms {
        CanonicalForms::render(&["{ID}"], &[("ID", "1".to_string())]).unwrap()
    }

    #[test]
    fn test_master_secret_generation_has_correct_entropy() {
        let provider = MockKeyProvider::new();
        let secret = provider.get_or_create_master_secret().unwrap();
        assert_eq!(
            secret.len(),
            MASTER_SECRET_LEN,
            "Master secret must be exactly {} bytes (256-bit entropy)",
            MASTER_SECRET_LEN
        );
    }

    #[test]
    fn test_master_secret_is_stable_once_created() {
        let provider = MockKeyProvider::new();
        let first = provider.get_or_create_master_secret().unwrap();
        let second = provider.get_or_create_master_secret().unwrap();
        assert_eq!(first.as_slice(), second.as_slice());
    }

    #[test]
    fn test_load_without_secret_is_not_found() {
        let provider = MockKeyProvider::new();
        assert!(matches!(
            provider.load_master_secret(),
            Err(EnclaveError::MasterSecretNotFound)
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let provider = MockKeyProvider::with_secret(vec![42u8; MASTER_SECRET_LEN]);
        let master = provider.load_master_secret().unwrap();

        let a = provider.derive_key_material(&master).unwrap();
        let b = provider.derive_key_material(&master).unwrap();

        let token = a.signer.sign(&forms());
        assert!(b.signer.verify(&forms(), &token));

        let sealed = a.sealer.seal(b"value", &["1".to_string()]).unwrap();
        let opened = b.sealer.open(&sealed, &["1".to_string()]).unwrap();
        assert_eq!(opened.as_slice(), b"value");
    }

    #[test]
    fn test_different_secrets_produce_different_keys() {
        let provider = MockKeyProvider::new();
        let a = provider
            .derive_key_material(&[1u8; MASTER_SECRET_LEN])
            .unwrap();
        let b = provider
            .derive_key_material(&[2u8; MASTER_SECRET_LEN])
            .unwrap();
        assert_ne!(a.signer.verifying_key(), b.signer.verifying_key());
    }

    #[test]
    fn test_seal_and_sign_keys_are_domain_separated() {
        let master = [7u8; MASTER_SECRET_LEN];
        let seed = b"seed".to_vec();
        let seal_key = derive_subkey(&master, &seed, SEAL_DOMAIN).unwrap();
        let sign_key = derive_subkey(&master, &seed, SIGN_DOMAIN).unwrap();
        assert_ne!(*seal_key, *sign_key);
    }

    #[test]
    fn test_wrong_length_secret_is_rejected() {
        let provider = MockKeyProvider::new();
        assert!(matches!(
            provider.derive_key_material(&[0u8; 5]),
            Err(EnclaveError::InvalidLength(5, MASTER_SECRET_LEN))
        ));
    }

    #[test]
    fn test_delete_master_secret() {
        let provider = MockKeyProvider::new();
        provider.get_or_create_master_secret().unwrap();
        assert!(provider.has_master_secret().unwrap());

        provider.delete_master_secret().unwrap();
        assert!(!provider.has_master_secret().unwrap());
        assert!(provider.delete_master_secret().is_ok());
    }

    #[test]
    fn test_keyring_salt_seed_tracks_names() {
        let a = KeyringProvider::new("svc-a", "user");
        let b = KeyringProvider::default();
        assert_ne!(a.salt_seed(), b.salt_seed());
        assert_eq!(b.salt_seed(), b"varseal-master-key::master-secret".to_vec());
    }
}
