// Varseal - Field Sealing
//
// AES-256-GCM sealing of individual column values. Each sealed value carries
// its own random nonce, and the row identity (the "context") is bound as
// associated data so a ciphertext copied onto another row fails to open.
//
// Layout: nonce (12 bytes) || ciphertext || tag (16 bytes)

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

use super::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Process-wide field sealer.
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(bytes)),
        }
    }

    /// Seal `plain`, binding it to `context`.
    pub fn seal(&self, plain: &[u8], context: &[String]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let aad = associated_data(context);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plain,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a value previously produced by [`Sealer::seal`] with the same context.
    pub fn open(
        &self,
        sealed: &[u8],
        context: &[String],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Open);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let aad = associated_data(context);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Open)
    }

    /// Seal a string and encode the result for a text column.
    pub fn seal_text(&self, plain: &str, context: &[String]) -> Result<String, CryptoError> {
        self.seal(plain.as_bytes(), context)
            .map(|sealed| BASE64.encode(sealed))
    }

    /// Inverse of [`Sealer::seal_text`].
    pub fn open_text(
        &self,
        sealed: &str,
        context: &[String],
    ) -> Result<Zeroizing<String>, CryptoError> {
        let bytes = BASE64.decode(sealed)?;
        let opened = self.open(&bytes, context)?;
        let text = String::from_utf8(opened.to_vec())?;
        Ok(Zeroizing::new(text))
    }
}

/// Length-prefixed encoding of the context, so ("ab", "c") and ("a", "bc")
/// never collide.
fn associated_data(context: &[String]) -> Vec<u8> {
    let mut aad = Vec::new();
    for part in context {
        aad.extend_from_slice(&(part.len() as u32).to_le_bytes());
        aad.extend_from_slice(part.as_bytes());
    }
    aad
}

// ─── Tests ───────────────────────────────────────────────────────────────────
