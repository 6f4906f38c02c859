// Varseal - Crypto error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Canonical template error: {0}")]
    Template(String),

    #[error("Seal failed")]
    Seal,

    #[error("Open failed: ciphertext is corrupted, truncated or bound to another row")]
    Open,

    #[error("Sealed text is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Opened value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}
