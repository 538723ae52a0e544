//! Cryptography error types.

use thiserror::Error;

/// Errors raised while sealing or opening a password-protected payload.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The ciphertext is not a payload produced by [`crate::encrypt`].
    #[error("Invalid encrypted payload format")]
    InvalidFormat,

    /// Authentication failed; the password does not match.
    #[error("Wrong password")]
    WrongPassword,

    /// The password could not be stretched into a key.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// The cipher rejected the plaintext.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decrypted bytes are not valid UTF-8.
    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
