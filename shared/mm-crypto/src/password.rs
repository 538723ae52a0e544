//! Password Cipher
//!
//! AES-256-GCM with a key stretched from the password by Argon2id.
//!
//! Payload layout (base64, standard alphabet):
//! `salt(16 bytes) || nonce(12 bytes) || ciphertext || tag(16 bytes)`
//!
//! Every call to [`encrypt`] draws a fresh salt and nonce, so the same
//! plaintext and password never produce the same payload twice.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Seal `plaintext` with a key derived from `password`.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&*key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(combined))
}

/// Open a payload produced by [`encrypt`].
///
/// Returns [`CryptoError::WrongPassword`] when the authentication tag does
/// not verify, which is the only way a mismatched password shows up.
pub fn decrypt(payload: &str, password: &str) -> Result<String> {
    let combined = STANDARD
        .decode(payload.trim())
        .map_err(|_| CryptoError::InvalidFormat)?;

    if combined.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&*key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::WrongPassword)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}
