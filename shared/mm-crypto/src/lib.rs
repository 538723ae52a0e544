//! Murmur Message Cryptography
//!
//! Password-protected message bodies.
//!
//! A message sender may attach a password to a message. The text (and any
//! image or attachment URLs) are then sealed with a key derived from that
//! password, and only someone presenting the same password can open them.
//! Opening with the wrong password fails with [`CryptoError::WrongPassword`],
//! which callers use as the password check.

pub mod error;
pub mod password;

pub use error::{CryptoError, Result};
pub use password::{decrypt, encrypt};
