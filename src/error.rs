//! Error types for payvault.
//!
//! Every error variant is a distinct failure mode in the protection core.
//! Messages are intentionally minimal — they signal *what* failed without
//! revealing *why* in ways that could distinguish failure causes for an
//! attacker. In particular, every authentication-related failure (wrong key,
//! tampered ciphertext, mismatched associated data) collapses into the single
//! `AuthenticationFailure` variant.

use std::fmt;

/// The single error type for all payvault operations.
#[derive(Debug)]
pub enum PayvaultError {
    /// A cryptographic key was invalid (wrong length, malformed, etc.).
    InvalidKey,

    /// The system's random number generator failed to produce bytes.
    /// This is fatal: there is no fallback generator.
    RandomnessFailure,

    /// Encryption failed. The underlying AEAD operation returned an error.
    EncryptionFailure,

    /// Decryption failed. Covers wrong key, tampered ciphertext or IV,
    /// corrupted authentication tag, and mismatched associated data.
    /// Deliberately indistinguishable between those causes.
    AuthenticationFailure,

    /// Key derivation (PBKDF2) failed.
    KeyDerivationFailure,

    /// The envelope carries a version or algorithm this engine does not
    /// recognize, or could not be decoded at all. Never a best-effort
    /// fallback.
    UnsupportedEnvelope,

    /// No key record or key material exists for the given key id.
    KeyNotFound(String),

    /// The key record exists but has been revoked.
    KeyRevoked(String),

    /// No token record exists for the given token.
    TokenNotFound,

    /// The token's expiry time has passed.
    TokenExpired,

    /// The token has already been redeemed `max_usage` times.
    TokenUsageExceeded,

    /// An RSA keypair generation, OAEP encryption, or OAEP decryption
    /// operation failed.
    AsymmetricFailure,

    /// The backing registry reported a failure.
    Storage(String),
}

impl fmt::Display for PayvaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key"),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::EncryptionFailure => write!(f, "encryption failed"),
            Self::AuthenticationFailure => write!(f, "decryption failed"),
            Self::KeyDerivationFailure => write!(f, "key derivation failed"),
            Self::UnsupportedEnvelope => write!(f, "unsupported envelope"),
            Self::KeyNotFound(id) => write!(f, "key not found: {}", id),
            Self::KeyRevoked(id) => write!(f, "key revoked: {}", id),
            Self::TokenNotFound => write!(f, "token not found"),
            Self::TokenExpired => write!(f, "token expired"),
            Self::TokenUsageExceeded => write!(f, "token usage exceeded"),
            Self::AsymmetricFailure => write!(f, "asymmetric operation failed"),
            Self::Storage(reason) => write!(f, "storage failure: {}", reason),
        }
    }
}

impl std::error::Error for PayvaultError {}
