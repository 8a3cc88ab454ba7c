//! Low-level authenticated encryption.
//!
//! This module is one of exactly two places in the crate that import `ring`'s
//! cryptographic primitives directly (the other is `keys`). All other modules
//! perform encryption and decryption exclusively through the functions
//! exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption with associated data)
//! - **IV**: 96-bit (12 bytes), generated fresh per call inside `seal`
//! - **Tag**: 128-bit (16 bytes), appended to the ciphertext
//! - **Key size**: 256 bits (32 bytes)
//!
//! IV generation lives *inside* `seal` and is not a parameter: callers cannot
//! supply an IV, so reuse of an IV under the same key cannot be expressed
//! through this API at all.

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

use crate::error::PayvaultError;
use crate::random::SecureRandom;

/// The AEAD algorithm used throughout payvault.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the IV in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Encrypt a plaintext payload using AES-256-GCM.
///
/// A fresh IV is drawn from the secure random source for every call. The
/// associated data is authenticated but not encrypted; decryption with
/// different associated data fails the tag check.
///
/// Returns the IV and the ciphertext with the GCM tag appended:
/// ```text
/// ([ iv: 12 bytes ], [ ciphertext | tag: 16 bytes ])
/// ```
pub(crate) fn seal(
    random: &SecureRandom,
    key_bytes: &[u8; KEY_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<([u8; IV_LEN], Vec<u8>), PayvaultError> {
    let unbound =
        UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| PayvaultError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);

    let iv = random.iv()?;
    let nonce = Nonce::assume_unique_for_key(iv);

    let mut output = Vec::with_capacity(plaintext.len() + TAG_LEN);
    output.extend_from_slice(plaintext);

    // `seal_in_place_append_tag` encrypts `output` in place and appends the
    // GCM authentication tag.
    key.seal_in_place_append_tag(nonce, Aad::from(aad), &mut output)
        .map_err(|_| PayvaultError::EncryptionFailure)?;

    Ok((iv, output))
}

/// Decrypt a ciphertext payload using AES-256-GCM.
///
/// Expects the layout produced by `seal`: ciphertext with the GCM tag
/// appended, and the IV passed separately.
///
/// The tag is verified before any plaintext is released. A wrong key,
/// tampered IV or ciphertext, or mismatched associated data all fail with
/// the same generic [`PayvaultError::AuthenticationFailure`] — the caller
/// receives no partial plaintext and no hint of which check failed.
pub(crate) fn open(
    key_bytes: &[u8; KEY_LEN],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, PayvaultError> {
    let iv_bytes: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| PayvaultError::AuthenticationFailure)?;
    if ciphertext.len() < TAG_LEN {
        return Err(PayvaultError::AuthenticationFailure);
    }

    let unbound =
        UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| PayvaultError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);
    let nonce = Nonce::assume_unique_for_key(iv_bytes);

    let mut payload = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::from(aad), &mut payload)
        .map_err(|_| PayvaultError::AuthenticationFailure)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SecureRandom {
        SecureRandom::new()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_LEN];
        let (iv, ct) = seal(&rng(), &key, b"", b"payment data").unwrap();
        let pt = open(&key, b"", &iv, &ct).unwrap();
        assert_eq!(pt, b"payment data");
    }

    #[test]
    fn test_tamper_detection_every_region() {
        let key = [7u8; KEY_LEN];
        let (iv, ct) = seal(&rng(), &key, b"", b"payment data").unwrap();

        // Flip one bit of the IV.
        let mut bad_iv = iv;
        bad_iv[0] ^= 0x01;
        assert!(matches!(
            open(&key, b"", &bad_iv, &ct),
            Err(PayvaultError::AuthenticationFailure)
        ));

        // Flip one bit of the ciphertext body.
        let mut bad_ct = ct.clone();
        bad_ct[0] ^= 0x01;
        assert!(matches!(
            open(&key, b"", &iv, &bad_ct),
            Err(PayvaultError::AuthenticationFailure)
        ));

        // Flip one bit of the appended tag.
        let mut bad_tag = ct.clone();
        let last = bad_tag.len() - 1;
        bad_tag[last] ^= 0x01;
        assert!(matches!(
            open(&key, b"", &iv, &bad_tag),
            Err(PayvaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_associated_data_binding() {
        let key = [9u8; KEY_LEN];
        let (iv, ct) = seal(&rng(), &key, b"iban", b"NL91ABNA0417164300").unwrap();
        assert!(open(&key, b"iban", &iv, &ct).is_ok());
        assert!(matches!(
            open(&key, b"bsn", &iv, &ct),
            Err(PayvaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_iv_uniqueness() {
        // Probabilistic: 96-bit IVs over 1000 samples must not collide.
        let key = [3u8; KEY_LEN];
        let random = rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let (iv, _) = seal(&random, &key, b"", b"same plaintext").unwrap();
            assert!(seen.insert(iv), "IV collision");
        }
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = [1u8; KEY_LEN];
        let (iv, ct) = seal(&rng(), &key, b"", b"x").unwrap();
        assert!(matches!(
            open(&key, b"", &iv, &ct[..TAG_LEN - 1]),
            Err(PayvaultError::AuthenticationFailure)
        ));
    }
}
