//! Asymmetric key exchange.
//!
//! RSA-2048 with OAEP (SHA-256) padding, for exchanging short secrets —
//! symmetric keys, tokens — with counterparties that cannot share a
//! symmetric key directly. Bulk payloads stay on the AES-GCM path; OAEP
//! caps the plaintext at well under the modulus size by design.
//!
//! Keypairs are ephemeral: the crate never persists private key material.
//! Ownership rests entirely with the caller that requested generation.

use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::PayvaultError;

/// RSA modulus size in bits. 2048 minimum per the engine's contract.
pub const RSA_KEY_BITS: usize = 2048;

/// An ephemeral RSA keypair. Not serialized or stored by the crate.
pub struct ExchangeKeyPair {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

/// Generate a fresh RSA-2048 keypair (public exponent 65537).
///
/// Key generation draws from the OS RNG. Generation is CPU-heavy
/// (hundreds of milliseconds); callers should reuse a pair for the
/// lifetime of an exchange session rather than generating per message.
pub fn generate_key_pair() -> Result<ExchangeKeyPair, PayvaultError> {
    let mut rng = rand::rngs::OsRng;
    let private =
        RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|_| PayvaultError::AsymmetricFailure)?;
    let public = RsaPublicKey::from(&private);
    Ok(ExchangeKeyPair { public, private })
}

/// Encrypt a short secret under a counterparty's public key using
/// OAEP-SHA256. Never raw/textbook RSA.
pub fn encrypt_with_public_key(
    public: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, PayvaultError> {
    let mut rng = rand::rngs::OsRng;
    public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| PayvaultError::AsymmetricFailure)
}

/// Decrypt an OAEP-SHA256 ciphertext with the private key. Any padding or
/// size failure surfaces as the generic `AsymmetricFailure`.
pub fn decrypt_with_private_key(
    private: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>, PayvaultError> {
    private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| PayvaultError::AsymmetricFailure)
}
