//! The secure random source.
//!
//! `ring::rand::SystemRandom` is the only source of randomness in the crate.
//! Every IV, data key, and master key is drawn from it. If the platform
//! entropy source is unavailable the call fails with
//! [`PayvaultError::RandomnessFailure`] — there is no fallback to a weaker
//! generator, because any IV or key drawn from a weak source would invalidate
//! every other guarantee the engine makes.

use ring::rand::{SecureRandom as _, SystemRandom};

use crate::crypto::{IV_LEN, KEY_LEN};
use crate::error::PayvaultError;

/// Handle to the OS entropy source. Cheap to construct and to share.
#[derive(Clone)]
pub struct SecureRandom {
    rng: SystemRandom,
}

impl SecureRandom {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Fill `buf` with cryptographically secure random bytes.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), PayvaultError> {
        self.rng
            .fill(buf)
            .map_err(|_| PayvaultError::RandomnessFailure)
    }

    /// Return `n` cryptographically secure random bytes.
    pub fn bytes(&self, n: usize) -> Result<Vec<u8>, PayvaultError> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Generate raw material for a 256-bit symmetric key.
    pub(crate) fn key_bytes(&self) -> Result<[u8; KEY_LEN], PayvaultError> {
        let mut key = [0u8; KEY_LEN];
        self.fill(&mut key)?;
        Ok(key)
    }

    /// Generate a fresh 96-bit IV. One per encryption call, never reused.
    pub(crate) fn iv(&self) -> Result<[u8; IV_LEN], PayvaultError> {
        let mut iv = [0u8; IV_LEN];
        self.fill(&mut iv)?;
        Ok(iv)
    }
}

impl Default for SecureRandom {
    fn default() -> Self {
        Self::new()
    }
}
