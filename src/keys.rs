//! Key derivation, key metadata, and the custodian boundary.
//!
//! This module owns three responsibilities:
//! 1. Deriving per-field-type symmetric keys from the master key using
//!    PBKDF2-HMAC-SHA256.
//! 2. Holding key material in types that are opaque, non-cloneable, and
//!    zeroised on drop.
//! 3. Defining the [`KeyCustodian`] boundary through which all raw key
//!    material is stored and retrieved.
//!
//! This is one of exactly two modules permitted to import `ring` primitives
//! directly (the other is `crypto`). The derivation logic lives here because
//! it operates on key material itself — not on ciphertexts.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     secret     = master_key,
//!     salt       = "field:{field_type}",
//!     iterations = 100_000,
//!     out_len    = 32 bytes
//! )
//! ```
//!
//! Each field type (`iban`, `bsn`, `credit_card`, ...) produces a distinct,
//! deterministic key. The engine can therefore decrypt a field envelope
//! without persisting a key per field instance — at the cost that rotating
//! the master key invalidates every field envelope at once. Data keys for
//! whole-record encryption are random, never derived, and retrievable only
//! through the custodian: a key id carries no information about its key.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ring::{digest, pbkdf2};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;
use crate::error::PayvaultError;
use crate::random::SecureRandom;

/// PBKDF2 iteration count for field-key derivation. Deliberately slow.
pub const KDF_ITERATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// The master key. The single secret from which every field key is derived.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop. Memory is overwritten before deallocation.
///
/// In production the bytes should come from an HSM/KMS-backed
/// [`KeyCustodian`]; [`crate::generate_master_key`] exists for provisioning
/// and tests. There is no default master key anywhere in the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Construct a `MasterKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Borrow the raw key bytes for use in derivation.
    ///
    /// `pub(crate)` — raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A symmetric key held in memory for the duration of one operation: either
/// derived for a field type, or reconstructed from the custodian for a
/// whole-record data key.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Raw bytes never leave the crate; other modules access them only through
///   `as_bytes()`, which is `pub(crate)`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Derivation and fingerprinting
// ---------------------------------------------------------------------------

/// Derive the key for a semantic field type.
///
/// Deterministic: the same `(master, field_type)` pair always yields the
/// same key, so field envelopes need no per-instance key records.
///
/// # Security properties
/// - PBKDF2 is one-way: the derived key reveals nothing about the master key.
/// - Different field types produce statistically independent keys.
/// - The iteration count makes brute-forcing the master from a derived key
///   deliberately expensive.
pub(crate) fn derive_field_key(
    master: &MasterKey,
    field_type: &str,
) -> Result<DerivedKey, PayvaultError> {
    let iterations =
        NonZeroU32::new(KDF_ITERATIONS).ok_or(PayvaultError::KeyDerivationFailure)?;
    let salt = format!("field:{}", field_type);

    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt.as_bytes(),
        master.as_bytes(),
        &mut bytes,
    );
    Ok(DerivedKey { bytes })
}

/// Compute the non-reversible fingerprint of a key: hex-encoded SHA-256 of
/// the raw key bytes. This is the only form in which key material may appear
/// in a persisted record or audit event.
pub(crate) fn fingerprint(key_bytes: &[u8; KEY_LEN]) -> String {
    let hash = digest::digest(&digest::SHA256, key_bytes);
    hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// Key metadata
// ---------------------------------------------------------------------------

/// Lifecycle status of a data key. Rotation is monotonic: `active` moves to
/// `rotated` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Usable for new encryptions and for decryption.
    Active,
    /// Superseded by rotation; still usable for decryption of existing
    /// envelopes until a caller-driven migration re-encrypts them.
    Rotated,
    /// Fails closed for every operation.
    Revoked,
}

/// Persisted metadata about a data key. Never contains the raw key — only
/// its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: String,
    pub fingerprint: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
}

impl KeyRecord {
    pub(crate) fn new(key_id: String, fingerprint: String, created_at: DateTime<Utc>) -> Self {
        Self {
            key_id,
            fingerprint,
            algorithm: crate::envelope::ALGORITHM_AES_256_GCM.to_string(),
            created_at,
            status: KeyStatus::Active,
        }
    }
}

// ---------------------------------------------------------------------------
// Custodian boundary
// ---------------------------------------------------------------------------

/// The trusted custodian of raw key material.
///
/// Everything on the far side of this trait is assumed to be an HSM, a KMS,
/// or an equivalently trusted store. The engine can only *ask* for key
/// material here; it has no way to reconstruct a key from its id, and the
/// registry holds metadata only. Implementations handle raw bytes by
/// definition — this trait is the one sanctioned crossing point.
pub trait KeyCustodian: Send + Sync {
    /// Retrieve the master key used for field-key derivation.
    fn master_key(&self) -> Result<MasterKey, PayvaultError>;

    /// Store the raw material of a freshly generated data key under its id.
    fn store_data_key(&self, key_id: &str, key: &[u8; KEY_LEN]) -> Result<(), PayvaultError>;

    /// Fetch the raw material of a data key, or `None` if the custodian has
    /// no material for this id.
    fn fetch_data_key(&self, key_id: &str) -> Result<Option<[u8; KEY_LEN]>, PayvaultError>;
}

/// In-process custodian for tests and development.
///
/// Holds the master key and data keys in memory, zeroised on drop. A fresh
/// random master key is generated per instance — there is deliberately no
/// fixed default.
pub struct MemoryCustodian {
    master: [u8; KEY_LEN],
    data_keys: Mutex<HashMap<String, [u8; KEY_LEN]>>,
}

impl MemoryCustodian {
    /// Create a custodian with a freshly generated random master key.
    pub fn new() -> Result<Self, PayvaultError> {
        let random = SecureRandom::new();
        Ok(Self {
            master: random.key_bytes()?,
            data_keys: Mutex::new(HashMap::new()),
        })
    }

    /// Create a custodian around an existing master key, e.g. one
    /// provisioned out-of-band.
    pub fn with_master_key(master: MasterKey) -> Self {
        Self {
            master: *master.as_bytes(),
            data_keys: Mutex::new(HashMap::new()),
        }
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, [u8; KEY_LEN]>>, PayvaultError> {
        self.data_keys
            .lock()
            .map_err(|_| PayvaultError::Storage("custodian mutex poisoned".into()))
    }
}

impl KeyCustodian for MemoryCustodian {
    fn master_key(&self) -> Result<MasterKey, PayvaultError> {
        Ok(MasterKey::from_bytes(self.master))
    }

    fn store_data_key(&self, key_id: &str, key: &[u8; KEY_LEN]) -> Result<(), PayvaultError> {
        self.locked()?.insert(key_id.to_string(), *key);
        Ok(())
    }

    fn fetch_data_key(&self, key_id: &str) -> Result<Option<[u8; KEY_LEN]>, PayvaultError> {
        Ok(self.locked()?.get(key_id).copied())
    }
}

impl Drop for MemoryCustodian {
    fn drop(&mut self) {
        self.master.zeroize();
        if let Ok(mut keys) = self.data_keys.lock() {
            for key in keys.values_mut() {
                key.zeroize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_is_deterministic() {
        let master = MasterKey::from_bytes([1u8; KEY_LEN]);
        let a = derive_field_key(&master, "iban").unwrap();
        let b = derive_field_key(&master, "iban").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_field_types_yield_distinct_keys() {
        let master = MasterKey::from_bytes([1u8; KEY_LEN]);
        let iban = derive_field_key(&master, "iban").unwrap();
        let bsn = derive_field_key(&master, "bsn").unwrap();
        assert_ne!(iban.as_bytes(), bsn.as_bytes());
    }

    #[test]
    fn test_different_masters_yield_distinct_keys() {
        let a = derive_field_key(&MasterKey::from_bytes([1u8; KEY_LEN]), "iban").unwrap();
        let b = derive_field_key(&MasterKey::from_bytes([2u8; KEY_LEN]), "iban").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_fingerprint_is_not_the_key() {
        let key = [5u8; KEY_LEN];
        let fp = fingerprint(&key);
        assert_eq!(fp.len(), 64); // hex SHA-256
        let key_hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        assert_ne!(fp, key_hex);
    }

    #[test]
    fn test_memory_custodian_roundtrip() {
        let custodian = MemoryCustodian::new().unwrap();
        custodian.store_data_key("k1", &[9u8; KEY_LEN]).unwrap();
        assert_eq!(custodian.fetch_data_key("k1").unwrap(), Some([9u8; KEY_LEN]));
        assert_eq!(custodian.fetch_data_key("missing").unwrap(), None);
    }
}
