//! The self-describing symmetric envelope.
//!
//! Every ciphertext the engine produces is wrapped in a versioned container
//! carrying the algorithm id, IV, ciphertext-with-tag, key reference,
//! creation time, and data classification. Everything except the key itself
//! is safe to store or transmit.
//!
//! Wire form: canonical JSON, then standard base64. Round-trips byte-exact.
//! Decrypting an envelope whose version or algorithm the engine does not
//! recognize is a hard failure, never a best-effort fallback.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayvaultError;

/// The only envelope version this engine writes or reads.
pub const ENVELOPE_VERSION: u8 = 1;

/// The only algorithm id this engine writes or reads.
pub const ALGORITHM_AES_256_GCM: &str = "AES-256-GCM";

/// How the decryption key for an envelope is found.
///
/// The two reference kinds are deliberately separate variants: a record
/// envelope cannot be reinterpreted as a field envelope (or vice versa)
/// without changing the serialized form, and the field type is additionally
/// bound into the AEAD associated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyReference {
    /// A data key resolvable through the registry and custodian.
    KeyId(String),
    /// A semantic field type (`iban`, `bsn`, `credit_card`, ...) whose key
    /// is derived from the master key. Doubles as the AEAD associated data.
    FieldType(String),
}

/// Advisory classification of the protected data. Stored in the clear;
/// never part of a token identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Payment,
    Identity,
    General,
}

/// A versioned container for one AES-256-GCM ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    pub algorithm: String,
    /// 96-bit IV, unique per encryption call.
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    /// Ciphertext with the 128-bit GCM tag appended.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    pub key_reference: KeyReference,
    pub created_at: DateTime<Utc>,
    pub classification: Classification,
}

impl Envelope {
    pub(crate) fn new(
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
        key_reference: KeyReference,
        classification: Classification,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            algorithm: ALGORITHM_AES_256_GCM.to_string(),
            iv,
            ciphertext,
            key_reference,
            created_at,
            classification,
        }
    }

    /// Serialize to the wire form: JSON, then base64.
    pub fn encode(&self) -> Result<String, PayvaultError> {
        let json = serde_json::to_vec(self).map_err(|_| PayvaultError::UnsupportedEnvelope)?;
        Ok(BASE64.encode(json))
    }

    /// Parse the wire form produced by [`Envelope::encode`].
    ///
    /// A payload that is not valid base64/JSON, or that carries an unknown
    /// version or algorithm, fails with `UnsupportedEnvelope`.
    pub fn decode(encoded: &str) -> Result<Self, PayvaultError> {
        let json = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| PayvaultError::UnsupportedEnvelope)?;
        let envelope: Envelope =
            serde_json::from_slice(&json).map_err(|_| PayvaultError::UnsupportedEnvelope)?;
        envelope.check_supported()?;
        Ok(envelope)
    }

    /// Reject envelopes this engine cannot interpret. Called before any
    /// decryption attempt.
    pub(crate) fn check_supported(&self) -> Result<(), PayvaultError> {
        if self.version != ENVELOPE_VERSION || self.algorithm != ALGORITHM_AES_256_GCM {
            return Err(PayvaultError::UnsupportedEnvelope);
        }
        Ok(())
    }
}

/// Serde adapter: binary fields as base64 strings inside the JSON form.
mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
