//! # payvault
//!
//! Payment data protection core.
//!
//! Sensitive payment and identity data is protected with authenticated
//! encryption (AES-256-GCM envelopes), per-field key derivation, RSA-OAEP
//! key exchange, and a single-use tokenization layer that maps opaque
//! tokens to encrypted payloads with strict usage and expiry semantics.
//!
//! The engine is an explicitly constructed [`Vault`] instance holding only
//! its collaborator handles — secure random source, key custodian, and key
//! registry. There are no process-wide singletons. Key material is
//! retrievable only through the [`keys::KeyCustodian`] boundary; a key id
//! carries no information about its key.
//!
//! ## Public API
//!
//! The public surface of this crate is intentionally narrow. Raw key bytes
//! never cross it: callers hand the vault plaintext and get back envelopes,
//! tokens, and typed errors. Everything below the module level that touches
//! key material is `pub(crate)` at most.

// Module declarations.
pub mod audit;
pub(crate) mod crypto;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod keys;
pub mod random;
pub mod registry;
pub mod token;

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::audit::{AuditEvent, AuditLog, AuditSink, EventType, Severity};
use crate::crypto::KEY_LEN;
use crate::envelope::{Classification, Envelope, KeyReference};
use crate::error::PayvaultError;
use crate::keys::{KeyCustodian, KeyRecord, KeyStatus, MasterKey};
use crate::random::SecureRandom;
use crate::registry::{ConsumeOutcome, Registry};
use crate::token::TokenRecord;

/// Generate a cryptographically secure master key.
///
/// Intended for provisioning a custodian and for tests. In production,
/// master keys should live inside a dedicated KMS/HSM behind a
/// [`keys::KeyCustodian`] implementation rather than being generated and
/// handled locally.
pub fn generate_master_key() -> Result<MasterKey, PayvaultError> {
    let bytes = SecureRandom::new().key_bytes()?;
    Ok(MasterKey::from_bytes(bytes))
}

/// The protection engine.
///
/// Stateless between calls except for what its collaborators persist: key
/// metadata and token records live in the [`Registry`], raw key material
/// behind the [`KeyCustodian`]. All methods take `&self`; the only internal
/// mutability is the audit log's mutex, so a `Vault` can be shared across
/// threads in an `Arc` and called concurrently.
pub struct Vault {
    random: SecureRandom,
    custodian: Arc<dyn KeyCustodian>,
    registry: Arc<dyn Registry>,
    audit: Mutex<AuditLog>,
}

impl Vault {
    /// Construct an engine around its collaborators.
    pub fn new(custodian: Arc<dyn KeyCustodian>, registry: Arc<dyn Registry>) -> Self {
        Self {
            random: SecureRandom::new(),
            custodian,
            registry,
            audit: Mutex::new(AuditLog::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Key management
    // -----------------------------------------------------------------------

    /// Generate a fresh data key: random 256-bit material handed to the
    /// custodian, metadata (fingerprint, never the key) persisted to the
    /// registry with status `active`.
    ///
    /// Returns the key id. The raw key stays behind the custodian boundary.
    pub fn generate_data_key(&self) -> Result<String, PayvaultError> {
        let (key_id, _key) = self.create_data_key()?;
        Ok(key_id)
    }

    /// Mark every `active` key record `rotated` and generate a fresh data
    /// key to take over for new encryptions. Rotation is monotonic — a
    /// rotated key never becomes active again — and non-destructive:
    /// existing envelopes stay decryptable until a caller-driven migration
    /// re-encrypts them.
    ///
    /// Returns the number of keys rotated.
    pub fn rotate_keys(&self) -> Result<usize, PayvaultError> {
        let mut rotated = 0usize;
        for mut record in self.registry.key_records()? {
            if record.status == KeyStatus::Active {
                record.status = KeyStatus::Rotated;
                self.registry.put_key_record(record)?;
                rotated += 1;
            }
        }
        let (new_key_id, _key) = self.create_data_key()?;
        self.audit(AuditEvent::new(
            EventType::KeyRotated,
            new_key_id,
            Severity::Security,
            format!("rotated {} active key(s)", rotated),
        ));
        Ok(rotated)
    }

    /// Revoke a key. Every later attempt to decrypt under it fails closed
    /// with `KeyRevoked`.
    pub fn revoke_key(&self, key_id: &str) -> Result<(), PayvaultError> {
        let mut record = self
            .registry
            .get_key_record(key_id)?
            .ok_or_else(|| PayvaultError::KeyNotFound(key_id.to_string()))?;
        record.status = KeyStatus::Revoked;
        self.registry.put_key_record(record)?;
        self.audit(AuditEvent::new(
            EventType::KeyRevoked,
            key_id,
            Severity::Security,
            "key revoked",
        ));
        Ok(())
    }

    /// Look up the persisted metadata for a key.
    pub fn key_record(&self, key_id: &str) -> Result<Option<KeyRecord>, PayvaultError> {
        self.registry.get_key_record(key_id)
    }

    /// Generate key material, register its metadata, and audit the event.
    fn create_data_key(&self) -> Result<(String, Zeroizing<[u8; KEY_LEN]>), PayvaultError> {
        let key = Zeroizing::new(self.random.key_bytes()?);
        let key_id = Uuid::new_v4().to_string();
        let fingerprint = keys::fingerprint(&key);

        self.custodian.store_data_key(&key_id, &key)?;
        self.registry
            .put_key_record(KeyRecord::new(key_id.clone(), fingerprint, Utc::now()))?;
        self.audit(AuditEvent::new(
            EventType::KeyGenerated,
            key_id.clone(),
            Severity::Info,
            "data key generated",
        ));
        Ok((key_id, key))
    }

    /// Reconstruct the material for a data key, failing closed on missing
    /// or revoked records. The material comes exclusively from the
    /// custodian — never from the key id itself.
    fn resolve_data_key(&self, key_id: &str) -> Result<Zeroizing<[u8; KEY_LEN]>, PayvaultError> {
        let record = self
            .registry
            .get_key_record(key_id)?
            .ok_or_else(|| PayvaultError::KeyNotFound(key_id.to_string()))?;
        if record.status == KeyStatus::Revoked {
            return Err(PayvaultError::KeyRevoked(key_id.to_string()));
        }
        let bytes = self
            .custodian
            .fetch_data_key(key_id)?
            .ok_or_else(|| PayvaultError::KeyNotFound(key_id.to_string()))?;
        Ok(Zeroizing::new(bytes))
    }

    // -----------------------------------------------------------------------
    // Record encryption (unique data key per record)
    // -----------------------------------------------------------------------

    /// Encrypt a whole record under a fresh data key, so every record has a
    /// unique, individually revocable key.
    pub fn encrypt_record(
        &self,
        plaintext: &[u8],
        classification: Classification,
    ) -> Result<Envelope, PayvaultError> {
        let (key_id, key) = self.create_data_key()?;
        let (iv, ciphertext) = crypto::seal(&self.random, &key, b"", plaintext)?;
        Ok(Envelope::new(
            iv.to_vec(),
            ciphertext,
            KeyReference::KeyId(key_id),
            classification,
            Utc::now(),
        ))
    }

    /// Decrypt a record envelope. Fails closed — and audits the failure —
    /// on an unsupported envelope, a missing or revoked key, or any
    /// authentication mismatch. No partial plaintext is ever returned.
    pub fn decrypt_record(&self, envelope: &Envelope) -> Result<Vec<u8>, PayvaultError> {
        envelope.check_supported()?;
        let key_id = match &envelope.key_reference {
            KeyReference::KeyId(key_id) => key_id,
            // A field envelope handed to the record path is treated exactly
            // like any other authentication mismatch.
            KeyReference::FieldType(_) => {
                self.audit_decryption_failure("record");
                return Err(PayvaultError::AuthenticationFailure);
            }
        };
        let key = self.resolve_data_key(key_id)?;
        crypto::open(&key, b"", &envelope.iv, &envelope.ciphertext).map_err(|err| {
            self.audit_decryption_failure(key_id);
            err
        })
    }

    // -----------------------------------------------------------------------
    // Field encryption (deterministic key per field type)
    // -----------------------------------------------------------------------

    /// Encrypt a single field value under the key derived for its semantic
    /// type. The field type is bound into the AEAD associated data, so the
    /// ciphertext cannot be silently reinterpreted as a different field
    /// type.
    pub fn encrypt_field(
        &self,
        plaintext: &[u8],
        field_type: &str,
        classification: Classification,
    ) -> Result<Envelope, PayvaultError> {
        let master = self.custodian.master_key()?;
        let key = keys::derive_field_key(&master, field_type)?;
        let (iv, ciphertext) =
            crypto::seal(&self.random, key.as_bytes(), field_type.as_bytes(), plaintext)?;
        Ok(Envelope::new(
            iv.to_vec(),
            ciphertext,
            KeyReference::FieldType(field_type.to_string()),
            classification,
            Utc::now(),
        ))
    }

    /// Decrypt a field envelope. The caller must re-supply the field type;
    /// both the derived key and the associated data come from the supplied
    /// value, so a mismatch with the type used at encryption time fails
    /// authentication.
    pub fn decrypt_field(
        &self,
        envelope: &Envelope,
        field_type: &str,
    ) -> Result<Vec<u8>, PayvaultError> {
        envelope.check_supported()?;
        let master = self.custodian.master_key()?;
        let key = keys::derive_field_key(&master, field_type)?;
        crypto::open(
            key.as_bytes(),
            field_type.as_bytes(),
            &envelope.iv,
            &envelope.ciphertext,
        )
        .map_err(|err| {
            self.audit_decryption_failure(&format!("field:{}", field_type));
            err
        })
    }

    // -----------------------------------------------------------------------
    // Tokenization
    // -----------------------------------------------------------------------

    /// Issue a single-use (or `max_usage`-use), time-boxed token for a
    /// payload. The payload is encrypted under a fresh data key; one token
    /// record is written; the returned identifier is 128 bits of randomness
    /// in UUID form and encodes nothing about the payload.
    pub fn issue_token(
        &self,
        payload: &[u8],
        ttl: Duration,
        max_usage: u32,
        classification: Classification,
    ) -> Result<String, PayvaultError> {
        // A zero-use token would be born dead; the floor is one redemption.
        let max_usage = max_usage.max(1);

        let (key_id, key) = self.create_data_key()?;
        let (iv, ciphertext) = crypto::seal(&self.random, &key, b"", payload)?;
        let envelope = Envelope::new(
            iv.to_vec(),
            ciphertext,
            KeyReference::KeyId(key_id),
            classification,
            Utc::now(),
        );

        let record = TokenRecord::new(envelope.encode()?, ttl, max_usage, Utc::now());
        let token = record.token.clone();
        self.registry.put_token_record(record)?;
        self.audit(AuditEvent::new(
            EventType::TokenIssued,
            token.clone(),
            Severity::Info,
            format!("max_usage={}", max_usage),
        ));
        Ok(token)
    }

    /// Redeem a token for its payload.
    ///
    /// The usage check-and-increment is a single atomic registry operation:
    /// N concurrent redemptions of the same token yield exactly
    /// `min(N, max_usage)` successes. Dead tokens (expired or exhausted)
    /// are deleted as a side effect of the failed attempt, and no payload
    /// is decrypted or returned on any failure branch.
    pub fn redeem_token(&self, token: &str) -> Result<Vec<u8>, PayvaultError> {
        let now = Utc::now();
        let record = match self.registry.consume_token(token, now)? {
            ConsumeOutcome::Consumed(record) => record,
            ConsumeOutcome::Missing => {
                self.audit_redemption_failure(token, "token not found");
                return Err(PayvaultError::TokenNotFound);
            }
            ConsumeOutcome::Expired => {
                self.registry.delete_token_record(token)?;
                self.audit_redemption_failure(token, "token expired");
                return Err(PayvaultError::TokenExpired);
            }
            ConsumeOutcome::Exhausted => {
                self.registry.delete_token_record(token)?;
                self.audit_redemption_failure(token, "usage exceeded");
                return Err(PayvaultError::TokenUsageExceeded);
            }
        };

        // Consumed is terminal once the final permitted use is spent.
        if record.is_exhausted() {
            self.registry.delete_token_record(token)?;
        }

        let envelope = Envelope::decode(&record.envelope)?;
        let payload = self.decrypt_record(&envelope)?;
        self.audit(AuditEvent::new(
            EventType::TokenRedeemed,
            token,
            Severity::Info,
            format!("usage {}/{}", record.usage_count, record.max_usage),
        ));
        Ok(payload)
    }

    /// Explicitly revoke a token: delete its record so every later
    /// redemption fails with `TokenNotFound`.
    pub fn revoke_token(&self, token: &str) -> Result<(), PayvaultError> {
        if self.registry.get_token_record(token)?.is_none() {
            return Err(PayvaultError::TokenNotFound);
        }
        self.registry.delete_token_record(token)?;
        self.audit(AuditEvent::new(
            EventType::TokenRevoked,
            token,
            Severity::Security,
            "token revoked",
        ));
        Ok(())
    }

    /// Delete all token records past their expiry. Idempotent; safe to run
    /// repeatedly or not at all, since expired tokens fail redemption
    /// regardless of the sweep.
    ///
    /// Returns the number of records deleted.
    pub fn cleanup_expired(&self) -> Result<usize, PayvaultError> {
        let expired = self.registry.expired_tokens(Utc::now())?;
        for token in &expired {
            self.registry.delete_token_record(token)?;
        }
        Ok(expired.len())
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Add a sink to receive a copy of every audit event.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        if let Ok(mut log) = self.audit.lock() {
            log.add_forward_sink(sink);
        }
    }

    /// Snapshot of all audit events recorded so far.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Appending to the audit log is best-effort: a poisoned log mutex must
    /// not turn a successful cryptographic operation into a failure.
    fn audit(&self, event: AuditEvent) {
        if let Ok(mut log) = self.audit.lock() {
            log.append(event);
        }
    }

    fn audit_decryption_failure(&self, subject: &str) {
        self.audit(AuditEvent::new(
            EventType::DecryptionFailed,
            subject,
            Severity::Security,
            "authentication failure",
        ));
    }

    fn audit_redemption_failure(&self, token: &str, detail: &str) {
        self.audit(AuditEvent::new(
            EventType::RedemptionFailed,
            token,
            Severity::Warning,
            detail,
        ));
    }
}
