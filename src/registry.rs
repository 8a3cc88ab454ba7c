//! The external key registry contract.
//!
//! The engine persists key metadata and token records through this narrow
//! interface: point get/put/delete by id, an atomic conditional increment
//! for token consumption, and two enumeration calls (key records for
//! rotation, expired tokens for the cleanup sweep). It does not require
//! multi-key transactions or range queries, which keeps the contract
//! portable across key-value and document backends.
//!
//! The atomicity of [`Registry::consume_token`] is load-bearing: the whole
//! value of "single-use" collapses if two concurrent redemptions can both
//! read `usage_count = 0` and both succeed. A backend without conditional
//! updates must serialize consumption behind a single writer instead —
//! [`MemoryRegistry`] demonstrates exactly that with one mutex over its
//! state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::PayvaultError;
use crate::keys::KeyRecord;
use crate::token::TokenRecord;

/// Result of one atomic consume attempt.
///
/// Exactly one of these is decided while the record is held exclusively;
/// by the time the caller sees the outcome, the increment (if any) is
/// already durable in the registry.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// The usage count was incremented. Carries the post-increment record.
    Consumed(TokenRecord),
    /// No record exists for this token.
    Missing,
    /// The record exists but its expiry time has passed.
    Expired,
    /// The record exists but `usage_count` already equals `max_usage`.
    Exhausted,
}

/// Storage contract the engine requires from its environment.
pub trait Registry: Send + Sync {
    fn put_key_record(&self, record: KeyRecord) -> Result<(), PayvaultError>;
    fn get_key_record(&self, key_id: &str) -> Result<Option<KeyRecord>, PayvaultError>;
    /// Enumerate all key records. Used by rotation; backends may serve this
    /// from an index document maintained on `put`.
    fn key_records(&self) -> Result<Vec<KeyRecord>, PayvaultError>;

    fn put_token_record(&self, record: TokenRecord) -> Result<(), PayvaultError>;
    fn get_token_record(&self, token: &str) -> Result<Option<TokenRecord>, PayvaultError>;
    fn delete_token_record(&self, token: &str) -> Result<(), PayvaultError>;

    /// Atomically check-and-increment the usage count of a token.
    ///
    /// The expiry check, the usage check, and the increment happen as one
    /// indivisible step against the store. N concurrent calls on the same
    /// token yield exactly `min(N, max_usage)` `Consumed` outcomes.
    fn consume_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, PayvaultError>;

    /// Tokens whose `expires_at` lies at or before `now`. Used by the
    /// cleanup sweep.
    fn expired_tokens(&self, now: DateTime<Utc>) -> Result<Vec<String>, PayvaultError>;
}

// ---------------------------------------------------------------------------
// In-memory reference implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    keys: HashMap<String, KeyRecord>,
    tokens: HashMap<String, TokenRecord>,
}

/// Mutex-backed registry for tests, development, and as the reference
/// semantics for real backends. The single mutex is the serialization point
/// that makes `consume_token` atomic.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, Inner>, PayvaultError> {
        self.inner
            .lock()
            .map_err(|_| PayvaultError::Storage("registry mutex poisoned".into()))
    }
}

impl Registry for MemoryRegistry {
    fn put_key_record(&self, record: KeyRecord) -> Result<(), PayvaultError> {
        self.locked()?.keys.insert(record.key_id.clone(), record);
        Ok(())
    }

    fn get_key_record(&self, key_id: &str) -> Result<Option<KeyRecord>, PayvaultError> {
        Ok(self.locked()?.keys.get(key_id).cloned())
    }

    fn key_records(&self) -> Result<Vec<KeyRecord>, PayvaultError> {
        Ok(self.locked()?.keys.values().cloned().collect())
    }

    fn put_token_record(&self, record: TokenRecord) -> Result<(), PayvaultError> {
        self.locked()?.tokens.insert(record.token.clone(), record);
        Ok(())
    }

    fn get_token_record(&self, token: &str) -> Result<Option<TokenRecord>, PayvaultError> {
        Ok(self.locked()?.tokens.get(token).cloned())
    }

    fn delete_token_record(&self, token: &str) -> Result<(), PayvaultError> {
        self.locked()?.tokens.remove(token);
        Ok(())
    }

    fn consume_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, PayvaultError> {
        let mut inner = self.locked()?;
        let record = match inner.tokens.get_mut(token) {
            Some(record) => record,
            None => return Ok(ConsumeOutcome::Missing),
        };
        if record.is_expired(now) {
            return Ok(ConsumeOutcome::Expired);
        }
        if record.is_exhausted() {
            return Ok(ConsumeOutcome::Exhausted);
        }
        record.usage_count += 1;
        Ok(ConsumeOutcome::Consumed(record.clone()))
    }

    fn expired_tokens(&self, now: DateTime<Utc>) -> Result<Vec<String>, PayvaultError> {
        Ok(self
            .locked()?
            .tokens
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.token.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStatus;
    use chrono::Duration;

    fn record(ttl_secs: i64, max_usage: u32, now: DateTime<Utc>) -> TokenRecord {
        TokenRecord::new("envelope".into(), Duration::seconds(ttl_secs), max_usage, now)
    }

    #[test]
    fn test_consume_until_exhausted() {
        let registry = MemoryRegistry::new();
        let now = Utc::now();
        let r = record(3600, 2, now);
        let token = r.token.clone();
        registry.put_token_record(r).unwrap();

        assert!(matches!(
            registry.consume_token(&token, now).unwrap(),
            ConsumeOutcome::Consumed(ref r) if r.usage_count == 1
        ));
        assert!(matches!(
            registry.consume_token(&token, now).unwrap(),
            ConsumeOutcome::Consumed(ref r) if r.usage_count == 2
        ));
        assert!(matches!(
            registry.consume_token(&token, now).unwrap(),
            ConsumeOutcome::Exhausted
        ));
    }

    #[test]
    fn test_expired_wins_over_usage() {
        let registry = MemoryRegistry::new();
        let now = Utc::now();
        let r = record(-1, 5, now);
        let token = r.token.clone();
        registry.put_token_record(r).unwrap();

        assert!(matches!(
            registry.consume_token(&token, now).unwrap(),
            ConsumeOutcome::Expired
        ));
    }

    #[test]
    fn test_missing_token() {
        let registry = MemoryRegistry::new();
        assert!(matches!(
            registry.consume_token("nope", Utc::now()).unwrap(),
            ConsumeOutcome::Missing
        ));
    }

    #[test]
    fn test_expired_token_enumeration() {
        let registry = MemoryRegistry::new();
        let now = Utc::now();
        let live = record(3600, 1, now);
        let dead = record(-10, 1, now);
        let dead_token = dead.token.clone();
        registry.put_token_record(live).unwrap();
        registry.put_token_record(dead).unwrap();

        let expired = registry.expired_tokens(now).unwrap();
        assert_eq!(expired, vec![dead_token]);
    }

    #[test]
    fn test_concurrent_consume_exactly_max_usage_successes() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MemoryRegistry::new());
        let now = Utc::now();
        let r = record(3600, 1, now);
        let token = r.token.clone();
        registry.put_token_record(r).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let token = token.clone();
                thread::spawn(move || {
                    matches!(
                        registry.consume_token(&token, now).unwrap(),
                        ConsumeOutcome::Consumed(_)
                    )
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_key_record_storage() {
        let registry = MemoryRegistry::new();
        let record = KeyRecord::new("k1".into(), "fp".into(), Utc::now());
        registry.put_key_record(record).unwrap();

        let fetched = registry.get_key_record("k1").unwrap().unwrap();
        assert_eq!(fetched.status, KeyStatus::Active);
        assert_eq!(registry.key_records().unwrap().len(), 1);
        assert!(registry.get_key_record("k2").unwrap().is_none());
    }
}
