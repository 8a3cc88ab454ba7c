//! Token records and their lifecycle rules.
//!
//! A token is an opaque, single-use-by-default, time-boxed reference to an
//! encrypted payload. The identifier is 128 bits of randomness in UUID
//! string form; it encodes nothing about the payload or its classification.
//!
//! Lifecycle: `Active → Consumed` (usage exhausted), `Active → Expired`
//! (time-based), or `Active → Revoked` (explicit deletion). All terminal;
//! there is no resurrection. The record is only ever mutated by the
//! registry's atomic consume operation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted state of one issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// UUID v4 string. The only handle a counterparty ever holds.
    pub token: String,
    /// The encoded [`crate::envelope::Envelope`] wrapping the payload.
    pub envelope: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Redemptions so far. Invariant: `usage_count <= max_usage`.
    pub usage_count: u32,
    pub max_usage: u32,
}

impl TokenRecord {
    /// Build a fresh record with a newly drawn identifier and zero usage.
    pub(crate) fn new(
        envelope: String,
        ttl: Duration,
        max_usage: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            envelope,
            created_at: now,
            expires_at: now + ttl,
            usage_count: 0,
            max_usage,
        }
    }

    /// Whether the token's expiry time has passed. Expiry takes precedence
    /// over remaining usage: an expired token is dead at any count.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether every permitted redemption has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_usage
    }
}
