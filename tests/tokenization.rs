//! End-to-end tokenization scenarios.

use std::sync::Arc;

use chrono::Duration;
use payvault::envelope::Classification;
use payvault::error::PayvaultError;
use payvault::keys::MemoryCustodian;
use payvault::registry::MemoryRegistry;
use payvault::Vault;

fn vault() -> Vault {
    Vault::new(
        Arc::new(MemoryCustodian::new().unwrap()),
        Arc::new(MemoryRegistry::new()),
    )
}

#[test]
fn test_issue_redeem_once_then_dead() {
    // Scenario: issue a token for an IBAN payload with ttl=24h, max_usage=1.
    // First redemption returns the original payload; the second fails.

    let vault = vault();
    let payload = br#"{"iban": "NL91ABNA0417164300"}"#;

    let token = vault
        .issue_token(payload, Duration::hours(24), 1, Classification::Payment)
        .unwrap();

    // 1. First redemption succeeds and returns the exact payload.
    let redeemed = vault.redeem_token(&token).unwrap();
    assert_eq!(redeemed, payload);

    // 2. Second redemption fails. The record was deleted on exhaustion, so
    //    either TokenNotFound or TokenUsageExceeded is acceptable; never a
    //    payload.
    let second = vault.redeem_token(&token);
    assert!(matches!(
        second,
        Err(PayvaultError::TokenNotFound) | Err(PayvaultError::TokenUsageExceeded)
    ));
}

#[test]
fn test_multi_use_token() {
    let vault = vault();
    let token = vault
        .issue_token(b"shared secret", Duration::hours(1), 2, Classification::General)
        .unwrap();

    assert_eq!(vault.redeem_token(&token).unwrap(), b"shared secret");
    assert_eq!(vault.redeem_token(&token).unwrap(), b"shared secret");
    assert!(vault.redeem_token(&token).is_err());
}

#[test]
fn test_expired_token_fails_regardless_of_usage() {
    // A token whose expiry is already in the past must fail with
    // TokenExpired even though it was never redeemed.

    let vault = vault();
    let token = vault
        .issue_token(b"stale", Duration::seconds(-5), 3, Classification::General)
        .unwrap();

    assert!(matches!(
        vault.redeem_token(&token),
        Err(PayvaultError::TokenExpired)
    ));

    // The failed attempt deleted the record; the token is now simply gone.
    assert!(matches!(
        vault.redeem_token(&token),
        Err(PayvaultError::TokenNotFound)
    ));
}

#[test]
fn test_unknown_token() {
    let vault = vault();
    assert!(matches!(
        vault.redeem_token("00000000-0000-4000-8000-000000000000"),
        Err(PayvaultError::TokenNotFound)
    ));
}

#[test]
fn test_token_is_opaque() {
    // The token identifier is a UUID and must not encode anything about
    // the payload or its classification.
    let vault = vault();
    let token = vault
        .issue_token(b"NL91ABNA0417164300", Duration::hours(1), 1, Classification::Payment)
        .unwrap();

    assert!(uuid::Uuid::parse_str(&token).is_ok());
    assert!(!token.contains("NL91"));
    assert!(!token.contains("payment"));
}

#[test]
fn test_revoke_token() {
    let vault = vault();
    let token = vault
        .issue_token(b"secret", Duration::hours(1), 1, Classification::General)
        .unwrap();

    vault.revoke_token(&token).unwrap();
    assert!(matches!(
        vault.redeem_token(&token),
        Err(PayvaultError::TokenNotFound)
    ));
    // Revoking again reports the record as already gone.
    assert!(matches!(
        vault.revoke_token(&token),
        Err(PayvaultError::TokenNotFound)
    ));
}

#[test]
fn test_cleanup_expired_is_idempotent() {
    let vault = vault();

    let live = vault
        .issue_token(b"live", Duration::hours(1), 1, Classification::General)
        .unwrap();
    vault
        .issue_token(b"dead-1", Duration::seconds(-1), 1, Classification::General)
        .unwrap();
    vault
        .issue_token(b"dead-2", Duration::seconds(-1), 1, Classification::General)
        .unwrap();

    // First sweep removes exactly the two expired records.
    assert_eq!(vault.cleanup_expired().unwrap(), 2);
    // Running it again removes nothing.
    assert_eq!(vault.cleanup_expired().unwrap(), 0);

    // The live token is untouched.
    assert_eq!(vault.redeem_token(&live).unwrap(), b"live");
}
