//! Password hashing and access-token minting/verification.
//!
//! No password-hashing or JWT crate exists anywhere in this workspace's
//! dependency lineage, so both primitives here are built from the same
//! `sha2`/`hmac`/`hex`/`subtle` stack the teacher already uses for its
//! bearer-token comparisons (`api/auth.rs`, `api/admin/guard.rs`). Token
//! minting itself sits outside the core per spec.md §1 ("assumed to
//! produce a validated user identity") — this is the narrow, in-core
//! stand-in needed to make `/api/auth/login` self-contained rather than a
//! hardened external IdP.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_TOKEN_TTL: Duration = Duration::hours(24);

/// Salted SHA-256: `sha256$<salt-hex>$<digest-hex>`. The salt is two
/// concatenated v4 UUIDs, the same "no CSPRNG crate, reuse `getrandom` via
/// `uuid`" trick as `MetadataStore::get_or_create_signing_key`.
pub fn hash_password(password: &str) -> String {
    let mut salt = Vec::with_capacity(32);
    salt.extend_from_slice(Uuid::new_v4().as_bytes());
    salt.extend_from_slice(Uuid::new_v4().as_bytes());
    let salt_hex = hex::encode(&salt);
    let digest = Sha256::digest([salt.as_slice(), password.as_bytes()].concat());
    format!("sha256${salt_hex}${}", hex::encode(digest))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some("sha256"), Some(salt_hex), Some(digest_hex)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let actual = Sha256::digest([salt.as_slice(), password.as_bytes()].concat());
    bool::from(actual.as_slice().ct_eq(&expected))
}

/// `<user-id>.<expiry-unix-secs>.<hex-hmac>`, HMAC-SHA256 over
/// `"<user-id>.<expiry>"` keyed by the store's signing key.
pub fn mint_access_token(signing_key: &[u8], user_id: Uuid) -> String {
    let expiry = now_unix() + ACCESS_TOKEN_TTL.num_seconds();
    let payload = format!("{user_id}.{expiry}");
    let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("{payload}.{sig}")
}

/// Returns the token's user id iff the signature is valid and it has not
/// expired. Signature comparison is constant-time.
pub fn verify_access_token(signing_key: &[u8], token: &str) -> Option<Uuid> {
    let mut parts = token.splitn(3, '.');
    let (Some(user_id_str), Some(expiry_str), Some(sig_hex)) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    let user_id: Uuid = user_id_str.parse().ok()?;
    let expiry: i64 = expiry_str.parse().ok()?;
    if expiry < now_unix() {
        return None;
    }
    let payload = format!("{user_id_str}.{expiry_str}");
    let mut mac = HmacSha256::new_from_slice(signing_key).ok()?;
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();
    let provided = hex::decode(sig_hex).ok()?;
    if bool::from(expected.as_slice().ct_eq(&provided)) {
        Some(user_id)
    } else {
        None
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}
