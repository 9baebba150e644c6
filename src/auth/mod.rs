// auth/mod.rs — credentials and request authentication.
//
// Two credential forms resolve to a user record:
//   1. `Authorization: Bearer <token>` — stateless HMAC-SHA256 signed token,
//      format "{user_id}:{expires_rfc3339}:{hmac_hex}", 7-day expiry.
//   2. `session_token` http-only cookie — server-side session row created by
//      the external OAuth exchange, 7-day expiry.
//
// Password hashes are Argon2id with an embedded salt (PHC string format).

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use crate::error::ApiError;
use crate::storage::UserRow;
use crate::AppContext;

type HmacSha256 = Hmac<Sha256>;

/// Both bearer tokens and cookie sessions live this long.
pub const CREDENTIAL_TTL_DAYS: i64 = 7;

// ─── Passwords ────────────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ─── Bearer tokens ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_token(user_id: &str, secret: &str) -> Result<String> {
    let expires_at = (Utc::now() + Duration::days(CREDENTIAL_TTL_DAYS)).to_rfc3339();
    let payload = format!("{user_id}:{expires_at}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{payload}:{sig}"))
}

pub fn verify_token(raw: &str, secret: &str) -> Result<TokenClaims> {
    // The expiry timestamp contains colons, so split the signature from the right.
    let (payload, sig_hex) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("malformed token"))?;
    let (user_id, expires_iso) = payload
        .split_once(':')
        .ok_or_else(|| anyhow!("malformed token"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| anyhow!("invalid token signature hex"))?;
    if expected.as_slice() != sig_bytes.as_slice() {
        return Err(anyhow!("token signature invalid"));
    }

    let expires_at = DateTime::parse_from_rfc3339(expires_iso)
        .map_err(|_| anyhow!("invalid token expiry timestamp"))?
        .with_timezone(&Utc);
    if expires_at <= Utc::now() {
        return Err(anyhow!("token expired"));
    }

    Ok(TokenClaims {
        user_id: user_id.to_string(),
        expires_at,
    })
}

// ─── Request extractor ────────────────────────────────────────────────────────

/// The authenticated caller, resolved from either credential form.
/// Cookie wins over bearer token when both are present, matching the
/// original login flow.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRow);

impl FromRequestParts<Arc<AppContext>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = cookie_value(parts, "session_token") {
            if let Some(session) = ctx.storage.get_auth_session(&token).await? {
                let valid = DateTime::parse_from_rfc3339(&session.expires_at)
                    .map(|exp| exp.with_timezone(&Utc) > Utc::now())
                    .unwrap_or(false);
                if valid {
                    if let Some(user) = ctx.storage.get_user(&session.user_id).await? {
                        return Ok(Self(user));
                    }
                }
            }
        }

        if let Some(bearer) = bearer_token(parts) {
            if let Ok(claims) = verify_token(&bearer, &ctx.config.token_secret) {
                if let Some(user) = ctx.storage.get_user(&claims.user_id).await? {
                    return Ok(Self(user));
                }
            }
        }

        Err(ApiError::NotAuthenticated)
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

fn cookie_value(parts: &Parts, name: &str) -> Option<String> {
    let raw = parts
        .headers
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = issue_token("user_abc123def456", "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id, "user_abc123def456");
        assert!(claims.expires_at > Utc::now());
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = issue_token("user_abc123def456", "secret").unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn token_rejects_tampered_user() {
        let token = issue_token("user_abc123def456", "secret").unwrap();
        let tampered = token.replacen("user_abc123def456", "user_000000000000", 1);
        assert!(verify_token(&tampered, "secret").is_err());
    }

    #[test]
    fn token_rejects_garbage() {
        assert!(verify_token("not-a-token", "secret").is_err());
        assert!(verify_token("a:b:zzzz", "secret").is_err());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
        assert!(!verify_password("hunter2!", "not-a-phc-string"));
    }
}
