//! Compact three-segment signed-claims token codec.
//!
//! Tokens are `base64url(header).base64url(payload).base64url(signature)`.
//! This module decodes the header and payload segments and inspects expiry;
//! it also mints tokens for the demo adapter and for tests.
//!
//! # Trust boundary
//!
//! No signature verification is performed here. The external identity
//! provider signs tokens and backend resource servers verify them; a
//! browsing-context session kernel treats the signature segment as opaque.
//! Expiry checks fail closed: a token that cannot be parsed, or that carries
//! no `exp` claim, is treated as expired.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AuthError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted token size in bytes (8KB).
///
/// Oversized tokens are rejected before any base64 or JSON work is done.
/// Typical tokens in this system are well under 1KB.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Signature segment used for tokens minted locally (demo mode and tests).
/// Opaque by contract; nothing client-side ever inspects it.
const UNSIGNED_SIGNATURE: &str = "demo-signature";

// =============================================================================
// Types
// =============================================================================

/// Decoded token header segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm declared by the issuer.
    pub alg: String,
    /// Token type, conventionally `JWT`.
    pub typ: String,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Decoded token payload segment.
///
/// Carries identity claims plus the authorization material (`roles`,
/// `permissions`) the access guard evaluates. Unknown claims are ignored on
/// decode; absent claims default to empty so that minimal tokens still parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (stable user identifier).
    #[serde(default)]
    pub sub: String,

    /// E-mail address.
    #[serde(default)]
    pub email: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Preferred sign-in name.
    #[serde(default)]
    pub preferred_username: String,

    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Granted fine-grained permissions. Providers that only issue roles
    /// leave this empty; see `UserProfile::from_claims` for the defaulting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Tenant identifier.
    #[serde(default)]
    pub tid: String,

    /// Audience.
    #[serde(default)]
    pub aud: String,

    /// Issuer.
    #[serde(default)]
    pub iss: String,

    /// Issued-at, seconds since epoch.
    #[serde(default)]
    pub iat: i64,

    /// Expiry, seconds since epoch. Absent means the token is never
    /// considered fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// Whether the claims grant a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the claims grant any of the given roles.
    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }

    /// Whether the claims grant a specific permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Whether the token expires within `threshold` of `now`.
    ///
    /// A missing `exp` counts as already expiring.
    #[must_use]
    pub fn expiring_within(&self, threshold: Duration, now: i64) -> bool {
        match self.exp {
            #[allow(clippy::cast_possible_wrap)]
            Some(exp) => exp - now <= threshold.as_secs() as i64,
            None => true,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Split a token into its three dot-separated segments.
fn segments(token: &str) -> Result<(&str, &str, &str)> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "session_core.token",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(AuthError::MalformedToken("token too large".to_string()));
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => {
            Ok((header, payload, signature))
        }
        _ => Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, which: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "session_core.token", error = %e, segment = which, "Base64 decode failed");
        AuthError::MalformedToken(format!("{which} segment is not valid base64url"))
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "session_core.token", error = %e, segment = which, "JSON parse failed");
        AuthError::MalformedToken(format!("{which} segment is not valid JSON"))
    })
}

/// Decode the header segment of a token.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token does not have exactly
/// three segments or the header segment is not base64url-encoded JSON.
pub fn decode_header(token: &str) -> Result<TokenHeader> {
    let (header, _, _) = segments(token)?;
    decode_segment(header, "header")
}

/// Decode the payload segment of a token.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token does not have exactly
/// three segments or the payload segment is not base64url-encoded JSON.
pub fn decode_payload(token: &str) -> Result<Claims> {
    let (_, payload, _) = segments(token)?;
    decode_segment(payload, "payload")
}

/// Mint a token from claims with the default header and an opaque signature
/// segment. Used by the demo adapter; real deployments receive tokens from
/// the identity provider.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the claims cannot be serialized.
pub fn encode(claims: &Claims) -> Result<String> {
    encode_with_header(&TokenHeader::default(), claims)
}

/// Mint a token with an explicit header.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if either segment cannot be
/// serialized.
pub fn encode_with_header(header: &TokenHeader, claims: &Claims) -> Result<String> {
    let header_json = serde_json::to_vec(header)
        .map_err(|e| AuthError::MalformedToken(format!("header encode failed: {e}")))?;
    let payload_json = serde_json::to_vec(claims)
        .map_err(|e| AuthError::MalformedToken(format!("payload encode failed: {e}")))?;

    Ok(format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json),
        URL_SAFE_NO_PAD.encode(UNSIGNED_SIGNATURE)
    ))
}

/// Whether the token is expired at `now` (seconds since epoch).
///
/// Fails closed: an unparseable token or one without an `exp` claim is
/// expired. The boundary `now == exp` counts as expired.
#[must_use]
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_payload(token) {
        Ok(claims) => match claims.exp {
            Some(exp) => now >= exp,
            None => true,
        },
        Err(_) => true,
    }
}

/// Time remaining until the token expires, measured from `now`.
///
/// Zero if already expired, unparseable, or missing `exp`.
#[must_use]
pub fn time_until_expiry(token: &str, now: i64) -> Duration {
    let Ok(claims) = decode_payload(token) else {
        return Duration::ZERO;
    };
    match claims.exp {
        #[allow(clippy::cast_sign_loss)]
        Some(exp) if exp > now => Duration::from_secs((exp - now) as u64),
        _ => Duration::ZERO,
    }
}

// =============================================================================
// Tests
// =============================================================================
