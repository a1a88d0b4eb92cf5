// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 session tokens issued after a successful login.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use utoipa::ToSchema;

use super::{AuthError, SessionClaims};
use crate::loan::{Actor, ActorRole};

/// Issuer claim written into and required on every token.
pub const TOKEN_ISSUER: &str = "loan-ledger";

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Response body of the login and registration endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: String,
    pub role: ActorRole,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000)),
        }
    }

    pub fn issue(&self, actor: &Actor) -> Result<SessionToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sub: actor.id.clone(),
            role: actor.role,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(SessionToken {
            access_token,
            token_type: "Bearer".to_string(),
            role: actor.role,
            subject: actor.id.clone(),
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[TOKEN_ISSUER]);

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::SessionExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::ForeignIssuer,
                _ => AuthError::MalformedToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new(b"test-secret-test-secret-test-secret", 3600)
    }

    #[test]
    fn issued_token_verifies() {
        let keys = keys();
        let token = keys.issue(&Actor::applicant("alice")).unwrap();
        assert_eq!(token.token_type, "Bearer");

        let claims = keys.verify(&token.access_token).unwrap();
        assert_eq!(claims.actor(), Actor::applicant("alice"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = keys().issue(&Actor::bank("BANK01")).unwrap();
        let other = SessionKeys::new(b"another-secret-another-secret", 3600);
        assert!(matches!(
            other.verify(&token.access_token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let claims = SessionClaims {
            sub: "alice".into(),
            role: ActorRole::User,
            iss: TOKEN_ISSUER.into(),
            iat: 1_600_000_000,
            exp: 1_600_000_100,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::SessionExpired)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            keys().verify("not-a-token"),
            Err(AuthError::MalformedToken)
        ));
    }
}
