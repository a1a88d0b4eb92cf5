// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session rejections.
//!
//! Every variant becomes a JSON body `{"error": ..., "error_code": ...}`.
//! Token problems are 401 so clients know to log in again; a valid session
//! on a route meant for the other role is 403.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::loan::ActorRole;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("a bearer session token is required")]
    MissingToken,

    #[error("authorization header must be 'Bearer <session token>'")]
    NotBearer,

    #[error("session token is malformed")]
    MalformedToken,

    /// Signed with a different `JWT_SECRET`, or altered.
    #[error("session token signature does not match")]
    BadSignature,

    #[error("session has expired, log in again")]
    SessionExpired,

    #[error("session token was not issued by this ledger")]
    ForeignIssuer,

    #[error("could not issue session token: {0}")]
    Signing(String),

    #[error("this route is only available to the {required} role")]
    WrongRole { required: ActorRole },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::NotBearer => "not_bearer",
            AuthError::MalformedToken => "malformed_token",
            AuthError::BadSignature => "bad_signature",
            AuthError::SessionExpired => "session_expired",
            AuthError::ForeignIssuer => "foreign_issuer",
            AuthError::Signing(_) => "signing_failed",
            AuthError::WrongRole { .. } => "wrong_role",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::WrongRole { .. } => StatusCode::FORBIDDEN,
            AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_token_is_401_with_code() {
        let response = AuthError::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error_code"], "missing_token");
    }

    #[tokio::test]
    async fn wrong_role_is_403_and_names_the_role() {
        let err = AuthError::WrongRole {
            required: ActorRole::User,
        };
        assert!(err.to_string().contains("user"));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn signing_failure_is_a_server_error() {
        let err = AuthError::Signing("key rejected".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
