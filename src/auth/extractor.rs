// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated actors.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(actor): Auth) -> impl IntoResponse {
//!     // actor is an applicant or a bank
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AuthError;
use crate::loan::{Actor, ActorRole};
use crate::state::AppState;

/// Any authenticated applicant or bank.
pub struct Auth(pub Actor);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::NotBearer)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::NotBearer)?;

        let claims = state.sessions.verify(token)?;
        Ok(Auth(claims.actor()))
    }
}

/// An authenticated applicant.
pub struct ApplicantOnly(pub Actor);

impl FromRequestParts<AppState> for ApplicantOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(actor) = Auth::from_request_parts(parts, state).await?;
        if actor.role != ActorRole::User {
            return Err(AuthError::WrongRole {
                required: ActorRole::User,
            });
        }
        Ok(ApplicantOnly(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let state = AppState::for_tests();
        let mut parts = parts_with(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_non_bearer() {
        let state = AppState::for_tests();
        let mut parts = parts_with(Some("Basic abc".into()));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::NotBearer)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_session_token() {
        let state = AppState::for_tests();
        let token = state.sessions.issue(&Actor::bank("BANK01")).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {}", token.access_token)));

        let Auth(actor) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(actor, Actor::bank("BANK01"));
    }

    #[tokio::test]
    async fn applicant_only_rejects_banks() {
        let state = AppState::for_tests();
        let token = state.sessions.issue(&Actor::bank("BANK01")).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {}", token.access_token)));

        let result = ApplicantOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::WrongRole { .. })));
    }
}
