// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decryption gateway endpoint.
//!
//! The role is taken from the session token, never from the request body,
//! so an applicant can only try the applicant's wrapped key and a bank can
//! only try the bank's.

use axum::{
    extract::{Path, State},
    Json,
};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::blocking;
use crate::{auth::Auth, error::ApiError, loan::ActorRole, state::AppState};

#[derive(Deserialize, ToSchema)]
pub struct DecryptRequest {
    /// Envelope password for the caller's role.
    pub password: String,
}

/// Recovered metadata. JSON payloads come back verbatim as JSON, anything
/// else as base64.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    pub loan_id: String,
    pub role: ActorRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_base64: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/loans/{loan_id}/decrypt",
    tag = "Decryption",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    request_body = DecryptRequest,
    responses(
        (status = 200, description = "Decrypted metadata", body = DecryptResponse),
        (status = 401, description = "Wrong credentials"),
        (status = 403, description = "Caller is not a party to the loan"),
        (status = 404, description = "Loan not found"),
        (status = 500, description = "Chain corrupted")
    )
)]
pub async fn decrypt_metadata(
    Auth(actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    Json(request): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let password = Zeroizing::new(request.password);
    let role = actor.role;
    let service = state.service.clone();
    let id = loan_id.clone();
    let plaintext = blocking(move || service.decrypt_metadata(&actor, &id, &password)).await?;

    let raw = std::str::from_utf8(&plaintext)
        .ok()
        .and_then(|text| RawValue::from_string(text.to_owned()).ok());
    let (metadata, metadata_base64) = match raw {
        Some(raw) => (Some(raw), None),
        None => (None, Some(Base64::encode_string(&plaintext))),
    };

    Ok(Json(DecryptResponse {
        loan_id,
        role,
        metadata,
        metadata_base64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::Actor;
    use crate::service::InitiateLoan;
    use axum::http::StatusCode;

    fn setup(metadata: &[u8]) -> AppState {
        let state = AppState::for_tests();
        let identity = state.service.identity();
        identity.register_applicant("alice", "alice-login").unwrap();
        identity.register_bank("BANK01", "First Bank", "bank-login").unwrap();
        state
            .service
            .initiate_loan(
                &Actor::applicant("alice"),
                InitiateLoan {
                    loan_id: Some("L1".into()),
                    bank_id: "BANK01".into(),
                    metadata: metadata.to_vec(),
                    user_password: Zeroizing::new("pw1".into()),
                    bank_password: Zeroizing::new("pw2".into()),
                },
            )
            .unwrap();
        state
    }

    async fn decrypt(state: &AppState, actor: Actor, password: &str) -> Result<DecryptResponse, ApiError> {
        decrypt_metadata(
            Auth(actor),
            State(state.clone()),
            Path("L1".to_string()),
            Json(DecryptRequest {
                password: password.into(),
            }),
        )
        .await
        .map(|Json(body)| body)
    }

    #[tokio::test]
    async fn both_parties_recover_json_metadata() {
        let state = setup(br#"{"amount":5000}"#);

        let user = decrypt(&state, Actor::applicant("alice"), "pw1").await.unwrap();
        let bank = decrypt(&state, Actor::bank("BANK01"), "pw2").await.unwrap();

        assert_eq!(user.role, ActorRole::User);
        assert_eq!(bank.role, ActorRole::Bank);
        let user_json = user.metadata.as_ref().map(|raw| raw.get());
        assert_eq!(user_json, Some(r#"{"amount":5000}"#));
        assert_eq!(user_json, bank.metadata.as_ref().map(|raw| raw.get()));
        assert!(user.metadata_base64.is_none());
    }

    #[tokio::test]
    async fn binary_metadata_is_returned_as_base64() {
        let state = setup(&[0xff, 0x00, 0x10]);
        let body = decrypt(&state, Actor::bank("BANK01"), "pw2").await.unwrap();
        assert!(body.metadata.is_none());
        assert_eq!(body.metadata_base64.as_deref(), Some("/wAQ"));
    }

    #[tokio::test]
    async fn other_role_password_is_wrong_credentials() {
        let state = setup(b"{}");
        let err = decrypt(&state, Actor::applicant("alice"), "pw2").await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
