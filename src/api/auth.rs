// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registration and login for applicants and banks.
//!
//! Login passwords only gate session tokens. They are independent of the
//! envelope passwords supplied when a loan is created or decrypted.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::blocking;
use crate::{
    auth::SessionToken,
    error::ApiError,
    loan::{Actor, ActorRole},
    state::AppState,
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterApplicantRequest {
    pub applicant_id: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBankRequest {
    pub bank_id: String,
    pub bank_name: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginApplicantRequest {
    pub applicant_id: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginBankRequest {
    pub bank_id: String,
    pub password: String,
}

fn issue(state: &AppState, actor: &Actor) -> Result<SessionToken, ApiError> {
    state.sessions.issue(actor).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue session token");
        ApiError::internal("internal server error")
    })
}

/// Register an applicant and return a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/applicants",
    tag = "Auth",
    request_body = RegisterApplicantRequest,
    responses(
        (status = 201, description = "Applicant registered", body = SessionToken),
        (status = 400, description = "Invalid applicant id or empty password"),
        (status = 409, description = "Applicant already exists")
    )
)]
pub async fn register_applicant(
    State(state): State<AppState>,
    Json(request): Json<RegisterApplicantRequest>,
) -> Result<(StatusCode, Json<SessionToken>), ApiError> {
    let password = Zeroizing::new(request.password);
    let service = state.service.clone();
    let actor = blocking(move || {
        service
            .identity()
            .register_applicant(&request.applicant_id, &password)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(issue(&state, &actor)?)))
}

/// Register a bank and return a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/banks",
    tag = "Auth",
    request_body = RegisterBankRequest,
    responses(
        (status = 201, description = "Bank registered", body = SessionToken),
        (status = 400, description = "Invalid bank id, empty name or empty password"),
        (status = 409, description = "Bank already exists")
    )
)]
pub async fn register_bank(
    State(state): State<AppState>,
    Json(request): Json<RegisterBankRequest>,
) -> Result<(StatusCode, Json<SessionToken>), ApiError> {
    let password = Zeroizing::new(request.password);
    let service = state.service.clone();
    let actor = blocking(move || {
        service
            .identity()
            .register_bank(&request.bank_id, &request.bank_name, &password)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(issue(&state, &actor)?)))
}

/// Exchange an applicant's login password for a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/applicants/login",
    tag = "Auth",
    request_body = LoginApplicantRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionToken),
        (status = 401, description = "Wrong credentials")
    )
)]
pub async fn login_applicant(
    State(state): State<AppState>,
    Json(request): Json<LoginApplicantRequest>,
) -> Result<Json<SessionToken>, ApiError> {
    let actor = login(&state, ActorRole::User, request.applicant_id, request.password).await?;
    Ok(Json(issue(&state, &actor)?))
}

/// Exchange a bank's login password for a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/banks/login",
    tag = "Auth",
    request_body = LoginBankRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionToken),
        (status = 401, description = "Wrong credentials")
    )
)]
pub async fn login_bank(
    State(state): State<AppState>,
    Json(request): Json<LoginBankRequest>,
) -> Result<Json<SessionToken>, ApiError> {
    let actor = login(&state, ActorRole::Bank, request.bank_id, request.password).await?;
    Ok(Json(issue(&state, &actor)?))
}

async fn login(
    state: &AppState,
    role: ActorRole,
    id: String,
    password: String,
) -> Result<Actor, ApiError> {
    let password = Zeroizing::new(password);
    let service = state.service.clone();
    let result = blocking(move || service.identity().authenticate(role, &id, &password)).await;
    if result.is_err() {
        tracing::warn!(role = %role, "Login failed");
    }
    result
}
