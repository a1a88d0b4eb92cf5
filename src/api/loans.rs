// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Loan lifecycle API endpoints.
//!
//! Applicants create loans; the loan's bank moves them through the state
//! machine. Chain reads are open to any authenticated caller, while audit
//! trails and quarantine control are restricted to the loan's parties.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::blocking;
use crate::{
    auth::{ApplicantOnly, Auth},
    error::ApiError,
    ledger::{Block, ChainVerification},
    loan::Status,
    service::{InitiateLoan, LoanReceipt, LoanSummary, TransitionReceipt},
    state::AppState,
    storage::AuditEvent,
};

/// Request to open a loan application.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateLoanRequest {
    /// Caller-chosen loan id (`[A-Za-z0-9_-]{1,64}`). Generated when absent.
    #[serde(default)]
    pub loan_id: Option<String>,
    /// Bank the application is sent to.
    pub bank_id: String,
    /// Application payload, any JSON value. Its exact bytes are encrypted.
    #[schema(value_type = Object)]
    pub metadata: Box<RawValue>,
    /// Envelope password for the applicant's copy of the data key.
    pub user_password: String,
    /// Envelope password for the bank's copy of the data key.
    pub bank_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub status: Status,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanListResponse {
    pub loans: Vec<LoanSummary>,
    pub total: usize,
}

/// Create a loan and its genesis block.
#[utoipa::path(
    post,
    path = "/v1/loans",
    tag = "Loans",
    security(("bearer_auth" = [])),
    request_body = InitiateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanReceipt),
        (status = 400, description = "Invalid loan id or empty password"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not an applicant"),
        (status = 404, description = "Unknown bank"),
        (status = 409, description = "Loan id already in use")
    )
)]
pub async fn initiate_loan(
    ApplicantOnly(actor): ApplicantOnly,
    State(state): State<AppState>,
    Json(request): Json<InitiateLoanRequest>,
) -> Result<(StatusCode, Json<LoanReceipt>), ApiError> {
    let input = InitiateLoan {
        loan_id: request.loan_id,
        bank_id: request.bank_id,
        metadata: request.metadata.get().as_bytes().to_vec(),
        user_password: Zeroizing::new(request.user_password),
        bank_password: Zeroizing::new(request.bank_password),
    };

    let service = state.service.clone();
    let receipt = blocking(move || service.initiate_loan(&actor, input)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Loans where the caller is the applicant or the bank.
#[utoipa::path(
    get,
    path = "/v1/loans/mine",
    tag = "Loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans of the caller", body = LoanListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_loans(
    Auth(actor): Auth,
    State(state): State<AppState>,
) -> Result<Json<LoanListResponse>, ApiError> {
    let loans = state.service.loans_for(&actor)?;
    let total = loans.len();
    Ok(Json(LoanListResponse { loans, total }))
}

/// Move a loan to a new status. Only the loan's bank may do this.
#[utoipa::path(
    post,
    path = "/v1/loans/{loan_id}/transition",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Block appended", body = TransitionReceipt),
        (status = 403, description = "Caller is not the loan's bank"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Illegal transition, closed loan or concurrent modification"),
        (status = 500, description = "Chain corrupted")
    )
)]
pub async fn transition_loan(
    Auth(actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionReceipt>, ApiError> {
    Ok(Json(state.service.transition(&actor, &loan_id, request.status)?))
}

/// Close a loan from any non-terminal status.
#[utoipa::path(
    post,
    path = "/v1/loans/{loan_id}/close",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan closed", body = TransitionReceipt),
        (status = 403, description = "Caller is not the loan's bank"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already closed")
    )
)]
pub async fn close_loan(
    Auth(actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<TransitionReceipt>, ApiError> {
    Ok(Json(state.service.close_loan(&actor, &loan_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/loans/{loan_id}/chain",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Blocks in sequence order", body = [Block]),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_chain(
    Auth(_actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(state.service.get_chain(&loan_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/loans/{loan_id}/blocks/{sequence_id}",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(
        ("loan_id" = String, Path, description = "Loan ID"),
        ("sequence_id" = u64, Path, description = "Position in the chain, genesis is 0")
    ),
    responses(
        (status = 200, description = "Block", body = Block),
        (status = 404, description = "Loan or block not found")
    )
)]
pub async fn get_block(
    Auth(_actor): Auth,
    State(state): State<AppState>,
    Path((loan_id, sequence_id)): Path<(String, u64)>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.service.get_block(&loan_id, sequence_id)?))
}

/// Recompute every hash in the loan's chain. A broken chain is quarantined.
#[utoipa::path(
    get,
    path = "/v1/loans/{loan_id}/verify",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Verification result", body = ChainVerification),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn verify_chain(
    Auth(_actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<ChainVerification>, ApiError> {
    let service = state.service.clone();
    let result = blocking(move || service.verify_chain(&loan_id)).await?;
    Ok(Json(result))
}

/// Every block of every loan, ordered by creation time.
#[utoipa::path(
    get,
    path = "/v1/chain",
    tag = "Loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All blocks", body = [Block]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn full_chain(
    Auth(_actor): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(state.service.get_full_chain()?))
}

#[utoipa::path(
    get,
    path = "/v1/loans/{loan_id}/audit",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Audit events, oldest first", body = [AuditEvent]),
        (status = 403, description = "Caller is not a party to the loan"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn loan_audit(
    Auth(actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    Ok(Json(state.service.audit_events(&actor, &loan_id)?))
}

/// Lift a quarantine after the chain has been repaired.
#[utoipa::path(
    delete,
    path = "/v1/loans/{loan_id}/quarantine",
    tag = "Loans",
    security(("bearer_auth" = [])),
    params(("loan_id" = String, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Quarantine cleared"),
        (status = 403, description = "Caller is not the loan's bank"),
        (status = 404, description = "Loan not found"),
        (status = 500, description = "Chain is still corrupted")
    )
)]
pub async fn clear_quarantine(
    Auth(actor): Auth,
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let service = state.service.clone();
    blocking(move || service.clear_quarantine(&actor, &loan_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::Actor;

    fn setup() -> AppState {
        let state = AppState::for_tests();
        let identity = state.service.identity();
        identity.register_applicant("alice", "alice-login").unwrap();
        identity.register_bank("BANK01", "First Bank", "bank-login").unwrap();
        identity.register_bank("BANK02", "Second Bank", "bank-login").unwrap();
        state
    }

    fn request(loan_id: Option<&str>) -> Json<InitiateLoanRequest> {
        Json(InitiateLoanRequest {
            loan_id: loan_id.map(str::to_string),
            bank_id: "BANK01".into(),
            metadata: RawValue::from_string(r#"{"amount":5000}"#.to_string()).unwrap(),
            user_password: "pw1".into(),
            bank_password: "pw2".into(),
        })
    }

    #[tokio::test]
    async fn initiate_creates_genesis_block() {
        let state = setup();
        let (status, Json(receipt)) = initiate_loan(
            ApplicantOnly(Actor::applicant("alice")),
            State(state.clone()),
            request(Some("L1")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt.status, Status::Initiated);

        let Json(chain) = get_chain(
            Auth(Actor::bank("BANK01")),
            State(state),
            Path("L1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].current_hash, receipt.genesis_block_hash);
    }

    #[tokio::test]
    async fn generated_loan_id_is_returned() {
        let state = setup();
        let (_, Json(receipt)) = initiate_loan(
            ApplicantOnly(Actor::applicant("alice")),
            State(state),
            request(None),
        )
        .await
        .unwrap();
        assert_eq!(receipt.loan_id.len(), 16);
    }

    #[tokio::test]
    async fn other_bank_cannot_transition() {
        let state = setup();
        initiate_loan(
            ApplicantOnly(Actor::applicant("alice")),
            State(state.clone()),
            request(Some("L1")),
        )
        .await
        .unwrap();

        let err = transition_loan(
            Auth(Actor::bank("BANK02")),
            State(state),
            Path("L1".to_string()),
            Json(TransitionRequest {
                status: Status::Accepted,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn block_lookup_and_verify() {
        let state = setup();
        initiate_loan(
            ApplicantOnly(Actor::applicant("alice")),
            State(state.clone()),
            request(Some("L1")),
        )
        .await
        .unwrap();
        transition_loan(
            Auth(Actor::bank("BANK01")),
            State(state.clone()),
            Path("L1".to_string()),
            Json(TransitionRequest {
                status: Status::Accepted,
            }),
        )
        .await
        .unwrap();

        let Json(block) = get_block(
            Auth(Actor::applicant("alice")),
            State(state.clone()),
            Path(("L1".to_string(), 1)),
        )
        .await
        .unwrap();
        assert_eq!(block.transaction_description, "STATUS:accepted");

        let err = get_block(
            Auth(Actor::applicant("alice")),
            State(state.clone()),
            Path(("L1".to_string(), 7)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let Json(result) = verify_chain(
            Auth(Actor::applicant("alice")),
            State(state.clone()),
            Path("L1".to_string()),
        )
        .await
        .unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 2);

        let Json(all) = full_chain(Auth(Actor::bank("BANK02")), State(state))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn quarantine_of_valid_chain_can_be_cleared_by_its_bank_only() {
        let state = setup();
        initiate_loan(
            ApplicantOnly(Actor::applicant("alice")),
            State(state.clone()),
            request(Some("L1")),
        )
        .await
        .unwrap();

        let err = clear_quarantine(
            Auth(Actor::bank("BANK02")),
            State(state.clone()),
            Path("L1".to_string()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let status = clear_quarantine(
            Auth(Actor::bank("BANK01")),
            State(state),
            Path("L1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
