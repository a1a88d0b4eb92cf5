// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(_) => ApiError::not_found(e.to_string()),
            LedgerError::InvalidTransition { .. }
            | LedgerError::LoanClosed(_)
            | LedgerError::ConcurrentModification { .. }
            | LedgerError::AlreadyExists(_) => ApiError::conflict(e.to_string()),
            LedgerError::WrongCredentials => ApiError::unauthorized("wrong credentials"),
            LedgerError::Forbidden(_) => ApiError::forbidden(e.to_string()),
            LedgerError::InvalidInput(_) => ApiError::bad_request(e.to_string()),
            LedgerError::ChainCorrupted { .. } => ApiError::internal(e.to_string()),
            LedgerError::AuthenticationFailure
            | LedgerError::Crypto(_)
            | LedgerError::Storage(_) => {
                tracing::error!(error = %e, "Internal error");
                ApiError::internal("internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{ActorRole, Status};
    use crate::storage::StoreError;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        assert_eq!(ApiError::conflict("c").status, StatusCode::CONFLICT);
        assert_eq!(ApiError::forbidden("f").status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn ledger_errors_map_to_status_codes() {
        let cases = [
            (LedgerError::NotFound("loan L1".into()), StatusCode::NOT_FOUND),
            (
                LedgerError::InvalidTransition {
                    from: Status::Initiated,
                    to: Status::Paid,
                    role: ActorRole::Bank,
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::LoanClosed("L1".into()), StatusCode::CONFLICT),
            (
                LedgerError::ConcurrentModification {
                    loan_id: "L1".into(),
                    expected: 2,
                    actual: 3,
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::AlreadyExists("L1".into()), StatusCode::CONFLICT),
            (LedgerError::WrongCredentials, StatusCode::UNAUTHORIZED),
            (LedgerError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (LedgerError::InvalidInput("id".into()), StatusCode::BAD_REQUEST),
            (
                LedgerError::AuthenticationFailure,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn chain_corruption_names_the_broken_block() {
        let err = ApiError::from(LedgerError::ChainCorrupted {
            loan_id: "L1".into(),
            broken_at_sequence_id: 3,
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("sequence 3"));
    }

    #[test]
    fn storage_errors_are_not_leaked() {
        let err = ApiError::from(LedgerError::Storage(StoreError::Poisoned));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
