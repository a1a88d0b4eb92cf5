// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{auth::Auth, error::ApiError, identity::BankSummary, state::AppState};

/// Banks an applicant can send a loan application to.
#[derive(Debug, Serialize, ToSchema)]
pub struct BankListResponse {
    pub banks: Vec<BankSummary>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/v1/banks",
    tag = "Banks",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Registered banks", body = BankListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_banks(
    Auth(_actor): Auth,
    State(state): State<AppState>,
) -> Result<Json<BankListResponse>, ApiError> {
    let banks = state.service.identity().list_banks()?;
    let total = banks.len();
    Ok(Json(BankListResponse { banks, total }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::Actor;

    #[tokio::test]
    async fn lists_registered_banks_only() {
        let state = AppState::for_tests();
        let identity = state.service.identity();
        identity.register_bank("BANK01", "First Bank", "pw").unwrap();
        identity.register_bank("BANK02", "Second Bank", "pw").unwrap();
        identity.register_applicant("alice", "pw").unwrap();

        let Json(response) = list_banks(Auth(Actor::applicant("alice")), State(state))
            .await
            .unwrap();
        assert_eq!(response.total, 2);
        let names: Vec<_> = response.banks.iter().map(|b| b.bank_name.as_str()).collect();
        assert!(names.contains(&"First Bank"));
        assert!(names.contains(&"Second Bank"));
    }
}
