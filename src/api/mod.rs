// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::SessionToken,
    error::ApiError,
    identity::BankSummary,
    ledger::{Block, BlockMetadata, ChainVerification, LedgerResult},
    loan::{ActorRole, Status},
    service::{LoanReceipt, LoanSummary, TransitionReceipt},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod auth;
pub mod banks;
pub mod decrypt;
pub mod health;
pub mod loans;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/applicants", post(auth::register_applicant))
        .route("/auth/applicants/login", post(auth::login_applicant))
        .route("/auth/banks", post(auth::register_bank))
        .route("/auth/banks/login", post(auth::login_bank))
        .route("/banks", get(banks::list_banks))
        .route("/loans", post(loans::initiate_loan))
        .route("/loans/mine", get(loans::my_loans))
        .route("/loans/{loan_id}/transition", post(loans::transition_loan))
        .route("/loans/{loan_id}/close", post(loans::close_loan))
        .route("/loans/{loan_id}/chain", get(loans::get_chain))
        .route(
            "/loans/{loan_id}/blocks/{sequence_id}",
            get(loans::get_block),
        )
        .route("/loans/{loan_id}/verify", get(loans::verify_chain))
        .route("/loans/{loan_id}/audit", get(loans::loan_audit))
        .route(
            "/loans/{loan_id}/quarantine",
            delete(loans::clear_quarantine),
        )
        .route("/loans/{loan_id}/decrypt", post(decrypt::decrypt_metadata))
        .route("/chain", get(loans::full_chain));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
}

/// Run a service call on the blocking pool. Key derivation is deliberately
/// slow and must not stall the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Blocking task failed");
            ApiError::internal("internal server error")
        })?
        .map_err(ApiError::from)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::register_applicant,
        auth::login_applicant,
        auth::register_bank,
        auth::login_bank,
        banks::list_banks,
        loans::initiate_loan,
        loans::my_loans,
        loans::transition_loan,
        loans::close_loan,
        loans::get_chain,
        loans::get_block,
        loans::verify_chain,
        loans::loan_audit,
        loans::clear_quarantine,
        loans::full_chain,
        decrypt::decrypt_metadata
    ),
    components(
        schemas(
            ActorRole,
            Status,
            Block,
            BlockMetadata,
            ChainVerification,
            AuditEvent,
            AuditEventType,
            BankSummary,
            SessionToken,
            LoanReceipt,
            LoanSummary,
            TransitionReceipt,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            auth::RegisterApplicantRequest,
            auth::RegisterBankRequest,
            auth::LoginApplicantRequest,
            auth::LoginBankRequest,
            banks::BankListResponse,
            loans::InitiateLoanRequest,
            loans::TransitionRequest,
            loans::LoanListResponse,
            decrypt::DecryptRequest,
            decrypt::DecryptResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Applicant and bank registration and login"),
        (name = "Banks", description = "Bank directory"),
        (name = "Loans", description = "Loan lifecycle and hash chains"),
        (name = "Decryption", description = "Per-role metadata decryption")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        send_raw(app, method, uri, token, body.map(|body| body.to_string())).await
    }

    async fn send_raw(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<String>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &Router, uri: &str, body: Value) -> String {
        let response = send(app, Method::POST, uri, None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["accessToken"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Registers alice and BANK01 and returns their session tokens.
    async fn setup(app: &Router) -> (String, String) {
        let alice = register(
            app,
            "/v1/auth/applicants",
            json!({ "applicantId": "alice", "password": "alice-login" }),
        )
        .await;
        let bank = register(
            app,
            "/v1/auth/banks",
            json!({ "bankId": "BANK01", "bankName": "First Bank", "password": "bank-login" }),
        )
        .await;
        (alice, bank)
    }

    async fn initiate(app: &Router, token: &str) -> Value {
        let response = send(
            app,
            Method::POST,
            "/v1/loans",
            Some(token),
            Some(json!({
                "loanId": "L1",
                "bankId": "BANK01",
                "metadata": { "amount": 5000 },
                "userPassword": "pw1",
                "bankPassword": "pw2"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::for_tests());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_and_docs_are_public() {
        let app = router(AppState::for_tests());

        let response = send(&app, Method::GET, "/health/live", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(json_body(response).await["checks"]["store"], "ok");

        let response = send(&app, Method::GET, "/api-doc/openapi.json", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        assert!(doc["paths"]["/v1/loans/{loan_id}/decrypt"].is_object());
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let app = router(AppState::for_tests());
        let response = send(&app, Method::GET, "/health/live", None, None).await;
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn v1_routes_require_a_token() {
        let app = router(AppState::for_tests());
        for uri in ["/v1/banks", "/v1/loans/mine", "/v1/chain", "/v1/loans/L1/chain"] {
            let response = send(&app, Method::GET, uri, None, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn full_loan_lifecycle_over_http() {
        let app = router(AppState::for_tests());
        let (alice, bank) = setup(&app).await;

        let receipt = initiate(&app, &alice).await;
        assert_eq!(receipt["loanId"], "L1");
        assert_eq!(receipt["status"], "initiated");
        let genesis_hash = receipt["genesisBlockHash"].as_str().unwrap().to_string();

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/transition",
            Some(&bank),
            Some(json!({ "status": "accepted" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let transition = json_body(response).await;
        assert_eq!(transition["newStatus"], "accepted");
        assert_eq!(transition["sequenceId"], 1);

        let response = send(&app, Method::GET, "/v1/loans/L1/blocks/1", Some(&alice), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["previousHash"], genesis_hash.as_str());

        let response = send(&app, Method::GET, "/v1/loans/L1/verify", Some(&alice), None).await;
        let verification = json_body(response).await;
        assert_eq!(verification["valid"], true);
        assert_eq!(verification["length"], 2);

        for (token, password, role) in [(&alice, "pw1", "user"), (&bank, "pw2", "bank")] {
            let response = send(
                &app,
                Method::POST,
                "/v1/loans/L1/decrypt",
                Some(token),
                Some(json!({ "password": password })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["role"], role);
            assert_eq!(body["metadata"], json!({ "amount": 5000 }));
        }

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/decrypt",
            Some(&alice),
            Some(json!({ "password": "wrong" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, Method::POST, "/v1/loans/L1/close", Some(&bank), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/transition",
            Some(&bank),
            Some(json!({ "status": "paid" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, Method::GET, "/v1/loans/L1/chain", Some(&bank), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 3);

        let response = send(&app, Method::GET, "/v1/loans/mine", Some(&bank), None).await;
        let list = json_body(response).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["loans"][0]["latestStatus"], "closed");
        assert_eq!(list["loans"][0]["bankName"], "First Bank");
    }

    #[tokio::test]
    async fn illegal_transition_is_a_conflict() {
        let app = router(AppState::for_tests());
        let (alice, bank) = setup(&app).await;
        initiate(&app, &alice).await;

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/transition",
            Some(&bank),
            Some(json!({ "status": "paid" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, Method::GET, "/v1/loans/L1/chain", Some(&bank), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_cannot_close_a_loan() {
        let app = router(AppState::for_tests());
        let (alice, bank) = setup(&app).await;
        initiate(&app, &alice).await;

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/transition",
            Some(&bank),
            Some(json!({ "status": "closed" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, Method::GET, "/v1/loans/L1/chain", Some(&bank), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn metadata_round_trips_byte_for_byte() {
        let app = router(AppState::for_tests());
        let (alice, bank) = setup(&app).await;
        let metadata = r#"{"zeta":1,"amount":12345678901234567890123,"note":"caf\u00e9"}"#;

        let body = format!(
            r#"{{"loanId":"L1","bankId":"BANK01","metadata":{metadata},"userPassword":"pw1","bankPassword":"pw2"}}"#
        );
        let response = send_raw(&app, Method::POST, "/v1/loans", Some(&alice), Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/decrypt",
            Some(&bank),
            Some(json!({ "password": "pw2" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(&format!(r#""metadata":{metadata}"#)), "{text}");
    }

    #[tokio::test]
    async fn banks_cannot_initiate_loans() {
        let app = router(AppState::for_tests());
        let (_, bank) = setup(&app).await;

        let response = send(
            &app,
            Method::POST,
            "/v1/loans",
            Some(&bank),
            Some(json!({
                "bankId": "BANK01",
                "metadata": {},
                "userPassword": "pw1",
                "bankPassword": "pw2"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn outsiders_cannot_decrypt_or_read_audit() {
        let app = router(AppState::for_tests());
        let (alice, _) = setup(&app).await;
        let mallory = register(
            &app,
            "/v1/auth/applicants",
            json!({ "applicantId": "mallory", "password": "mallory-login" }),
        )
        .await;
        initiate(&app, &alice).await;

        let response = send(
            &app,
            Method::POST,
            "/v1/loans/L1/decrypt",
            Some(&mallory),
            Some(json!({ "password": "pw1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::GET, "/v1/loans/L1/audit", Some(&mallory), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::GET, "/v1/loans/L1/audit", Some(&alice), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let events = json_body(response).await;
        assert!(events
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["event_type"] == "access_denied"));
    }

    #[tokio::test]
    async fn unknown_loan_is_not_found() {
        let app = router(AppState::for_tests());
        let (alice, _) = setup(&app).await;

        let response = send(&app, Method::GET, "/v1/loans/nope/chain", Some(&alice), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
