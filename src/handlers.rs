//! HTTP endpoints of the charge gateway.
//!
//! `POST /charges` is the protocol-critical endpoint; the GET endpoints are
//! discovery/debugging metadata. Error mapping follows the gateway taxonomy:
//! bad input is 400, admission denials are 429 with backoff hints, and
//! orchestration failures are 500.

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::gateway::{ChargeGateway, GatewayError};
use crate::store::{InMemoryAdmissionStore, InMemoryChargeStore};
use crate::types::{ChargeRequest, ErrorResponse};

/// Gateway wired to the in-memory stores.
pub type AppGateway = ChargeGateway<InMemoryAdmissionStore, InMemoryChargeStore>;

/// Shared handler state: the gateway plus the process-wide shutdown token,
/// which aborts pending orchestration retries on shutdown.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AppGateway>,
    pub shutdown: CancellationToken,
}

/// Body of a 429 admission denial.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitResponse {
    error: &'static str,
    message: String,
    retry_after: u64,
    unpaid_count: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/charges", post(post_charge).get(get_charge_info))
        .route("/acquirers", get(get_acquirers))
        .route("/healthz", get(get_health))
}

/// `POST /charges`: create a new PIX charge.
///
/// The connecting peer address fills in `identity.ip` when the client did
/// not supply one, so IP-keyed rate limiting works for anonymous checkouts.
#[instrument(skip_all)]
pub async fn post_charge(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(mut body): Json<ChargeRequest>,
) -> impl IntoResponse {
    if body.identity.ip.is_none() {
        body.identity.ip = Some(peer.ip().to_string());
    }

    match state.gateway.create_charge(body, &state.shutdown).await {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(GatewayError::InvalidAmount(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "INVALID_AMOUNT".to_string(),
            }),
        )
            .into_response(),
        Err(GatewayError::AdmissionDenied {
            message,
            retry_after_secs,
            unpaid_count,
            ..
        }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitResponse {
                error: "RATE_LIMIT",
                message,
                retry_after: retry_after_secs,
                unpaid_count,
            }),
        )
            .into_response(),
        Err(error @ (GatewayError::Orchestration(_) | GatewayError::Internal(_))) => {
            tracing::error!(error = %error, "Charge creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /charges`: machine-readable description of the charge endpoint.
#[instrument(skip_all)]
pub async fn get_charge_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/charges",
        "description": "POST to create a PIX charge",
        "body": {
            "amount": "positive decimal",
            "customerName": "optional",
            "customerDocument": "optional",
            "merchantId": "optional",
            "identity": { "fingerprint": "optional", "ip": "optional" },
            "utm": "optional map",
        }
    }))
}

/// `GET /acquirers`: configured acquirer status, credentials excluded.
#[instrument(skip_all)]
pub async fn get_acquirers(State(state): State<AppState>) -> impl IntoResponse {
    let acquirers: Vec<_> = state
        .gateway
        .config()
        .acquirers_by_priority()
        .iter()
        .map(|config| {
            json!({
                "name": config.name,
                "enabled": config.enabled,
                "priority": config.priority,
                "isDefault": config.is_default,
            })
        })
        .collect();
    (StatusCode::OK, Json(acquirers))
}

/// `GET /healthz`: liveness probe.
pub async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionController;
    use crate::monitoring::MonitoringLogger;
    use crate::orchestrator::FailoverOrchestrator;
    use crate::store::InMemoryMonitoringStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let config: crate::config::Config = serde_json::from_str("{}").unwrap();
        let (monitoring, _handle) = MonitoringLogger::spawn(Arc::new(InMemoryMonitoringStore::new()));
        let gateway = ChargeGateway::new(
            Arc::new(config),
            AdmissionController::new(Arc::new(InMemoryAdmissionStore::new())),
            Arc::new(InMemoryChargeStore::new()),
            FailoverOrchestrator::new(Vec::new(), monitoring),
        );
        let state = AppState {
            gateway: Arc::new(gateway),
            shutdown: CancellationToken::new(),
        };
        routes().with_state(state)
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_amount_maps_to_400() {
        let response = app()
            .oneshot(
                Request::post("/charges")
                    .header("content-type", "application/json")
                    .extension(peer())
                    .body(Body::from(r#"{"amount": "0"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_no_acquirers_maps_to_500() {
        let response = app()
            .oneshot(
                Request::post("/charges")
                    .header("content-type", "application/json")
                    .extension(peer())
                    .body(Body::from(r#"{"amount": "10.00"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "No payment acquirer is currently available");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
