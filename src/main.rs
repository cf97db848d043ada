//! PIX charge gateway HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that exposes charge
//! creation over the configured PIX acquirers.
//!
//! Endpoints:
//! - `POST /charges` – Create a PIX charge (admission-controlled, with failover)
//! - `GET /charges` – Endpoint description
//! - `GET /acquirers` – Configured acquirer status
//! - `GET /healthz` – Liveness
//!
//! This server includes:
//! - Request tracing via `TraceLayer`
//! - CORS support for checkout-page clients
//! - Graceful shutdown on SIGTERM/SIGINT, aborting pending retries
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `CONFIG` points at the JSON configuration file
//! - `RUST_LOG` controls log verbosity

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use pix_gateway::acquirer::{
    Acquirer, BsPayAcquirer, PrimepagAcquirer, ZendryAcquirer,
};
use pix_gateway::admission::AdmissionController;
use pix_gateway::config::{AcquirerCredentials, Config};
use pix_gateway::gateway::ChargeGateway;
use pix_gateway::handlers::{self, AppState};
use pix_gateway::monitoring::MonitoringLogger;
use pix_gateway::orchestrator::FailoverOrchestrator;
use pix_gateway::sig_down::SigDown;
use pix_gateway::store::{
    InMemoryAdmissionStore, InMemoryChargeStore, InMemoryMonitoringStore,
};
use pix_gateway::telemetry::Telemetry;

/// Builds adapter instances for the configured acquirers. Entries whose
/// credentials do not match the backend's auth scheme are skipped with a
/// warning; the orchestrator then treats them as absent.
fn build_adapters(config: &Config) -> Vec<Arc<dyn Acquirer>> {
    let mut adapters: Vec<Arc<dyn Acquirer>> = Vec::new();
    for acquirer in config.acquirers_by_priority() {
        match (acquirer.name.as_str(), &acquirer.credentials) {
            ("zendry", AcquirerCredentials::ApiKey { api_key }) => {
                adapters.push(Arc::new(ZendryAcquirer::new(
                    acquirer.base_url.as_str(),
                    api_key.as_str(),
                )));
            }
            ("primepag", AcquirerCredentials::OauthClient {
                client_id,
                client_secret,
            }) => {
                adapters.push(Arc::new(PrimepagAcquirer::new(
                    acquirer.base_url.as_str(),
                    client_id.as_str(),
                    client_secret.as_str(),
                )));
            }
            ("bspay", AcquirerCredentials::Basic { username, password }) => {
                adapters.push(Arc::new(BsPayAcquirer::new(
                    acquirer.base_url.as_str(),
                    username.as_str(),
                    password.as_str(),
                )));
            }
            (name, _) => {
                tracing::warn!(
                    acquirer = name,
                    "Unknown acquirer or mismatched credentials; skipping"
                );
            }
        }
    }
    adapters
}

/// Initializes the gateway server.
///
/// - Loads `.env` variables.
/// - Initializes tracing.
/// - Wires stores, adapters, and the orchestration pipeline.
/// - Starts an Axum HTTP server with graceful shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Arc::new(Config::load()?);

    let admission_store = Arc::new(InMemoryAdmissionStore::new());
    let charge_store = Arc::new(InMemoryChargeStore::new());
    let monitoring_store = Arc::new(InMemoryMonitoringStore::new());
    let (monitoring, _monitoring_task) = MonitoringLogger::spawn(monitoring_store);

    let adapters = build_adapters(&config);
    tracing::info!(adapters = adapters.len(), "Acquirer adapters registered");
    let orchestrator = FailoverOrchestrator::new(adapters, monitoring);
    let gateway = ChargeGateway::new(
        Arc::clone(&config),
        AdmissionController::new(admission_store),
        charge_store,
        orchestrator,
    );

    let sig_down = SigDown::try_new()?;
    let state = AppState {
        gateway: Arc::new(gateway),
        shutdown: sig_down.cancellation_token(),
    };

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(
        listener,
        http_endpoints.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(axum_graceful_shutdown)
    .await?;

    Ok(())
}
