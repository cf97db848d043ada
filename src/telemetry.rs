//! Tracing initialization for the gateway.
//!
//! Structured logs go through `tracing` with an `EnvFilter` driven by
//! `RUST_LOG` (default `info`). HTTP request spans come from
//! `tower-http`'s `TraceLayer`, attached in `main`.

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Telemetry registration handle.
#[derive(Debug, Default)]
pub struct Telemetry {
    name: Option<&'static str>,
    version: Option<&'static str>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }

    /// Installs the global subscriber. Call once at startup.
    pub fn register(self) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
        if let (Some(name), Some(version)) = (self.name, self.version) {
            tracing::info!(service = name, version, "Telemetry initialized");
        }
        self
    }

    /// Per-request HTTP tracing layer.
    pub fn http_tracing(&self) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
        TraceLayer::new_for_http()
    }
}
