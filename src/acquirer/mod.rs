//! Acquirer adapter interface and its concrete backend implementations.
//!
//! Each PIX processor speaks its own dialect: different auth schemes,
//! different payload shapes, different mandatory customer fields, and in some
//! cases an asynchronous charge flow where the PIX code only materializes
//! after polling. Adapters normalize all of that behind [`Acquirer`]: the
//! orchestrator sees a uniform `create_charge` that either yields a usable
//! PIX code or a single [`AcquirerCallError`].

mod bspay;
mod primepag;
mod zendry;

pub use bspay::BsPayAcquirer;
pub use primepag::PrimepagAcquirer;
pub use zendry::ZendryAcquirer;

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;

use crate::types::{AcquirerName, ChargeAmount};

/// Normalized charge-creation request handed to an adapter.
///
/// Customer fields are optional on the inbound request; adapters whose
/// backend mandates them fill in placeholders via [`CustomerInfo`].
#[derive(Debug, Clone)]
pub struct AcquirerChargeRequest {
    pub amount: ChargeAmount,
    pub customer_name: Option<String>,
    pub customer_document: Option<String>,
    /// Gateway-side correlation id sent to the backend where supported.
    pub reference: String,
}

/// Normalized successful outcome of an adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquirerCharge {
    /// The PIX copy-and-paste code ("copia e cola").
    pub pix_code: String,
    /// URL of a rendered QR image, when the backend provides one.
    pub qr_code_url: Option<String>,
    /// Backend-assigned transaction identifier.
    pub external_id: String,
}

/// Uniform failure of one adapter call. Non-success HTTP status, malformed
/// payloads, and exhausted polling all collapse into this type; the
/// orchestrator treats them identically as a retry signal.
#[derive(Debug, thiserror::Error)]
pub enum AcquirerCallError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend returned status {status}: {body}")]
    BackendStatus { status: u16, body: String },
    #[error("Malformed backend payload: {0}")]
    MalformedPayload(String),
    #[error("Backend authentication failed: {0}")]
    Auth(String),
    #[error("PIX code not available after {attempts} polling attempts")]
    CodeNeverAppeared { attempts: u32 },
}

/// One backend PIX processor.
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Name matching the corresponding [`AcquirerConfig`](crate::config::AcquirerConfig) entry.
    fn name(&self) -> &AcquirerName;

    /// Creates a PIX charge on the backend, polling for the code when the
    /// backend answers asynchronously.
    async fn create_charge(
        &self,
        request: &AcquirerChargeRequest,
    ) -> Result<AcquirerCharge, AcquirerCallError>;
}

#[async_trait]
impl<T: Acquirer + ?Sized> Acquirer for Arc<T> {
    fn name(&self) -> &AcquirerName {
        self.as_ref().name()
    }

    async fn create_charge(
        &self,
        request: &AcquirerChargeRequest,
    ) -> Result<AcquirerCharge, AcquirerCallError> {
        self.as_ref().create_charge(request).await
    }
}

/// Customer fields with placeholders filled in.
///
/// Some backends require a name, document, or email even for anonymous
/// checkout charges. Fabricated values are plausible but inert: a generic
/// payer name, a random 11-digit document, and a derived email.
#[derive(Debug, Clone)]
pub struct CustomerInfo {
    pub name: String,
    pub document: String,
    pub email: String,
}

impl CustomerInfo {
    pub fn from_request(request: &AcquirerChargeRequest) -> Self {
        let name = request
            .customer_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Cliente PIX".to_string());
        let document = request
            .customer_document
            .clone()
            .filter(|document| !document.is_empty())
            .unwrap_or_else(random_document);
        let email = format!(
            "pagador-{}@pagamentos.example.com",
            &request.reference[..request.reference.len().min(8)]
        );
        CustomerInfo {
            name,
            document,
            email,
        }
    }
}

/// Fabricates an 11-digit CPF-shaped document number.
fn random_document() -> String {
    let mut rng = rand::rng();
    (0..11).map(|_| rng.random_range(0..=9).to_string()).collect()
}
