//! Zendry adapter: API-key auth with an asynchronous charge flow.
//!
//! Zendry acknowledges a QR-code request immediately but renders the EMV
//! payload out of band, so the creation response often arrives without a PIX
//! code. The adapter then polls the charge endpoint a fixed number of times
//! with a fixed delay; if the code never appears the call fails like any
//! other backend error.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acquirer::{
    Acquirer, AcquirerCallError, AcquirerCharge, AcquirerChargeRequest, CustomerInfo,
};
use crate::types::AcquirerName;

const POLL_ATTEMPTS: u32 = 5;
const POLL_DELAY: Duration = Duration::from_secs(1);
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ZendryAcquirer {
    name: AcquirerName,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct QrCodeRequest {
    value: String,
    external_reference: String,
    payer: Payer,
}

#[derive(Debug, Serialize)]
struct Payer {
    name: String,
    document: String,
}

#[derive(Debug, Deserialize)]
struct QrCodeResponse {
    transaction_id: String,
    #[serde(default)]
    qr_code: Option<QrCode>,
}

#[derive(Debug, Deserialize)]
struct QrCode {
    #[serde(default)]
    emv: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl ZendryAcquirer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");
        ZendryAcquirer {
            name: AcquirerName::from("zendry"),
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch_charge(&self, transaction_id: &str) -> Result<QrCodeResponse, AcquirerCallError> {
        let url = format!("{}/v1/pix/qrcodes/{}", self.base_url, transaction_id);
        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        parse_response(response).await
    }
}

async fn parse_response(response: reqwest::Response) -> Result<QrCodeResponse, AcquirerCallError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AcquirerCallError::Auth(format!("status {}", status.as_u16())));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AcquirerCallError::BackendStatus {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<QrCodeResponse>()
        .await
        .map_err(|e| AcquirerCallError::MalformedPayload(e.to_string()))
}

fn charge_from(response: QrCodeResponse) -> Option<AcquirerCharge> {
    let qr_code = response.qr_code?;
    let pix_code = qr_code.emv?;
    Some(AcquirerCharge {
        pix_code,
        qr_code_url: qr_code.image_url,
        external_id: response.transaction_id,
    })
}

#[async_trait::async_trait]
impl Acquirer for ZendryAcquirer {
    fn name(&self) -> &AcquirerName {
        &self.name
    }

    async fn create_charge(
        &self,
        request: &AcquirerChargeRequest,
    ) -> Result<AcquirerCharge, AcquirerCallError> {
        let customer = CustomerInfo::from_request(request);
        let body = QrCodeRequest {
            value: request.amount.to_string(),
            external_reference: request.reference.clone(),
            payer: Payer {
                name: customer.name,
                document: customer.document,
            },
        };

        let url = format!("{}/v1/pix/qrcodes", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let created = parse_response(response).await?;
        let transaction_id = created.transaction_id.clone();

        if let Some(charge) = charge_from(created) {
            return Ok(charge);
        }

        // Asynchronous flow: the EMV payload shows up on a subsequent read.
        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(POLL_DELAY).await;
            tracing::debug!(
                transaction_id = %transaction_id,
                attempt,
                "Polling Zendry for PIX code"
            );
            let polled = self.fetch_charge(&transaction_id).await?;
            if let Some(charge) = charge_from(polled) {
                return Ok(charge);
            }
        }

        Err(AcquirerCallError::CodeNeverAppeared {
            attempts: POLL_ATTEMPTS,
        })
    }
}
