//! Primepag adapter: OAuth client-credentials auth, synchronous charge flow.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::acquirer::{
    Acquirer, AcquirerCallError, AcquirerCharge, AcquirerChargeRequest, CustomerInfo,
};
use crate::timestamp::UnixTimestamp;
use crate::types::AcquirerName;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Renew the bearer token this many seconds before it actually expires.
const TOKEN_RENEWAL_MARGIN_SECS: u64 = 60;

pub struct PrimepagAcquirer {
    name: AcquirerName,
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: UnixTimestamp,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct PixChargeRequest {
    value_cents: i64,
    generator_name: String,
    generator_document: String,
    expiration_time: u32,
    external_reference: String,
}

#[derive(Debug, Deserialize)]
struct PixChargeResponse {
    qrcode: PixQrCode,
}

#[derive(Debug, Deserialize)]
struct PixQrCode {
    reference_code: String,
    content: String,
    #[serde(default)]
    image_url: Option<String>,
}

impl PrimepagAcquirer {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");
        PrimepagAcquirer {
            name: AcquirerName::from("primepag"),
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, exchanging client credentials when the
    /// cached one is absent or about to expire.
    async fn bearer_token(&self) -> Result<String, AcquirerCallError> {
        let mut cached = self.token.lock().await;
        let now = UnixTimestamp::now();
        if let Some(token) = cached.as_ref() {
            if now + TOKEN_RENEWAL_MARGIN_SECS < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!("{}/auth/generate_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquirerCallError::Auth(format!(
                "token exchange failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AcquirerCallError::MalformedPayload(e.to_string()))?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(access_token)
    }
}

#[async_trait::async_trait]
impl Acquirer for PrimepagAcquirer {
    fn name(&self) -> &AcquirerName {
        &self.name
    }

    async fn create_charge(
        &self,
        request: &AcquirerChargeRequest,
    ) -> Result<AcquirerCharge, AcquirerCallError> {
        let token = self.bearer_token().await?;
        let customer = CustomerInfo::from_request(request);

        // Primepag takes integer cents.
        let value_cents = (request.amount.as_decimal() * rust_decimal::Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| {
                AcquirerCallError::MalformedPayload("amount does not fit in cents".to_string())
            })?;
        let body = PixChargeRequest {
            value_cents,
            generator_name: customer.name,
            generator_document: customer.document,
            expiration_time: 3600,
            external_reference: request.reference.clone(),
        };

        let url = format!("{}/v1/pix/qrcodes", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquirerCallError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }
        let created: PixChargeResponse = response
            .json()
            .await
            .map_err(|e| AcquirerCallError::MalformedPayload(e.to_string()))?;

        Ok(AcquirerCharge {
            pix_code: created.qrcode.content,
            qr_code_url: created.qrcode.image_url,
            external_id: created.qrcode.reference_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_response_parses_nested_qrcode() {
        let json = serde_json::json!({
            "qrcode": {
                "reference_code": "pp-77",
                "content": "00020126primepag",
                "image_url": "https://primepag.example/qr/pp-77.png"
            }
        });
        let response: PixChargeResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.qrcode.reference_code, "pp-77");
        assert_eq!(response.qrcode.content, "00020126primepag");
    }

    #[test]
    fn test_request_uses_integer_cents() {
        let body = PixChargeRequest {
            value_cents: 2590,
            generator_name: "Cliente PIX".to_string(),
            generator_document: "12345678901".to_string(),
            expiration_time: 3600,
            external_reference: "ref-2".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["value_cents"], 2590);
    }
}
