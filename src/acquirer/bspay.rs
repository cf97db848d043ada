//! BSPay adapter: HTTP Basic auth, synchronous charge flow with a nested
//! response payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acquirer::{
    Acquirer, AcquirerCallError, AcquirerCharge, AcquirerChargeRequest, CustomerInfo,
};
use crate::types::AcquirerName;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct BsPayAcquirer {
    name: AcquirerName,
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CashInRequest {
    amount: String,
    external_id: String,
    payer: CashInPayer,
    #[serde(rename = "postbackUrl", skip_serializing_if = "Option::is_none")]
    postback_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CashInPayer {
    name: String,
    document: String,
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashInResponse {
    data: CashInData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashInData {
    transaction_id: String,
    qrcode: CashInQrCode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashInQrCode {
    payload: String,
    #[serde(default)]
    image: Option<String>,
}

impl BsPayAcquirer {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");
        BsPayAcquirer {
            name: AcquirerName::from("bspay"),
            http,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait::async_trait]
impl Acquirer for BsPayAcquirer {
    fn name(&self) -> &AcquirerName {
        &self.name
    }

    async fn create_charge(
        &self,
        request: &AcquirerChargeRequest,
    ) -> Result<AcquirerCharge, AcquirerCallError> {
        // BSPay requires the full payer block, email included.
        let customer = CustomerInfo::from_request(request);
        let body = CashInRequest {
            amount: request.amount.to_string(),
            external_id: request.reference.clone(),
            payer: CashInPayer {
                name: customer.name,
                document: customer.document,
                email: customer.email,
            },
            postback_url: None,
        };

        let url = format!("{}/v2/pix/cash-in", self.base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AcquirerCallError::Auth("invalid BSPay credentials".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquirerCallError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }
        let created: CashInResponse = response
            .json()
            .await
            .map_err(|e| AcquirerCallError::MalformedPayload(e.to_string()))?;

        Ok(AcquirerCharge {
            pix_code: created.data.qrcode.payload,
            qr_code_url: created.data.qrcode.image,
            external_id: created.data.transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_unwraps_nested_data() {
        let json = serde_json::json!({
            "data": {
                "transactionId": "bs-41",
                "qrcode": {
                    "payload": "00020126bspay",
                    "image": null
                }
            }
        });
        let response: CashInResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.data.transaction_id, "bs-41");
        assert_eq!(response.data.qrcode.payload, "00020126bspay");
        assert!(response.data.qrcode.image.is_none());
    }
}
