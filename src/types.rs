//! Type definitions for the PIX charge gateway.
//!
//! The key objects are [`ChargeRequest`] and [`ChargeCreated`], which encode
//! the inbound charge intent and the outcome returned to the caller, plus the
//! persisted shapes: [`ChargeRecord`], [`AdmissionState`], and
//! [`MonitoringEvent`]. Wire types serialize in camelCase for compatibility
//! with the checkout clients that call this gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;

use crate::timestamp::UnixTimestamp;

/// A validated, strictly positive charge amount in BRL.
///
/// Construction is the validation point: any `amount <= 0` is rejected before
/// admission control runs, so downstream code never sees a non-positive value.
/// Deserialization funnels through [`TryFrom`], so a persisted record cannot
/// smuggle in a non-positive amount either.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct ChargeAmount(Decimal);

/// Error returned when a charge amount is zero or negative.
#[derive(Debug, thiserror::Error)]
#[error("Amount must be a positive decimal, got {0}")]
pub struct InvalidAmount(pub Decimal);

impl TryFrom<Decimal> for ChargeAmount {
    type Error = InvalidAmount;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value <= Decimal::ZERO {
            return Err(InvalidAmount(value));
        }
        Ok(ChargeAmount(value))
    }
}

impl ChargeAmount {
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl Display for ChargeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// The name of a configured acquirer backend, e.g. `"zendry"`.
///
/// Used as the lookup key between [`AcquirerConfig`](crate::config::AcquirerConfig)
/// entries and registered adapter instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcquirerName(String);

impl AcquirerName {
    pub fn new(name: impl Into<String>) -> Self {
        AcquirerName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AcquirerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AcquirerName {
    fn from(value: &str) -> Self {
        AcquirerName(value.to_string())
    }
}

/// Client identity used as the rate-limit key.
///
/// A device fingerprint takes precedence; the caller IP is the fallback.
/// An identity with neither yields no key and admission fails open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl Identity {
    pub fn from_fingerprint(fingerprint: impl Into<String>) -> Self {
        Identity {
            fingerprint: Some(fingerprint.into()),
            ip: None,
        }
    }

    /// Resolves the rate-limit key: fingerprint first, IP as fallback.
    /// Keys are namespaced so a fingerprint can never collide with an IP.
    pub fn key(&self) -> Option<IdentityKey> {
        if let Some(fingerprint) = &self.fingerprint {
            if !fingerprint.is_empty() {
                return Some(IdentityKey(format!("fp:{fingerprint}")));
            }
        }
        if let Some(ip) = &self.ip {
            if !ip.is_empty() {
                return Some(IdentityKey(format!("ip:{ip}")));
            }
        }
        None
    }
}

/// Namespaced rate-limit identity key (`fp:...` or `ip:...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound body of `POST /charges`.
///
/// The amount arrives as a raw decimal and is validated into a
/// [`ChargeAmount`] by the gateway, so that `amount <= 0` maps to the
/// `INVALID_AMOUNT` wire error rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub utm: HashMap<String, String>,
}

/// Successful outcome of `POST /charges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeCreated {
    pub success: bool,
    pub pix_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<String>,
    pub transaction_id: String,
    pub acquirer_used: AcquirerName,
}

/// Lifecycle of a persisted charge. A record is created as `generated`;
/// transitions to `paid`/`expired` are driven by an out-of-scope webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Generated,
    Paid,
    Expired,
}

/// A persisted charge, created exactly once per successful acquirer call.
/// Failed attempts never produce a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub id: String,
    /// The acquirer-assigned transaction identifier.
    pub external_ref: String,
    pub amount: ChargeAmount,
    pub status: ChargeStatus,
    pub acquirer: AcquirerName,
    pub fee_percentage: Decimal,
    pub fee_fixed: Decimal,
    pub identity_key: Option<IdentityKey>,
    pub created_at: UnixTimestamp,
    pub paid_at: Option<UnixTimestamp>,
}

/// One row per rate-limit identity, mutated only by the admission controller.
///
/// Rows are created lazily on the first successful charge and never deleted:
/// stale rows age out logically via the window check on the next read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionState {
    pub identity_key: IdentityKey,
    pub unpaid_count: u32,
    pub last_generation_at: Option<UnixTimestamp>,
    pub blocked_until: Option<UnixTimestamp>,
    pub updated_at: UnixTimestamp,
}

/// Classifies a monitoring event emitted during orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringEventType {
    Success,
    Failure,
    Retry,
    CircuitOpen,
    CircuitClose,
}

/// Append-only record of a single orchestration attempt against one acquirer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub acquirer: AcquirerName,
    pub event_type: MonitoringEventType,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    /// Global attempt ordinal (1-based) within one orchestration run. A
    /// retry marker carries the ordinal of the attempt it precedes, so the
    /// sequence is non-decreasing across a run's events.
    pub retry_attempt: u32,
    pub created_at: UnixTimestamp,
}

/// Resolved fee for a merchant: a percentage of the amount plus a fixed cut.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub percentage: Decimal,
    pub fixed: Decimal,
}

/// Generic JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
