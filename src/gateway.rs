//! The charge gateway: glues admission control, fee resolution, failover
//! orchestration, and persistence into one request pipeline.
//!
//! Per request the pipeline is: validate the amount, check admission,
//! resolve fees, orchestrate acquirer attempts, then on success persist the
//! charge record and update admission state. Only validation failures,
//! admission denials, and orchestration exhaustion/unavailability cross this
//! boundary; per-attempt acquirer errors stay inside the orchestrator, and
//! persistence failures after a successful acquirer call are logged but
//! never turn the response into a failure (the charge genuinely exists
//! upstream).

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::acquirer::AcquirerChargeRequest;
use crate::admission::{AdmissionController, Decision, DenyReason};
use crate::config::Config;
use crate::fees::resolve_fee;
use crate::orchestrator::{FailoverOrchestrator, OrchestrationError};
use crate::store::{AdmissionStateStore, ChargeStore, PersistenceError};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    ChargeAmount, ChargeCreated, ChargeRecord, ChargeRequest, ChargeStatus, InvalidAmount,
};

/// Caller-visible failure of a charge-creation request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bad input, rejected before any admission check.
    #[error(transparent)]
    InvalidAmount(#[from] InvalidAmount),
    /// Admission denied for this attempt.
    #[error("{message}")]
    AdmissionDenied {
        reason: DenyReason,
        message: String,
        retry_after_secs: u64,
        unpaid_count: u32,
    },
    /// Orchestration exhaustion or acquirer unavailability.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
    /// Unexpected fault reading admission state.
    #[error("Internal error: {0}")]
    Internal(#[from] PersistenceError),
}

/// Entry point for charge creation. Generic over its store seams so tests
/// run against the in-memory implementations with no network.
pub struct ChargeGateway<A, C> {
    config: Arc<Config>,
    admission: AdmissionController<A>,
    charges: Arc<C>,
    orchestrator: FailoverOrchestrator,
}

impl<A, C> ChargeGateway<A, C>
where
    A: AdmissionStateStore,
    C: ChargeStore,
{
    pub fn new(
        config: Arc<Config>,
        admission: AdmissionController<A>,
        charges: Arc<C>,
        orchestrator: FailoverOrchestrator,
    ) -> Self {
        ChargeGateway {
            config,
            admission,
            charges,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a new PIX charge.
    ///
    /// `cancel` aborts pending retries when the caller goes away; an
    /// in-flight adapter call still runs to its own HTTP timeout.
    #[instrument(skip_all, fields(merchant_id = request.merchant_id.as_deref()))]
    pub async fn create_charge(
        &self,
        request: ChargeRequest,
        cancel: &CancellationToken,
    ) -> Result<ChargeCreated, GatewayError> {
        let amount = ChargeAmount::try_from(request.amount)?;

        // Config snapshot: read once, immutable for the rest of the request.
        let policy = self.config.rate_limit().clone();
        let failover = self.config.failover().clone();
        let acquirers = self.config.acquirers_by_priority();
        let preferred = self
            .config
            .preferred_acquirer(request.merchant_id.as_deref())
            .cloned();

        match self.admission.check(&request.identity, &policy)? {
            Decision::Allow => {}
            Decision::Deny {
                reason,
                retry_after_secs,
                unpaid_count,
            } => {
                tracing::info!(
                    reason = reason.code(),
                    retry_after_secs,
                    unpaid_count,
                    "Charge request denied by admission control"
                );
                return Err(GatewayError::AdmissionDenied {
                    reason,
                    message: reason.message().to_string(),
                    retry_after_secs,
                    unpaid_count,
                });
            }
        }

        let fee = resolve_fee(self.config.fees(), request.merchant_id.as_deref());

        let charge_id = Uuid::new_v4().to_string();
        let acquirer_request = AcquirerChargeRequest {
            amount,
            customer_name: request.customer_name.clone(),
            customer_document: request.customer_document.clone(),
            reference: charge_id.clone(),
        };

        let success = self
            .orchestrator
            .run(
                &acquirers,
                preferred.as_ref(),
                &acquirer_request,
                &failover,
                cancel,
            )
            .await?;

        tracing::info!(
            charge_id = %charge_id,
            acquirer = %success.acquirer_used,
            attempts = success.attempts_used,
            "Charge created"
        );

        // The charge exists upstream from here on: persistence and admission
        // bookkeeping failures are logged, never surfaced.
        let record = ChargeRecord {
            id: charge_id.clone(),
            external_ref: success.charge.external_id.clone(),
            amount,
            status: ChargeStatus::Generated,
            acquirer: success.acquirer_used.clone(),
            fee_percentage: fee.percentage,
            fee_fixed: fee.fixed,
            identity_key: request.identity.key(),
            created_at: UnixTimestamp::now(),
            paid_at: None,
        };
        if let Err(error) = self.charges.insert(record) {
            tracing::error!(charge_id = %charge_id, error = %error, "Failed to persist charge record");
        }
        if let Err(error) = self.admission.record_success(&request.identity, &policy) {
            tracing::error!(charge_id = %charge_id, error = %error, "Failed to update admission state");
        }

        Ok(ChargeCreated {
            success: true,
            pix_code: success.charge.pix_code,
            qr_code_url: success.charge.qr_code_url,
            transaction_id: charge_id,
            acquirer_used: success.acquirer_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquirer::{Acquirer, AcquirerCallError, AcquirerCharge};
    use crate::monitoring::MonitoringLogger;
    use crate::store::{InMemoryAdmissionStore, InMemoryChargeStore, InMemoryMonitoringStore};
    use crate::types::{AcquirerName, Identity};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAcquirer {
        name: AcquirerName,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Acquirer for FlakyAcquirer {
        fn name(&self) -> &AcquirerName {
            &self.name
        }

        async fn create_charge(
            &self,
            request: &AcquirerChargeRequest,
        ) -> Result<AcquirerCharge, AcquirerCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AcquirerCallError::BackendStatus {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(AcquirerCharge {
                    pix_code: "00020126fake".to_string(),
                    qr_code_url: None,
                    external_id: format!("ext-{}", request.reference),
                })
            }
        }
    }

    /// Charge store whose writes always fail, for the persistence-never-
    /// fails-a-success property.
    struct BrokenChargeStore;

    impl ChargeStore for BrokenChargeStore {
        fn insert(&self, _record: ChargeRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::WriteFailed("disk on fire".to_string()))
        }

        fn fetch(&self, _id: &str) -> Result<Option<ChargeRecord>, PersistenceError> {
            Ok(None)
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(
            serde_json::from_str(
                r#"{
                    "acquirers": [
                        {"name": "fake", "priority": 1, "base_url": "https://fake.example"}
                    ],
                    "fees": [
                        {"percentage": "4.99", "fixed": "0.40", "is_default": true}
                    ],
                    "failover": {"max_retries": 2, "retry_delay_ms": 0}
                }"#,
            )
            .unwrap(),
        )
    }

    fn gateway(
        fail: bool,
        charges: Arc<InMemoryChargeStore>,
    ) -> (
        ChargeGateway<InMemoryAdmissionStore, InMemoryChargeStore>,
        Arc<InMemoryAdmissionStore>,
    ) {
        let adapter = Arc::new(FlakyAcquirer {
            name: AcquirerName::from("fake"),
            fail,
            calls: AtomicU32::new(0),
        });
        let (monitoring, _handle) = MonitoringLogger::spawn(Arc::new(InMemoryMonitoringStore::new()));
        let orchestrator = FailoverOrchestrator::new(vec![adapter], monitoring);
        let admission_store = Arc::new(InMemoryAdmissionStore::new());
        let gateway = ChargeGateway::new(
            test_config(),
            AdmissionController::new(Arc::clone(&admission_store)),
            charges,
            orchestrator,
        );
        (gateway, admission_store)
    }

    fn charge_request(amount: rust_decimal::Decimal, fingerprint: &str) -> ChargeRequest {
        ChargeRequest {
            amount,
            customer_name: None,
            customer_document: None,
            merchant_id: None,
            identity: Identity::from_fingerprint(fingerprint),
            utm: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_success_persists_record_and_admission_state() {
        let charges = Arc::new(InMemoryChargeStore::new());
        let (gateway, admission_store) = gateway(false, Arc::clone(&charges));

        let created = gateway
            .create_charge(charge_request(dec!(25.90), "dev-ok"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(created.success);
        assert_eq!(created.pix_code, "00020126fake");
        assert_eq!(created.acquirer_used, AcquirerName::from("fake"));

        let record = charges.fetch(&created.transaction_id).unwrap().unwrap();
        assert_eq!(record.status, ChargeStatus::Generated);
        assert_eq!(record.fee_percentage, dec!(4.99));
        assert_eq!(record.external_ref, format!("ext-{}", created.transaction_id));

        let key = Identity::from_fingerprint("dev-ok").key().unwrap();
        let state = crate::store::AdmissionStateStore::fetch(admission_store.as_ref(), &key)
            .unwrap()
            .unwrap();
        assert_eq!(state.unpaid_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected_before_admission() {
        let charges = Arc::new(InMemoryChargeStore::new());
        let (gateway, admission_store) = gateway(false, Arc::clone(&charges));

        let result = gateway
            .create_charge(charge_request(dec!(0), "dev-zero"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidAmount(_))));
        assert!(charges.is_empty());

        let key = Identity::from_fingerprint("dev-zero").key().unwrap();
        assert!(
            crate::store::AdmissionStateStore::fetch(admission_store.as_ref(), &key)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_orchestration_leaves_no_charge_record() {
        let charges = Arc::new(InMemoryChargeStore::new());
        let (gateway, admission_store) = gateway(true, Arc::clone(&charges));

        let result = gateway
            .create_charge(charge_request(dec!(10), "dev-fail"), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::Orchestration(OrchestrationError::Exhausted { .. }))
        ));
        assert!(charges.is_empty());

        // Failed attempts never count against the identity.
        let key = Identity::from_fingerprint("dev-fail").key().unwrap();
        assert!(
            crate::store::AdmissionStateStore::fetch(admission_store.as_ref(), &key)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_denial_after_threshold_with_retry_after() {
        let charges = Arc::new(InMemoryChargeStore::new());
        let (gateway, _admission_store) = gateway(false, Arc::clone(&charges));

        // Policy defaults: max_unpaid=2, cooldown=30s. Two successes put the
        // identity at the threshold; the cooldown alone would also deny, so
        // just assert the third request bounces with a retryAfter.
        gateway
            .create_charge(charge_request(dec!(10), "dev-429"), &CancellationToken::new())
            .await
            .unwrap();
        let result = gateway
            .create_charge(charge_request(dec!(10), "dev-429"), &CancellationToken::new())
            .await;
        match result {
            Err(GatewayError::AdmissionDenied {
                reason,
                retry_after_secs,
                unpaid_count,
                ..
            }) => {
                assert_eq!(reason, DenyReason::Cooldown);
                assert!(retry_after_secs <= 30);
                assert_eq!(unpaid_count, 1);
            }
            other => panic!("expected admission denial, got {other:?}"),
        }
        assert_eq!(charges.len(), 1);
    }

    #[tokio::test]
    async fn test_charge_store_failure_does_not_fail_the_response() {
        let adapter = Arc::new(FlakyAcquirer {
            name: AcquirerName::from("fake"),
            fail: false,
            calls: AtomicU32::new(0),
        });
        let (monitoring, _handle) = MonitoringLogger::spawn(Arc::new(InMemoryMonitoringStore::new()));
        let gateway = ChargeGateway::new(
            test_config(),
            AdmissionController::new(Arc::new(InMemoryAdmissionStore::new())),
            Arc::new(BrokenChargeStore),
            FailoverOrchestrator::new(vec![adapter], monitoring),
        );

        let created = gateway
            .create_charge(charge_request(dec!(10), "dev-broken"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(created.success);
    }
}
