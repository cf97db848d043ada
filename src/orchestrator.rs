//! Failover orchestration: drives one charge-creation run across the enabled
//! acquirers under a bounded global attempt budget.
//!
//! The run order comes from acquirer priority; the global budget is split
//! evenly as `ceil(max_retries / enabled_count)` attempts per acquirer, with
//! no reallocation of attempts an exhausted acquirer did not use. The
//! schedule is computed up front as a plain list of [`AttemptSlot`]s, so the
//! control flow is testable without adapters or clocks: the async loop just
//! walks the slots, calls adapters, and emits monitoring events.
//!
//! Two terminal failures are deliberately distinct: an empty enabled list
//! fails with [`OrchestrationError::AcquirerUnavailable`] before any attempt
//! or monitoring event, while a run that burned its budget fails with
//! [`OrchestrationError::Exhausted`] carrying the last error and the attempt
//! count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::acquirer::{Acquirer, AcquirerCharge, AcquirerChargeRequest};
use crate::config::{AcquirerConfig, FailoverConfig};
use crate::monitoring::MonitoringLogger;
use crate::timestamp::UnixTimestamp;
use crate::types::{AcquirerName, MonitoringEvent, MonitoringEventType};

/// Successful orchestration outcome.
#[derive(Debug, Clone)]
pub struct OrchestrationSuccess {
    pub charge: AcquirerCharge,
    pub acquirer_used: AcquirerName,
    pub attempts_used: u32,
}

/// Terminal orchestration failure.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// No enabled acquirer with a registered adapter. Zero attempts were
    /// made and zero monitoring events emitted.
    #[error("No payment acquirer is currently available")]
    AcquirerUnavailable,
    /// The attempt budget ran out (or the request was cancelled mid-run).
    #[error("Charge creation failed after {attempts} attempt(s): {last_error}")]
    Exhausted { last_error: String, attempts: u32 },
}

/// One planned adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttemptSlot {
    /// Index into the enabled-acquirer list.
    acquirer_index: usize,
    /// 1-based attempt ordinal within this acquirer's share of the budget.
    attempt_for_acquirer: u32,
    /// 1-based attempt ordinal across the whole run; never exceeds the
    /// global budget.
    global_attempt: u32,
}

/// Computes the attempt schedule for a run: `ceil(max_retries / count)`
/// slots per acquirer, truncated so the global ordinal never exceeds
/// `max_retries`. Unused slots of an earlier acquirer are not reallocated.
fn plan_attempts(enabled_count: usize, max_retries: u32) -> Vec<AttemptSlot> {
    if enabled_count == 0 || max_retries == 0 {
        return Vec::new();
    }
    let per_acquirer = max_retries.div_ceil(enabled_count as u32);
    let mut slots = Vec::with_capacity(max_retries as usize);
    let mut global_attempt = 0;
    'acquirers: for acquirer_index in 0..enabled_count {
        for attempt_for_acquirer in 1..=per_acquirer {
            if global_attempt == max_retries {
                break 'acquirers;
            }
            global_attempt += 1;
            slots.push(AttemptSlot {
                acquirer_index,
                attempt_for_acquirer,
                global_attempt,
            });
        }
    }
    slots
}

/// Iterates the enabled acquirers in priority order, invoking adapters with
/// retry and failover until one succeeds or the budget is exhausted.
pub struct FailoverOrchestrator {
    adapters: HashMap<AcquirerName, Arc<dyn Acquirer>>,
    monitoring: MonitoringLogger,
}

impl FailoverOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn Acquirer>>, monitoring: MonitoringLogger) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.name().clone(), adapter))
            .collect();
        FailoverOrchestrator {
            adapters,
            monitoring,
        }
    }

    /// Runs one orchestration: failover across `acquirers` when enabled in
    /// `failover`, or a degenerate single call otherwise.
    ///
    /// `acquirers` must already be ordered by priority; disabled entries and
    /// entries without a registered adapter are filtered here, before any
    /// adapter is invoked. `preferred` is the merchant's acquirer override,
    /// honored only in single-call mode.
    #[instrument(skip_all, fields(failover_enabled = failover.enabled))]
    pub async fn run(
        &self,
        acquirers: &[AcquirerConfig],
        preferred: Option<&AcquirerName>,
        request: &AcquirerChargeRequest,
        failover: &FailoverConfig,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationSuccess, OrchestrationError> {
        if !failover.enabled {
            return self.run_single(acquirers, preferred, request).await;
        }

        let enabled = self.enabled_adapters(acquirers);
        if enabled.is_empty() {
            return Err(OrchestrationError::AcquirerUnavailable);
        }

        let slots = plan_attempts(enabled.len(), failover.max_retries);
        let delay = Duration::from_millis(failover.retry_delay_ms);
        let mut last_error = String::new();
        let mut attempts_used = 0;

        for (position, slot) in slots.iter().enumerate() {
            let adapter = &enabled[slot.acquirer_index];
            attempts_used = slot.global_attempt;

            if slot.global_attempt > 1 {
                self.monitoring.log(attempt_event(
                    adapter.name(),
                    MonitoringEventType::Retry,
                    0,
                    None,
                    slot.global_attempt,
                ));
            }

            tracing::debug!(
                acquirer = %adapter.name(),
                attempt = slot.attempt_for_acquirer,
                global_attempt = slot.global_attempt,
                "Attempting charge creation"
            );
            let started = Instant::now();
            match adapter.create_charge(request).await {
                Ok(charge) => {
                    self.monitoring.log(attempt_event(
                        adapter.name(),
                        MonitoringEventType::Success,
                        started.elapsed().as_millis() as u64,
                        None,
                        slot.global_attempt,
                    ));
                    return Ok(OrchestrationSuccess {
                        charge,
                        acquirer_used: adapter.name().clone(),
                        attempts_used,
                    });
                }
                Err(error) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!(
                        acquirer = %adapter.name(),
                        global_attempt = slot.global_attempt,
                        error = %error,
                        "Charge attempt failed"
                    );
                    last_error = error.to_string();
                    self.monitoring.log(attempt_event(
                        adapter.name(),
                        MonitoringEventType::Failure,
                        elapsed_ms,
                        Some(last_error.clone()),
                        slot.global_attempt,
                    ));

                    // Delay only between consecutive attempts on the same
                    // acquirer; switching acquirers happens immediately.
                    let retrying_same = slots
                        .get(position + 1)
                        .is_some_and(|next| next.acquirer_index == slot.acquirer_index);
                    if retrying_same {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return Err(OrchestrationError::Exhausted {
                                    last_error,
                                    attempts: attempts_used,
                                });
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        Err(OrchestrationError::Exhausted {
            last_error,
            attempts: attempts_used,
        })
    }

    /// Degenerate mode: exactly one acquirer, one call, no retry. The raw
    /// adapter error is surfaced unmodified.
    async fn run_single(
        &self,
        acquirers: &[AcquirerConfig],
        preferred: Option<&AcquirerName>,
        request: &AcquirerChargeRequest,
    ) -> Result<OrchestrationSuccess, OrchestrationError> {
        let enabled = self.enabled_configs(acquirers);
        let chosen = preferred
            .and_then(|name| enabled.iter().find(|config| &config.name == name))
            .or_else(|| enabled.iter().find(|config| config.is_default))
            .or_else(|| enabled.first())
            .ok_or(OrchestrationError::AcquirerUnavailable)?;
        let adapter = self
            .adapters
            .get(&chosen.name)
            .ok_or(OrchestrationError::AcquirerUnavailable)?;

        let started = Instant::now();
        match adapter.create_charge(request).await {
            Ok(charge) => {
                self.monitoring.log(attempt_event(
                    adapter.name(),
                    MonitoringEventType::Success,
                    started.elapsed().as_millis() as u64,
                    None,
                    1,
                ));
                Ok(OrchestrationSuccess {
                    charge,
                    acquirer_used: adapter.name().clone(),
                    attempts_used: 1,
                })
            }
            Err(error) => {
                let last_error = error.to_string();
                self.monitoring.log(attempt_event(
                    adapter.name(),
                    MonitoringEventType::Failure,
                    started.elapsed().as_millis() as u64,
                    Some(last_error.clone()),
                    1,
                ));
                Err(OrchestrationError::Exhausted {
                    last_error,
                    attempts: 1,
                })
            }
        }
    }

    fn enabled_configs<'a>(&self, acquirers: &'a [AcquirerConfig]) -> Vec<&'a AcquirerConfig> {
        acquirers
            .iter()
            .filter(|config| config.enabled && self.adapters.contains_key(&config.name))
            .collect()
    }

    fn enabled_adapters(&self, acquirers: &[AcquirerConfig]) -> Vec<Arc<dyn Acquirer>> {
        acquirers
            .iter()
            .filter(|config| config.enabled)
            .filter_map(|config| self.adapters.get(&config.name).cloned())
            .collect()
    }
}

fn attempt_event(
    acquirer: &AcquirerName,
    event_type: MonitoringEventType,
    response_time_ms: u64,
    error_message: Option<String>,
    retry_attempt: u32,
) -> MonitoringEvent {
    MonitoringEvent {
        acquirer: acquirer.clone(),
        event_type,
        response_time_ms,
        error_message,
        retry_attempt,
        created_at: UnixTimestamp::now(),
    }
}
