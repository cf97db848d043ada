//! Admission control: a per-identity sliding-window rate limiter that gates
//! charge creation.
//!
//! Every inbound request passes through [`AdmissionController::check`] before
//! any acquirer is contacted. The controller counts *successful* charge
//! creations per identity inside a rolling window; failed attempts never
//! count. Once an identity accumulates `max_unpaid` generated-but-unpaid
//! charges, it is blocked for a full window. Blocking is pre-emptive: the
//! update that brings `unpaid_count` to the threshold also sets
//! `blocked_until`, so the identity starts seeing denials immediately rather
//! than on its next evaluated attempt.

use std::sync::Arc;

use crate::config::RateLimitPolicy;
use crate::store::{AdmissionStateStore, PersistenceError, new_admission_state};
use crate::timestamp::UnixTimestamp;
use crate::types::{AdmissionState, Identity};

/// Why an admission check denied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// A previously set `blocked_until` is still in the future.
    Blocked,
    /// The previous successful charge was too recent.
    Cooldown,
    /// The identity reached `max_unpaid` generated-but-unpaid charges.
    MaxUnpaid,
}

impl DenyReason {
    /// Wire-facing reason code.
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "BLOCKED",
            DenyReason::Cooldown => "COOLDOWN",
            DenyReason::MaxUnpaid => "MAX_UNPAID",
        }
    }

    /// Human-readable message for the 429 body.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "Identity temporarily blocked for exceeding unpaid charges",
            DenyReason::Cooldown => "Too soon since the last generated charge",
            DenyReason::MaxUnpaid => "Too many unpaid charges in the current window",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny {
        reason: DenyReason,
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
        unpaid_count: u32,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decides whether an identity may request a new charge, and records
/// successful charge creations.
///
/// A denied check never mutates stored state; the only write path is
/// [`AdmissionController::record_success`], which runs as one atomic
/// read-modify-write per identity key.
#[derive(Debug, Clone)]
pub struct AdmissionController<S> {
    store: Arc<S>,
}

impl<S> AdmissionController<S>
where
    S: AdmissionStateStore,
{
    pub fn new(store: Arc<S>) -> Self {
        AdmissionController { store }
    }

    /// Evaluates the admission policy for `identity` at the current time.
    pub fn check(
        &self,
        identity: &Identity,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, PersistenceError> {
        self.check_at(identity, policy, UnixTimestamp::now())
    }

    /// Evaluates the admission policy at an explicit instant.
    ///
    /// Order of evaluation matters: a future `blocked_until` dominates every
    /// other rule, then the cooldown, then the unpaid-count threshold.
    pub fn check_at(
        &self,
        identity: &Identity,
        policy: &RateLimitPolicy,
        now: UnixTimestamp,
    ) -> Result<Decision, PersistenceError> {
        // Fail open: disabled policy, or no usable identity key.
        if !policy.enabled {
            return Ok(Decision::Allow);
        }
        let Some(key) = identity.key() else {
            return Ok(Decision::Allow);
        };

        let Some(state) = self.store.fetch(&key)? else {
            return Ok(Decision::Allow);
        };

        // Stale rows age out logically: outside the window the counters are
        // treated as reset. The row itself is rewritten on the next success.
        let state = expire_window(state, policy, now);

        if let Some(blocked_until) = state.blocked_until {
            if blocked_until > now {
                return Ok(Decision::Deny {
                    reason: DenyReason::Blocked,
                    retry_after_secs: now.secs_until(blocked_until),
                    unpaid_count: state.unpaid_count,
                });
            }
        }

        if let Some(last_generation_at) = state.last_generation_at {
            let elapsed = now.secs_since(last_generation_at);
            if elapsed < policy.cooldown_seconds {
                return Ok(Decision::Deny {
                    reason: DenyReason::Cooldown,
                    retry_after_secs: policy.cooldown_seconds - elapsed,
                    unpaid_count: state.unpaid_count,
                });
            }
        }

        if state.unpaid_count >= policy.max_unpaid {
            // The block itself was persisted by record_success when the
            // threshold was crossed; this branch covers rows written under a
            // looser policy. The check stays read-only either way.
            return Ok(Decision::Deny {
                reason: DenyReason::MaxUnpaid,
                retry_after_secs: policy.window_secs(),
                unpaid_count: state.unpaid_count,
            });
        }

        Ok(Decision::Allow)
    }

    /// Records a successful charge creation for `identity` at the current
    /// time. Returns `None` when the identity has no usable key.
    pub fn record_success(
        &self,
        identity: &Identity,
        policy: &RateLimitPolicy,
    ) -> Result<Option<AdmissionState>, PersistenceError> {
        self.record_success_at(identity, policy, UnixTimestamp::now())
    }

    /// Records a successful charge creation at an explicit instant.
    ///
    /// The increment, `last_generation_at`, and the pre-emptive
    /// `blocked_until` are applied in one atomic per-key update: when the
    /// resulting `unpaid_count` reaches `max_unpaid`, the block takes effect
    /// before the identity's next attempt is even evaluated.
    pub fn record_success_at(
        &self,
        identity: &Identity,
        policy: &RateLimitPolicy,
        now: UnixTimestamp,
    ) -> Result<Option<AdmissionState>, PersistenceError> {
        let Some(key) = identity.key() else {
            return Ok(None);
        };

        let max_unpaid = policy.max_unpaid;
        let window_secs = policy.window_secs();
        let policy = policy.clone();
        let insert_key = key.clone();
        let updated = self.store.update_with(
            &key,
            Box::new(move |existing| {
                let mut state = match existing {
                    Some(existing) => expire_window(existing.clone(), &policy, now),
                    None => new_admission_state(&insert_key, now),
                };
                state.unpaid_count += 1;
                state.last_generation_at = Some(now);
                state.updated_at = now;
                if state.unpaid_count >= max_unpaid {
                    state.blocked_until = Some(now + window_secs);
                }
                state
            }),
        )?;
        Ok(Some(updated))
    }
}

/// Applies the logical window expiry: a row last touched more than one
/// window ago counts as fresh again.
fn expire_window(
    mut state: AdmissionState,
    policy: &RateLimitPolicy,
    now: UnixTimestamp,
) -> AdmissionState {
    if now.secs_since(state.updated_at) > policy.window_secs() {
        state.unpaid_count = 0;
        state.blocked_until = None;
        state.last_generation_at = None;
    }
    state
}
