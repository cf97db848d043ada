//! PIX charge-creation gateway.
//!
//! This crate sits in front of several interchangeable third-party PIX
//! processors ("acquirers") and decides, per request, whether a client may
//! create a new charge, which backends to try, and how to record what
//! happened.
//!
//! # Overview
//!
//! A charge request flows through four stages:
//!
//! 1. **Admission control** ([`admission`]) — a per-identity sliding-window
//!    rate limiter keyed on device fingerprint (or IP). Identities with too
//!    many generated-but-unpaid charges are blocked pre-emptively.
//! 2. **Fee resolution** ([`fees`]) — merchant-scoped override falling back
//!    to the platform default.
//! 3. **Failover orchestration** ([`orchestrator`]) — enabled acquirers are
//!    tried in priority order under a global retry budget split evenly
//!    across them; the first success wins.
//! 4. **Recording** ([`monitoring`], [`store`]) — every attempt is logged
//!    best-effort, and a successful charge is persisted and counted against
//!    the identity's admission window.
//!
//! # Modules
//!
//! - [`acquirer`] — The [`Acquirer`](acquirer::Acquirer) adapter trait and the
//!   concrete backend implementations (Zendry, Primepag, BSPay).
//! - [`admission`] — Admission controller and deny taxonomy.
//! - [`config`] — JSON/env configuration: acquirers, fees, rate limits, failover.
//! - [`fees`] — Fee resolution.
//! - [`gateway`] — The request pipeline tying the stages together.
//! - [`handlers`] — HTTP endpoint handlers (`POST /charges` and friends).
//! - [`monitoring`] — Fire-and-forget attempt logger.
//! - [`orchestrator`] — Retry/failover engine.
//! - [`store`] — Persistence traits and in-memory implementations.
//! - [`timestamp`] — Unix timestamp type used by the admission window math.
//! - [`types`] — Wire and domain types.

pub mod acquirer;
pub mod admission;
pub mod config;
pub mod fees;
pub mod gateway;
pub mod handlers;
pub mod monitoring;
pub mod orchestrator;
pub mod sig_down;
pub mod store;
pub mod telemetry;
pub mod timestamp;
pub mod types;
