#![forbid(unsafe_code)]

//! Deployment-risk negotiation engine: scores proposed deployments for
//! rollout risk, generates a staged canary policy with guardrails, and
//! tunes its own ensemble weights from the outcomes it is later told about.
//!
//! Three cooperating pieces:
//! 1. **Risk assessment** (`risk`) — a heuristic scorer blended with an
//!    online logistic-regression scorer into one `RiskAssessment`.
//! 2. **Canary policy generation** (`policy`) — turns a `RiskAssessment`
//!    into a staged rollout plan with error-rate/latency guardrails.
//! 3. **Outcome recording and auto-tuning** (`outcome`, `tuner`,
//!    `scheduler`) — persists what actually happened and periodically
//!    re-derives the ensemble weights and ML parameters from it.
//!
//! `engine::Engine` wires the three together into the library's single
//! entry point. This crate is a synchronous library API, not a network
//! service: callers embed it directly or drive it through the `drn` CLI.

pub mod core;
pub mod engine;
pub mod logger;
pub mod outcome;
pub mod policy;
pub mod prelude;
pub mod risk;
pub mod scheduler;
pub mod store;
pub mod tuner;

#[cfg(feature = "daemon")]
pub mod daemon;
