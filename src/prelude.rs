//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use drn_engine::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DrnError, Result};

// Risk
pub use crate::risk::{
    ChangeDescriptor, ChangeType, ConfidenceBand, DeploymentContext, EnsembleWeights,
    RiskAssessment, RiskLevel, RiskTag,
};

// Policy
pub use crate::policy::{CanaryPolicy, Stage};

// Store
pub use crate::store::{DeploymentOutcome, OutcomeStore};

// Outcome / tuning
pub use crate::outcome::RecordError;
pub use crate::tuner::TuneResult;

// Engine
pub use crate::engine::{AssessmentResult, Engine, RecordOutcomeResponse};
