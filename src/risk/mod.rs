//! Risk prediction core: request/response data model (C1-ish), heuristic
//! scorer (C2), online ML scorer (C3), and the ensemble predictor (C4).

pub mod assessment;
pub mod context;
pub mod ensemble;
pub mod heuristic;
pub mod ml;

pub use assessment::{ConfidenceBand, RiskAssessment, RiskLevel};
pub use context::{ChangeDescriptor, ChangeType, DeploymentContext, RiskTag};
pub use ensemble::{CalibrationSample, EnsemblePredictor, EnsembleWeights};
