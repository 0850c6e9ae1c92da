//! Risk scoring: heuristic assessment of new members.

pub mod assessment;
pub mod engine;

pub use assessment::{RiskAssessment, RiskLevel, RiskReason};
pub use engine::{RiskEngine, BASE_SCORE, DEFAULT_JOIN_WINDOW_SECS};
