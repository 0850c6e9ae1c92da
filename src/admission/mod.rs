//! Admission pipeline: challenge artifacts, score fusion, message
//! templates, and the orchestrating state machine.

pub mod challenge;
pub mod fusion;
pub mod messages;
pub mod orchestrator;

pub use challenge::{Challenge, ChallengeMode, ChallengeStatus};
pub use fusion::{fuse, FusedAssessment, ScoreBreakdown};
pub use orchestrator::{
    AdmissionError, AdmissionOrchestrator, JoinOutcome, ResponseOutcome, ResponseSurface,
};
