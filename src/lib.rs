//! Narthex - Community Admission Gate
//!
//! Gates admission of new members into a managed community by fusing a
//! heuristic risk score, persisted trust history, and external threat
//! intelligence, then driving a challenge/response protocol proportional
//! to the risk.
//!
//! Key principles:
//! - Fail open: a scoring-store outage never blocks a legitimate join
//! - One active challenge per (community, member), delete-then-insert
//! - Explicit outcomes: members always learn success, remaining attempts,
//!   lockout, or expiry; staff always get a reproducible score breakdown
//! - In-memory heuristics (join window, cooldowns) reset on restart by design

pub mod admission;
pub mod clock;
pub mod config;
pub mod events;
pub mod gatekeeper;
pub mod member;
pub mod notify;
pub mod risk;
pub mod store;
