//! Scoring, verification and orchestration services

pub mod approval;
pub mod call_monitor;
pub mod documents;
pub mod image;
pub mod risk_engine;
pub mod risk_service;
pub mod severity;

pub use approval::ApprovalService;
pub use call_monitor::{CallMonitor, CallStatus, CallStatusSource, PollOutcome};
pub use risk_service::RiskService;
