//! API handlers for the loan service

pub mod documents;
pub mod health;
mod json;
pub mod loan;
pub mod risk;

pub use documents::register_document_hash;
pub use health::{health_check, root};
pub use json::AppJson;
pub use loan::{confirm_loan, final_approval, get_audit_trail, get_loan};
pub use risk::assess_risk;
