//! Middleware for the loan API
//!
//! Request tracing, per-IP rate limiting and security headers.

mod rate_limiter;
mod security;
mod tracing;

pub use rate_limiter::{client_ip, rate_limit_layer};
pub use security::{hsts_header, security_headers};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
