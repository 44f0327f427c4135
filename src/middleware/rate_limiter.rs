//! Generic per-IP rate limiting middleware

use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::audit::{Admission, WindowLimiter};
use crate::error::ApiError;

/// Create rate limiting middleware layer.
///
/// Store outages let the request through; the identity and loan throttles
/// deeper in the pipeline still fail closed.
pub fn rate_limit_layer(
    limiter: WindowLimiter,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send {
    move |request: Request<Body>, next: Next| {
        let limiter = limiter.clone();
        Box::pin(async move {
            let client_key = client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());

            match limiter.admit(&client_key).await {
                Ok(Admission::Admitted) => {}
                Ok(Admission::Refused { retry_after }) => {
                    tracing::warn!(client = %client_key, "Rate limit exceeded");
                    return ApiError::RateLimited {
                        message: "Too many requests. Please try again later.".to_string(),
                        retry_after,
                    }
                    .into_response();
                }
                Err(e) => {
                    tracing::error!(client = %client_key, error = %e, "Rate limit store unavailable");
                }
            }

            next.run(request).await
        })
    }
}

/// Client IP from `X-Forwarded-For` (first hop) or `X-Real-IP`
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(ip) = s.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
                return Some(ip.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}
