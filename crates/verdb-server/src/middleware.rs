//! VerDB Server Middleware
//!
//! Request-scoped middleware applied by the router.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Request ID
// =============================================================================

/// Tag each request and its response with an `x-request-id`. A caller
/// supplied id is kept.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = match request.headers().get(REQUEST_ID_HEADER) {
        Some(existing) => existing.clone(),
        None => {
            let generated = uuid::Uuid::new_v4().to_string();
            HeaderValue::from_str(&generated)
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        }
    };
    request.headers_mut().insert(REQUEST_ID_HEADER, id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, id);
    response
}

// =============================================================================
// Tests
// =============================================================================
