//! Response handling and transformation.
//!
//! # Responsibilities
//! - Write a `ResponseDescriptor` back to the client verbatim
//! - Preserve non-canonical reason phrases
//! - JSON envelopes for proxy-local errors (404 fallback)
//!
//! # Design Decisions
//! - Header map is moved as-is, so every `Set-Cookie` entry stays separate
//! - The request-id layer adds `x-request-id` after this point

use axum::body::Body;
use axum::http::{Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;

use crate::error::ErrorCode;
use crate::proxy::descriptor::ResponseDescriptor;

impl IntoResponse for ResponseDescriptor {
    fn into_response(self) -> Response {
        let mut response = HttpResponse::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        let canonical = self.status.canonical_reason().unwrap_or_default();
        if !self.status_text.is_empty() && self.status_text != canonical {
            match ReasonPhrase::try_from(self.status_text.into_bytes()) {
                Ok(reason) => {
                    response.extensions_mut().insert(reason);
                }
                Err(_) => tracing::debug!("Dropping invalid upstream reason phrase"),
            }
        }

        response
    }
}

/// Fallback for paths outside the proxy prefix.
pub async fn not_found() -> Response {
    ResponseDescriptor::error(StatusCode::NOT_FOUND, &ErrorCode::NotFound, "no such route")
        .into_response()
}
