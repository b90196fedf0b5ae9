//! Request handling and transformation.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Enforce the body size limit before anything is forwarded
//! - Turn an axum request into a `RequestDescriptor`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The inbound origin comes from the `Host` header and the configured
//!   public scheme, never from a client-supplied `origin`

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};

use crate::error::ErrorCode;
use crate::proxy::descriptor::{split_segments, ProxyMethod, QueryParams, RequestDescriptor, ResponseDescriptor};

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Static facts the handler needs to build descriptors.
#[derive(Debug, Clone)]
pub struct InboundSettings {
    pub path_prefix: String,
    pub public_scheme: String,
    pub max_body_size: usize,
}

/// The request ID set by `SetRequestIdLayer`, or "unknown".
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// `scheme://host` of the inbound request.
pub fn inbound_origin(headers: &HeaderMap, scheme: &str) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("{}://{}", scheme, host))
}

/// Build a descriptor from an inbound request. Returns a ready error
/// response when the request cannot be relayed.
pub async fn into_descriptor(
    request: Request<Body>,
    settings: &InboundSettings,
) -> Result<RequestDescriptor, ResponseDescriptor> {
    let (parts, body) = request.into_parts();

    let method = ProxyMethod::from_http(&parts.method).ok_or_else(|| {
        ResponseDescriptor::error(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorCode::MethodNotAllowed,
            format!("method {} is not relayed", parts.method),
        )
    })?;

    let rest = parts
        .uri
        .path()
        .strip_prefix(settings.path_prefix.as_str())
        .unwrap_or(parts.uri.path());

    let body = axum::body::to_bytes(body, settings.max_body_size)
        .await
        .map_err(|e| {
            ResponseDescriptor::error(
                StatusCode::PAYLOAD_TOO_LARGE,
                &ErrorCode::PayloadTooLarge,
                format!("request body rejected: {}", e),
            )
        })?;

    Ok(RequestDescriptor {
        method,
        path: split_segments(rest),
        query: parts.uri.query().map(QueryParams::parse).unwrap_or_default(),
        origin: inbound_origin(&parts.headers, &settings.public_scheme),
        headers: parts.headers,
        body: if body.is_empty() { None } else { Some(body) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> InboundSettings {
        InboundSettings {
            path_prefix: "/api".into(),
            public_scheme: "https".into(),
            max_body_size: 16,
        }
    }

    #[tokio::test]
    async fn test_descriptor_from_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/wallet/deposits?sort=desc&tag=a&tag=b")
            .header("host", "app.example.com")
            .header("content-type", "application/json")
            .body(Body::from("{\"a\":1}"))
            .unwrap();

        let desc = into_descriptor(request, &settings()).await.unwrap();
        assert_eq!(desc.method, ProxyMethod::Post);
        assert_eq!(desc.path, vec!["wallet", "deposits"]);
        assert_eq!(desc.query.values("tag"), vec!["a", "b"]);
        assert_eq!(desc.origin.as_deref(), Some("https://app.example.com"));
        assert_eq!(desc.body.as_deref(), Some(&b"{\"a\":1}"[..]));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/x")
            .body(Body::empty())
            .unwrap();
        let resp = into_descriptor(request, &settings()).await.unwrap_err();
        assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let request = Request::builder()
            .method("PUT")
            .uri("/api/x")
            .body(Body::from(vec![b'a'; 64]))
            .unwrap();
        let resp = into_descriptor(request, &settings()).await.unwrap_err();
        assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_request_id_fallback() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
