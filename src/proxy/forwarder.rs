//! Request forwarding to the backend origin.
//!
//! # Responsibilities
//! - Rebuild the target URL (`origin + prefix + path + query`)
//! - Apply the request header allow-list and synthesize `origin`
//! - Normalize JSON bodies, pass other bodies through untouched
//! - Rebuild the response: status, reason phrase, relayed headers, every
//!   `Set-Cookie` as its own entry, fully buffered body
//!
//! # Design Decisions
//! - Never retries; retry policy around 401s lives in the session layer
//! - Transport failures become a synthetic 500 `PROXY_ERROR` descriptor;
//!   nothing propagates to the caller as an error
//! - Each upstream exchange runs under its own deadline, shorter than the
//!   inbound timeout, so a slow backend is reported as `PROXY_ERROR`
//! - Response bodies are buffered in memory. Streaming and very large
//!   payloads are out of scope for this proxy

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode, Uri};
use hyper::ext::ReasonPhrase;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{BackendConfig, MalformedJsonPolicy};
use crate::error::ErrorCode;
use crate::observability::metrics;
use crate::proxy::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::security::headers::{outbound_headers, relay_response_headers};

/// Failures inside a single forward call.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream target '{0}'")]
    InvalidTarget(String),

    #[error("failed to build upstream request: {0}")]
    Build(String),

    #[error("{0}")]
    Transport(String),

    #[error("failed to read upstream body: {0}")]
    BodyRead(String),

    #[error("request body is not valid JSON: {0}")]
    InvalidJsonBody(String),
}

/// Relays requests to one backend origin.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: Client<HttpConnector, Body>,
    origin: String,
    path_prefix: String,
    request_timeout: Duration,
    malformed_json: MalformedJsonPolicy,
}

impl ProxyForwarder {
    pub fn new(config: &BackendConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            origin: config.origin.trim_end_matches('/').to_string(),
            path_prefix: config.path_prefix.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            malformed_json: config.malformed_json,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Forward to the configured origin under the configured prefix.
    pub async fn forward(&self, inbound: RequestDescriptor) -> ResponseDescriptor {
        let origin = self.origin.clone();
        let prefix = self.path_prefix.clone();
        self.forward_to(inbound, &origin, &prefix).await
    }

    /// Forward `inbound` to `backend_origin + captured_prefix + path`.
    pub async fn forward_to(
        &self,
        inbound: RequestDescriptor,
        backend_origin: &str,
        captured_prefix: &str,
    ) -> ResponseDescriptor {
        let start_time = Instant::now();
        let method = inbound.method;

        let response = match self.try_forward(&inbound, backend_origin, captured_prefix).await {
            Ok(response) => response,
            Err(ProxyError::InvalidJsonBody(cause)) => {
                tracing::warn!(method = %method, error = %cause, "Rejected malformed JSON body");
                ResponseDescriptor::error(
                    StatusCode::BAD_REQUEST,
                    &ErrorCode::InvalidJsonBody,
                    format!("request body is not valid JSON: {}", cause),
                )
            }
            Err(e) => {
                tracing::error!(method = %method, error = %e, "Upstream request failed");
                metrics::record_upstream_error();
                ResponseDescriptor::proxy_error(e.to_string())
            }
        };

        metrics::record_request(&method.to_string(), response.status.as_u16(), start_time);
        response
    }

    async fn try_forward(
        &self,
        inbound: &RequestDescriptor,
        backend_origin: &str,
        captured_prefix: &str,
    ) -> Result<ResponseDescriptor, ProxyError> {
        let target = inbound.target_url(backend_origin, captured_prefix);
        let uri: Uri = target
            .parse()
            .map_err(|_| ProxyError::InvalidTarget(target.clone()))?;

        let body = self.outbound_body(inbound)?;

        let mut builder = Request::builder().method(inbound.method.as_http()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = outbound_headers(&inbound.headers, inbound.origin.as_deref());
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| ProxyError::Build(e.to_string()))?;

        tracing::debug!(method = %inbound.method, target = %target, "Forwarding upstream");

        tokio::time::timeout(self.request_timeout, self.exchange(request))
            .await
            .map_err(|_| {
                ProxyError::Transport(format!(
                    "upstream timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            })?
    }

    /// Send `request` and buffer the whole response.
    async fn exchange(&self, request: Request<Body>) -> Result<ResponseDescriptor, ProxyError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::Transport(error_chain(&e)))?;

        let (parts, body) = response.into_parts();
        let status_text = parts
            .extensions
            .get::<ReasonPhrase>()
            .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
            .map(str::to_string)
            .unwrap_or_else(|| parts.status.canonical_reason().unwrap_or_default().to_string());

        let body = axum::body::to_bytes(Body::new(body), usize::MAX)
            .await
            .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

        Ok(ResponseDescriptor {
            status: parts.status,
            status_text,
            headers: relay_response_headers(&parts.headers),
            body,
        })
    }

    /// Body sent upstream, if any.
    fn outbound_body(&self, inbound: &RequestDescriptor) -> Result<Option<Bytes>, ProxyError> {
        if !inbound.method.carries_body() {
            return Ok(None);
        }
        let Some(raw) = inbound.body.as_ref() else {
            return Ok(None);
        };
        if !inbound.is_json() {
            return Ok(Some(raw.clone()));
        }
        // Empty-body POSTs declared as JSON are tolerated.
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match serde_json::from_slice::<serde_json::Value>(raw) {
            Ok(value) => serde_json::to_vec(&value)
                .map(|bytes| Some(Bytes::from(bytes)))
                .map_err(|e| ProxyError::Build(e.to_string())),
            Err(e) => match self.malformed_json {
                MalformedJsonPolicy::Reject => Err(ProxyError::InvalidJsonBody(e.to_string())),
                MalformedJsonPolicy::Drop => {
                    tracing::warn!(error = %e, "Dropping malformed JSON body");
                    Ok(None)
                }
            },
        }
    }
}

/// Render an error with its source chain ("client error (Connect): ...").
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::descriptor::ProxyMethod;
    use axum::http::header::{HeaderValue, CONTENT_TYPE};

    fn forwarder(policy: MalformedJsonPolicy) -> ProxyForwarder {
        let config = BackendConfig {
            malformed_json: policy,
            ..BackendConfig::default()
        };
        ProxyForwarder::new(&config)
    }

    fn json_post(body: &'static str) -> RequestDescriptor {
        let mut req = RequestDescriptor::new(ProxyMethod::Post, "/auth/login");
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        req.body = Some(Bytes::from_static(body.as_bytes()));
        req
    }

    #[tokio::test]
    async fn test_json_body_is_normalized() {
        let body = forwarder(MalformedJsonPolicy::Reject)
            .outbound_body(&json_post("{ \"email\" :  \"a@b.c\" }"))
            .unwrap()
            .unwrap();
        assert_eq!(&body[..], br#"{"email":"a@b.c"}"#);
    }

    #[tokio::test]
    async fn test_empty_json_body_is_no_body() {
        let fwd = forwarder(MalformedJsonPolicy::Reject);
        assert!(fwd.outbound_body(&json_post("  \n")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_policy() {
        let err = forwarder(MalformedJsonPolicy::Reject)
            .outbound_body(&json_post("{oops"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidJsonBody(_)));

        let dropped = forwarder(MalformedJsonPolicy::Drop)
            .outbound_body(&json_post("{oops"))
            .unwrap();
        assert!(dropped.is_none());
    }

    #[tokio::test]
    async fn test_non_json_body_passes_through() {
        let mut req = RequestDescriptor::new(ProxyMethod::Put, "/upload");
        req.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        req.body = Some(Bytes::from_static(b"{not json but fine"));
        let body = forwarder(MalformedJsonPolicy::Reject).outbound_body(&req).unwrap();
        assert_eq!(body.as_deref(), Some(&b"{not json but fine"[..]));
    }

    #[tokio::test]
    async fn test_get_and_delete_send_no_body() {
        let fwd = forwarder(MalformedJsonPolicy::Reject);
        for method in [ProxyMethod::Get, ProxyMethod::Delete] {
            let mut req = RequestDescriptor::new(method, "/x");
            req.body = Some(Bytes::from_static(b"ignored"));
            assert!(fwd.outbound_body(&req).unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_proxy_error() {
        // Port 9 on localhost is not expected to accept connections.
        let fwd = forwarder(MalformedJsonPolicy::Reject);
        let resp = fwd
            .forward_to(
                RequestDescriptor::new(ProxyMethod::Get, "/health"),
                "http://127.0.0.1:9",
                "/api",
            )
            .await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"]["code"], "PROXY_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
    }
}
