//! Error codes and the JSON error envelope shared by the proxy and the
//! session layer.

use serde::{Deserialize, Serialize};

/// Stable machine-readable error codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Transport failure before a response was obtained.
    Network,
    /// Forwarder-side transport failure.
    Proxy,
    /// 401 from the backend.
    Unauthorized,
    /// Non-2xx without a structured error body.
    Unknown,
    /// Non-empty request body declared as JSON that does not parse.
    InvalidJsonBody,
    /// Inbound body above the configured limit.
    PayloadTooLarge,
    /// No proxy route for the requested path.
    NotFound,
    /// Method outside GET/POST/PUT/PATCH/DELETE.
    MethodNotAllowed,
    /// Code supplied by the backend, passed through verbatim.
    Backend(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Proxy => "PROXY_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
            ErrorCode::InvalidJsonBody => "INVALID_JSON_BODY",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::Backend(code) => code,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{code, message}` as carried in the `error` field of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// `{success:false, error:{code, message}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: &ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.as_str().to_string(),
                message: message.into(),
            },
        }
    }

    /// Serialized JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a struct of strings cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
