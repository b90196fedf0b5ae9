//! Transient request/response descriptors exchanged with the forwarder.
//!
//! Both live for exactly one proxy call and are never persisted.

use axum::body::Bytes;
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use axum::http::{Method, StatusCode};
use url::form_urlencoded;

use crate::error::{ErrorCode, ErrorEnvelope};
use crate::security::headers::DEFAULT_CONTENT_TYPE;

/// Methods the proxy relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ProxyMethod {
    /// Map an HTTP method, `None` for anything the proxy does not relay.
    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::PATCH => Some(Self::Patch),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_http(&self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// GET and DELETE never send a body upstream.
    pub fn carries_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Delete)
    }
}

impl std::fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_http().as_str())
    }
}

/// Ordered query parameters. Keys may repeat; order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        Self(form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Every value for `key`, in the order they appeared.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Re-serialize in original order.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.0 {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

/// An inbound request as seen by the forwarder.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: ProxyMethod,
    /// Path segments after the captured prefix, still percent-encoded.
    pub path: Vec<String>,
    pub query: QueryParams,
    /// Inbound headers (case-insensitive). Filtering happens in the forwarder.
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// The inbound request's own origin (`scheme://host`).
    pub origin: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: ProxyMethod, path: &str) -> Self {
        Self {
            method,
            path: split_segments(path),
            query: QueryParams::default(),
            headers: HeaderMap::new(),
            body: None,
            origin: None,
        }
    }

    /// The raw `cookie` header, joined if the client split it.
    pub fn cookie(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// True when the declared content type is JSON (`application/json`
    /// or a `+json` suffix type).
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| {
                let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                essence == "application/json" || essence.ends_with("+json")
            })
            .unwrap_or(false)
    }

    /// `origin + prefix + /path[?query]`.
    pub fn target_url(&self, origin: &str, prefix: &str) -> String {
        let mut url = format!(
            "{}{}/{}",
            origin.trim_end_matches('/'),
            prefix,
            self.path.join("/")
        );
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query.to_query_string());
        }
        url
    }
}

/// Split a path (without the captured prefix) into raw segments.
pub fn split_segments(path: &str) -> Vec<String> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

/// A response ready to be written back to the client verbatim.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub status_text: String,
    /// Multi-valued; each `set-cookie` is an independent entry.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseDescriptor {
    /// A JSON error envelope with the given status.
    pub fn error(status: StatusCode, code: &ErrorCode, message: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: Bytes::from(ErrorEnvelope::new(code, message).to_bytes()),
        }
    }

    /// The synthetic 500 returned on forwarder transport failure.
    pub fn proxy_error(message: impl Into<String>) -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, &ErrorCode::Proxy, message)
    }

    /// Every `set-cookie` entry, in backend order.
    pub fn set_cookies(&self) -> impl Iterator<Item = &HeaderValue> {
        self.headers.get_all(axum::http::header::SET_COOKIE).iter()
    }
}
