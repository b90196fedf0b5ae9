//! HTTP transport for session calls.
//!
//! The client performs exactly one request per call and reports what came
//! back. Retry and refresh decisions live in the manager.

use reqwest::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use super::error::SessionError;
use super::types::ApiEnvelope;

/// A backend call, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Key used for the query cache.
    pub fn cache_key(&self) -> String {
        let mut key = format!("{} {}", self.method, self.path);
        for (k, v) in &self.query {
            key.push_str(&format!(" {}={}", k, v));
        }
        key
    }
}

/// What the backend returned, uninterpreted.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub set_cookies: Vec<String>,
}

impl ApiResponse {
    /// Interpret the `{success, data, error}` envelope.
    pub fn into_data(self) -> Result<Value, SessionError> {
        if self.status == 401 {
            return Err(SessionError::Unauthorized);
        }
        let parsed = serde_json::from_str::<Value>(&self.body).ok();
        let envelope = parsed
            .as_ref()
            .filter(|v| v.get("success").is_some())
            .and_then(|v| serde_json::from_value::<ApiEnvelope>(v.clone()).ok());
        let success = (200..300).contains(&self.status);

        match (envelope, parsed) {
            (Some(env), _) if success && env.success => Ok(env.data.unwrap_or(Value::Null)),
            (Some(ApiEnvelope { error: Some(err), .. }), _) => Err(SessionError::Api {
                status: self.status,
                code: err.code,
                message: err.message,
            }),
            // 2xx that is not an envelope: hand the body back as is.
            (None, Some(value)) if success => Ok(value),
            (None, None) if success && self.body.trim().is_empty() => Ok(Value::Null),
            (None, None) if success => Ok(Value::String(self.body)),
            _ => Err(SessionError::Unknown {
                status: self.status,
                body: self.body,
            }),
        }
    }
}

/// Thin wrapper around a `reqwest::Client` pointed at the API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:3000/api`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one request. Only transport failures are errors here.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<ApiResponse, SessionError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;

        tracing::debug!(method = %request.method, path = %request.path, status, "Session call completed");

        Ok(ApiResponse {
            status,
            body,
            set_cookies,
        })
    }
}
