//! Session data types and backend payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorBody;

/// Session lifecycle state, broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process just started; persisted credentials not checked yet.
    Unresolved,
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unresolved => "unresolved",
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
        }
    }
}

/// Access + refresh token pair issued by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    #[serde(other)]
    Other,
}

/// Cached copy of the backend's identity response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, alias = "emailVerified")]
    pub email_verified: bool,
    #[serde(default, alias = "kycVerified")]
    pub kyc_verified: bool,
}

impl UserSnapshot {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// `{success, data?, error?{code, message}}` returned by every auth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Tokens in an auth payload: either `data.session` or `data` itself.
pub fn extract_session(data: &Value) -> Option<TokenPair> {
    data.get("session")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .or_else(|| serde_json::from_value(data.clone()).ok())
}

/// User in an auth payload: either `data.user` or `data` itself.
pub fn extract_user(data: &Value) -> Option<UserSnapshot> {
    data.get("user")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
        .or_else(|| serde_json::from_value(data.clone()).ok())
}

/// Result of `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The backend issued a session right away.
    SignedIn,
    /// An email verification step is required before signing in.
    VerificationRequired,
}
