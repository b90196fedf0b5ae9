//! Route protection.
//!
//! # Responsibilities
//! - Classify paths as public, protected, or auth-only from a static table
//! - Decide allow / defer / redirect from classification and session state
//! - Build locale-aware redirect targets with an encoded return path
//! - Re-evaluate on navigation and on every session-state change
//!
//! # Design Decisions
//! - Classification is computed, never stored
//! - A redirect target is re-decided once before it is handed out; if it
//!   would redirect again the guard falls back to the locale home page
//! - Return targets are same-origin relative paths and never auth-only pages

use tokio::sync::watch;
use url::form_urlencoded;

use crate::config::RouteTableConfig;
use crate::routing::matcher::{path_only, split_locale, PathPrefixMatcher};
use crate::session::SessionState;

/// Static category of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClassification {
    Public,
    Protected,
    /// Only valid for unauthenticated visitors (login, register, reset).
    AuthOnly,
}

/// Session state as the guard sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Session not resolved yet.
    Loading,
    Authenticated,
    Unauthenticated,
}

impl From<SessionState> for AuthStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Unresolved => AuthStatus::Loading,
            // The login form stays mounted while credentials are checked.
            SessionState::Unauthenticated | SessionState::Authenticating => {
                AuthStatus::Unauthenticated
            }
            SessionState::Authenticated | SessionState::Refreshing => AuthStatus::Authenticated,
        }
    }
}

/// Outcome of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Render a neutral loading state and decide again once resolved.
    Defer,
    RedirectToLogin,
    RedirectToDashboard,
}

/// Concrete guard verdict for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Defer,
    RedirectTo(String),
}

/// Prefix table, compiled once.
#[derive(Debug, Clone)]
pub struct RouteTable {
    auth_only: Vec<PathPrefixMatcher>,
    protected: Vec<PathPrefixMatcher>,
    locales: Vec<String>,
}

impl RouteTable {
    pub fn from_config(config: &RouteTableConfig) -> Self {
        Self {
            auth_only: config.auth_only_prefixes.iter().map(PathPrefixMatcher::new).collect(),
            protected: config.protected_prefixes.iter().map(PathPrefixMatcher::new).collect(),
            locales: config.locales.clone(),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// Classify a path (query, fragment, and locale segment ignored).
    pub fn classify(&self, path: &str) -> RouteClassification {
        let (_, bare) = split_locale(path_only(path), &self.locales);
        if self.auth_only.iter().any(|m| m.matches(bare)) {
            RouteClassification::AuthOnly
        } else if self.protected.iter().any(|m| m.matches(bare)) {
            RouteClassification::Protected
        } else {
            RouteClassification::Public
        }
    }
}

/// Route guard over a fixed table.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    table: RouteTable,
    login_path: String,
    dashboard_path: String,
    return_param: String,
}

impl RouteGuard {
    pub fn new(config: &RouteTableConfig) -> Self {
        Self {
            table: RouteTable::from_config(config),
            login_path: config.login_path.clone(),
            dashboard_path: config.dashboard_path.clone(),
            return_param: config.return_param.clone(),
        }
    }

    pub fn classify(&self, path: &str) -> RouteClassification {
        self.table.classify(path)
    }

    /// The decision table.
    pub fn decide(&self, classification: RouteClassification, status: AuthStatus) -> Decision {
        match (classification, status) {
            (RouteClassification::Public, _) => Decision::Allow,
            (_, AuthStatus::Loading) => Decision::Defer,
            (RouteClassification::AuthOnly, AuthStatus::Authenticated) => Decision::RedirectToDashboard,
            (RouteClassification::AuthOnly, AuthStatus::Unauthenticated) => Decision::Allow,
            (RouteClassification::Protected, AuthStatus::Unauthenticated) => Decision::RedirectToLogin,
            (RouteClassification::Protected, AuthStatus::Authenticated) => Decision::Allow,
        }
    }

    /// Full verdict for navigating to `path` (may carry a query string).
    pub fn evaluate(&self, path: &str, status: AuthStatus) -> GuardDecision {
        let (locale, _) = split_locale(path_only(path), self.table.locales());

        match self.decide(self.classify(path), status) {
            Decision::Allow => GuardDecision::Allow,
            Decision::Defer => GuardDecision::Defer,
            Decision::RedirectToLogin => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(&self.return_param, path)
                    .finish();
                let target = format!("{}?{}", localize(locale, &self.login_path), query);
                self.checked_redirect(target, status, locale)
            }
            Decision::RedirectToDashboard => {
                let requested = query_value(path, &self.return_param);
                let target = self.post_login_target(requested.as_deref(), locale);
                self.checked_redirect(target, status, locale)
            }
        }
    }

    /// Where to go after authenticating. Accepts `return_url` only if it
    /// is a same-origin relative path outside the auth-only area.
    pub fn post_login_target(&self, return_url: Option<&str>, locale: Option<&str>) -> String {
        match return_url {
            Some(url) if is_local_path(url) && self.classify(url) != RouteClassification::AuthOnly => {
                url.to_string()
            }
            _ => localize(locale, &self.dashboard_path),
        }
    }

    /// Re-decide the target once; never hand out a redirect that would
    /// itself redirect.
    fn checked_redirect(&self, target: String, status: AuthStatus, locale: Option<&str>) -> GuardDecision {
        match self.decide(self.classify(&target), status) {
            Decision::Allow => GuardDecision::RedirectTo(target),
            _ => {
                tracing::warn!(target = %target, "Redirect target would redirect again, falling back to home");
                GuardDecision::RedirectTo(localize(locale, "/"))
            }
        }
    }
}

/// Re-evaluates the guard on navigation and on session-state changes.
pub struct GuardWatcher {
    guard: RouteGuard,
    states: watch::Receiver<SessionState>,
    current_path: String,
}

impl GuardWatcher {
    pub fn new(guard: RouteGuard, states: watch::Receiver<SessionState>, initial_path: impl Into<String>) -> Self {
        Self {
            guard,
            states,
            current_path: initial_path.into(),
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    /// Verdict for the current path under the latest session state.
    pub fn evaluate(&self) -> GuardDecision {
        let status = AuthStatus::from(*self.states.borrow());
        self.guard.evaluate(&self.current_path, status)
    }

    /// Navigation event. A redirect verdict moves the current path to
    /// the redirect target.
    pub fn navigate(&mut self, path: impl Into<String>) -> GuardDecision {
        self.current_path = path.into();
        let decision = self.evaluate();
        if let GuardDecision::RedirectTo(target) = &decision {
            self.current_path = target.clone();
        }
        decision
    }

    /// Wait for the next session-state change and re-evaluate. Returns
    /// `None` once the session manager is gone.
    pub async fn next_change(&mut self) -> Option<GuardDecision> {
        self.states.changed().await.ok()?;
        let decision = self.evaluate();
        if let GuardDecision::RedirectTo(target) = &decision {
            self.current_path = target.clone();
        }
        Some(decision)
    }
}

fn localize(locale: Option<&str>, path: &str) -> String {
    match locale {
        Some(locale) if path == "/" => format!("/{}", locale),
        Some(locale) => format!("/{}{}", locale, path),
        None => path.to_string(),
    }
}

fn query_value(target: &str, key: &str) -> Option<String> {
    let query = target.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') && !url.contains("://")
}
