//! Atomic in-memory session snapshot.
//!
//! # Design Decisions
//! - The whole snapshot is swapped at once, so a reader never sees an
//!   access token paired with a refresh token from another session
//! - `epoch` moves forward on every login and logout; a refresh that
//!   started under an older epoch cannot write its result back
//! - Refresh keeps the epoch and the session id, so cached queries survive it

use arc_swap::ArcSwap;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{TokenPair, UserSnapshot};

/// One immutable view of the session.
#[derive(Clone, Default)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub session_id: Option<Uuid>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserSnapshot>,
}

impl SessionSnapshot {
    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("epoch", &self.epoch)
            .field("session_id", &self.session_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

/// Lock-free holder of the current [`SessionSnapshot`].
pub struct SessionStore {
    inner: ArcSwap<SessionSnapshot>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(SessionSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.inner.load_full()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.load().epoch
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.load().access_token.clone()
    }

    pub fn user(&self) -> Option<UserSnapshot> {
        self.inner.load().user.clone()
    }

    /// Install credentials for a new session. Returns the new epoch.
    pub fn begin(&self, access_token: Option<String>, refresh_token: Option<String>) -> u64 {
        let mut epoch = 0;
        self.inner.rcu(|current| {
            epoch = current.epoch + 1;
            SessionSnapshot {
                epoch,
                session_id: Some(Uuid::new_v4()),
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                user: None,
            }
        });
        epoch
    }

    /// Swap in a refreshed pair if no login or logout happened since `epoch`.
    pub fn replace_tokens_if(&self, epoch: u64, tokens: &TokenPair) -> bool {
        self.update(|current| {
            (current.epoch == epoch).then(|| SessionSnapshot {
                access_token: Some(tokens.access_token.clone()),
                refresh_token: Some(tokens.refresh_token.clone()),
                user: None,
                ..current.clone()
            })
        })
    }

    /// Cache the identity response if the session is still the one it was fetched for.
    pub fn set_user_if(&self, epoch: u64, user: UserSnapshot) -> bool {
        self.update(|current| {
            (current.epoch == epoch && current.has_credentials()).then(|| SessionSnapshot {
                user: Some(user.clone()),
                ..current.clone()
            })
        })
    }

    /// Replace only the access token, keeping the refresh token.
    ///
    /// Bumps the epoch, so a refresh started before this write cannot
    /// overwrite it. Returns the new epoch.
    pub fn set_access_token(&self, token: Option<String>) -> u64 {
        let previous = self.inner.rcu(|current| {
            let session_id = current.session_id.or_else(|| token.as_ref().map(|_| Uuid::new_v4()));
            SessionSnapshot {
                epoch: current.epoch + 1,
                access_token: token.clone(),
                session_id,
                user: None,
                ..(**current).clone()
            }
        });
        previous.epoch + 1
    }

    /// Drop all credentials. Returns the snapshot that was cleared.
    pub fn clear(&self) -> Arc<SessionSnapshot> {
        self.inner.rcu(|current| SessionSnapshot {
            epoch: current.epoch + 1,
            ..SessionSnapshot::default()
        })
    }

    /// Drop all credentials if the session is still at `epoch`.
    pub fn clear_if(&self, epoch: u64) -> bool {
        self.update(|current| {
            (current.epoch == epoch).then(|| SessionSnapshot {
                epoch: current.epoch + 1,
                ..SessionSnapshot::default()
            })
        })
    }

    fn update<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&SessionSnapshot) -> Option<SessionSnapshot>,
    {
        let mut applied = false;
        self.inner.rcu(|current| match f(&**current) {
            Some(next) => {
                applied = true;
                Arc::new(next)
            }
            None => {
                applied = false;
                Arc::clone(current)
            }
        });
        applied
    }
}
