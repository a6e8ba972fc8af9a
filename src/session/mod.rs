use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Authenticated user profile as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
}

/// Session snapshot: both tokens plus the logged-in user, if any.
///
/// Tokens are opaque bearer strings and are never parsed.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Profile>,
}

#[derive(Debug, Default)]
struct SessionInner {
    session: Session,
    epoch: u64,
    last_refreshed: Option<DateTime<Utc>>,
}

/// Shared session state: single source of truth for tokens and user.
///
/// Cheap to clone; all clones share the same underlying state. Readers
/// never block each other. Writers are the login flow and the 401
/// refresh path. Every token write or clear bumps an epoch counter so
/// concurrent 401 handlers can tell whether someone else already
/// rotated the session while they were waiting.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionInner>>,
}

impl SessionStore {
    /// Create an empty store (no tokens, no user).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current session.
    pub async fn get(&self) -> Session {
        self.inner.read().await.session.clone()
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.session.access_token.clone()
    }

    /// Current refresh token, if any.
    pub async fn refresh_token(&self) -> Option<String> {
        self.inner.read().await.session.refresh_token.clone()
    }

    /// Store a fresh token pair. Passing `None` for the refresh token
    /// keeps whatever refresh token is already held.
    pub async fn set_tokens(&self, access: String, refresh: Option<String>) {
        let mut inner = self.inner.write().await;
        inner.session.access_token = Some(access);
        if let Some(refresh) = refresh {
            inner.session.refresh_token = Some(refresh);
        }
        inner.epoch += 1;
    }

    /// Swap in a rotated access token, keeping the refresh token.
    /// Records the rotation time.
    pub async fn rotate_access(&self, access: String) {
        let mut inner = self.inner.write().await;
        inner.session.access_token = Some(access);
        inner.epoch += 1;
        inner.last_refreshed = Some(Utc::now());
        debug!(epoch = inner.epoch, "access token rotated");
    }

    /// Attach the user profile. The login flow sets tokens first.
    pub async fn set_user(&self, user: Profile) {
        let mut inner = self.inner.write().await;
        inner.session.user = Some(user);
    }

    /// Wipe everything: both tokens and the user.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.session = Session::default();
        inner.epoch += 1;
        inner.last_refreshed = None;
        debug!(epoch = inner.epoch, "session cleared");
    }

    /// Monotonic counter bumped on every token write or clear.
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Time of the last access-token rotation, if one happened.
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_refreshed
    }
}
