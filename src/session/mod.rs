//! Authentication session shared by the HTTP adapter and the console.
//!
//! The session is created on login, read on every outbound request and
//! destroyed on logout or when the server answers 401. It is persisted
//! through a [`SessionStore`] so a restarted console starts authenticated.

mod navigator;
mod store;

pub use navigator::{LogNavigator, Navigator, RecordingNavigator, Route};
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore, TOKEN_KEY, USER_KEY};

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::types::User;

/// Where the console stands with respect to authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
  Anonymous,
  Authenticating,
  Authenticated,
}

#[derive(Debug, Clone)]
struct SessionState {
  phase: AuthState,
  token: Option<String>,
  user: Option<User>,
}

impl SessionState {
  fn anonymous() -> Self {
    Self {
      phase: AuthState::Anonymous,
      token: None,
      user: None,
    }
  }
}

struct SessionInner {
  state: RwLock<SessionState>,
  store: Arc<dyn SessionStore>,
}

/// Cloneable handle to the process-wide authentication state.
#[derive(Clone)]
pub struct AuthSession {
  inner: Arc<SessionInner>,
}

impl AuthSession {
  /// Load the persisted session, if any.
  pub fn init(store: Arc<dyn SessionStore>) -> Self {
    let token = match store.get(TOKEN_KEY) {
      Ok(token) => token.filter(|t| !t.is_empty()),
      Err(e) => {
        warn!(error = %e, "failed to read stored token, starting anonymous");
        None
      }
    };
    let user = match store.get(USER_KEY) {
      Ok(Some(raw)) => serde_json::from_str::<User>(&raw)
        .map_err(|e| warn!(error = %e, "ignoring unreadable stored user profile"))
        .ok(),
      Ok(None) => None,
      Err(e) => {
        warn!(error = %e, "failed to read stored user profile");
        None
      }
    };

    let state = match token {
      Some(token) => SessionState {
        phase: AuthState::Authenticated,
        token: Some(token),
        user,
      },
      None => SessionState::anonymous(),
    };
    debug!(state = ?state.phase, "session initialised");

    Self {
      inner: Arc::new(SessionInner {
        state: RwLock::new(state),
        store,
      }),
    }
  }

  /// Session that lives only in memory.
  pub fn in_memory() -> Self {
    Self::init(Arc::new(MemorySessionStore::new()))
  }

  pub fn state(&self) -> AuthState {
    self.inner.state.read().phase
  }

  pub fn is_authenticated(&self) -> bool {
    self.state() == AuthState::Authenticated
  }

  pub fn token(&self) -> Option<String> {
    self.inner.state.read().token.clone()
  }

  pub fn user(&self) -> Option<User> {
    self.inner.state.read().user.clone()
  }

  pub(crate) fn begin_login(&self) {
    self.inner.state.write().phase = AuthState::Authenticating;
  }

  /// Return to the state implied by the credentials still held.
  pub(crate) fn abort_login(&self) {
    let mut state = self.inner.state.write();
    state.phase = if state.token.is_some() {
      AuthState::Authenticated
    } else {
      AuthState::Anonymous
    };
  }

  /// Store freshly issued credentials.
  pub fn establish(&self, token: String, user: Option<User>) {
    if let Err(e) = self.inner.store.set(TOKEN_KEY, &token) {
      warn!(error = %e, "failed to persist token");
    }
    match user.as_ref().map(serde_json::to_string) {
      Some(Ok(raw)) => {
        if let Err(e) = self.inner.store.set(USER_KEY, &raw) {
          warn!(error = %e, "failed to persist user profile");
        }
      }
      Some(Err(e)) => warn!(error = %e, "failed to serialize user profile"),
      None => {
        if let Err(e) = self.inner.store.remove(USER_KEY) {
          warn!(error = %e, "failed to clear stale user profile");
        }
      }
    }

    *self.inner.state.write() = SessionState {
      phase: AuthState::Authenticated,
      token: Some(token),
      user,
    };
    info!("session established");
  }

  /// Forget the session in memory and in storage.
  pub fn reset(&self) {
    *self.inner.state.write() = SessionState::anonymous();
    for key in [TOKEN_KEY, USER_KEY] {
      if let Err(e) = self.inner.store.remove(key) {
        warn!(error = %e, key, "failed to clear stored session value");
      }
    }
  }

  /// Drop the session after the server rejected it.
  ///
  /// Returns true when this call ended an authenticated session, so the
  /// caller can trigger the login redirect exactly once.
  pub fn expire(&self) -> bool {
    let was_authenticated = {
      let mut state = self.inner.state.write();
      let was = state.token.is_some();
      *state = SessionState::anonymous();
      was
    };
    self.reset();
    if was_authenticated {
      info!("session expired");
    }
    was_authenticated
  }
}

impl std::fmt::Debug for AuthSession {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.inner.state.read();
    f.debug_struct("AuthSession")
      .field("state", &state.phase)
      .field("has_token", &state.token.is_some())
      .finish_non_exhaustive()
  }
}
