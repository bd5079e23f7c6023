//! The console's dependency container.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{AdminApi, AdminQueries, SignedIn};
use crate::cache::QueryClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::session::{AuthSession, Navigator, Route, SessionStore};

/// Forwards navigation and drops every cached query when the session ends,
/// so nothing fetched under the old credentials outlives them.
struct SessionEndNavigator {
  inner: Arc<dyn Navigator>,
  cache: QueryClient,
}

impl Navigator for SessionEndNavigator {
  fn navigate(&self, route: Route) {
    self.inner.navigate(route);
  }

  fn redirect_to_login(&self) {
    self.cache.clear();
    self.inner.redirect_to_login();
  }
}

/// Session, adapter, cache and hooks of one console instance.
///
/// Nothing here is global: two contexts share no state, which is what
/// tests rely on to run side by side.
#[derive(Clone)]
pub struct AdminContext {
  session: AuthSession,
  cache: QueryClient,
  api: AdminApi,
  queries: AdminQueries,
  navigator: Arc<dyn Navigator>,
}

impl AdminContext {
  /// Restore the stored session and wire up the clients.
  pub fn init(config: &Config, store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Result<Self> {
    let session = AuthSession::init(store);
    let cache = QueryClient::new(config.cache.query_options());
    let adapter_navigator: Arc<dyn Navigator> = Arc::new(SessionEndNavigator {
      inner: navigator.clone(),
      cache: cache.clone(),
    });
    let api = AdminApi::new(&config.api, session.clone(), adapter_navigator)?;
    let queries = AdminQueries::new(cache.clone(), api.clone());

    debug!(
      base_url = %api.http.base_url(),
      authenticated = session.is_authenticated(),
      "admin context initialised"
    );

    Ok(Self {
      session,
      cache,
      api,
      queries,
      navigator,
    })
  }

  pub fn session(&self) -> &AuthSession {
    &self.session
  }

  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  pub fn api(&self) -> &AdminApi {
    &self.api
  }

  pub fn queries(&self) -> &AdminQueries {
    &self.queries
  }

  pub fn is_authenticated(&self) -> bool {
    self.session.is_authenticated()
  }

  /// Log in and land on the dashboard.
  pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn, ApiError> {
    let signed_in = self.api.auth.login(email, password).await?;
    self.navigator.navigate(Route::Dashboard);
    Ok(signed_in)
  }

  /// Log out and forget everything cached for the session.
  pub async fn logout(&self) {
    self.api.auth.logout().await;
    self.reset();
    self.navigator.redirect_to_login();
  }

  /// Drop cached queries and the stored session.
  pub fn reset(&self) {
    self.cache.clear();
    self.session.reset();
    info!("admin context reset");
  }

  /// Check access to `route` before mounting anything on it.
  ///
  /// Anonymous callers of a protected route are sent to the login page and
  /// get `Auth`, so no protected fetch goes out without a token.
  pub fn guard(&self, route: Route) -> Result<(), ApiError> {
    if route.is_protected() && !self.session.is_authenticated() {
      debug!(route = route.path(), "anonymous access to protected route");
      self.navigator.redirect_to_login();
      return Err(ApiError::Auth(format!(
        "{} requires a logged-in administrator",
        route.path()
      )));
    }
    Ok(())
  }
}
