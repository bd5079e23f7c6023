use parking_lot::Mutex;
use tracing::warn;

/// Console routes. Everything but the login page requires a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Login,
  Dashboard,
  Analysis,
  Users,
  BankMaster,
  Categories,
  Groups,
  Icons,
}

impl Route {
  pub fn path(&self) -> &'static str {
    match self {
      Route::Login => "/auth/login",
      Route::Dashboard => "/dashboard",
      Route::Analysis => "/analysis",
      Route::Users => "/users",
      Route::BankMaster => "/bank-master",
      Route::Categories => "/categories",
      Route::Groups => "/groups",
      Route::Icons => "/icons",
    }
  }

  pub fn is_protected(&self) -> bool {
    !matches!(self, Route::Login)
  }
}

/// Receives navigation side effects triggered outside the views.
pub trait Navigator: Send + Sync {
  fn navigate(&self, route: Route);

  fn redirect_to_login(&self) {
    self.navigate(Route::Login);
  }
}

/// Navigator for the terminal console: there is no page to switch to, so
/// the redirect becomes a prompt to log in again.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
  fn navigate(&self, route: Route) {
    if route == Route::Login {
      warn!("session is no longer valid, run `kedil-admin login`");
    }
  }
}

/// Records every navigation, for tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
  visits: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn visits(&self) -> Vec<Route> {
    self.visits.lock().clone()
  }

  pub fn count(&self, route: Route) -> usize {
    self.visits.lock().iter().filter(|r| **r == route).count()
  }
}

impl Navigator for RecordingNavigator {
  fn navigate(&self, route: Route) {
    self.visits.lock().push(route);
  }
}
