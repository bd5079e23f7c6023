//! Typed access to the admin backend.

pub mod auth;
pub mod banks;
pub mod categories;
pub mod envelope;
pub mod form;
pub mod groups;
pub mod http;
pub mod icons;
pub mod keys;
pub mod queries;
pub mod types;
pub mod users;

use color_eyre::Result;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::session::{AuthSession, Navigator};

pub use auth::{AuthApi, SignedIn};
pub use banks::BanksApi;
pub use categories::CategoriesApi;
pub use form::{Attachment, BankForm, CategoryForm, FormData, GroupForm, IconForm};
pub use groups::GroupsApi;
pub use http::{AuthMode, HttpClient, RequestBody, RequestOptions};
pub use icons::IconsApi;
pub use keys::AdminQueryKey;
pub use queries::{AdminQueries, Edit, Removal};
pub use users::UsersApi;

/// Every resource client, sharing one HTTP adapter.
#[derive(Clone)]
pub struct AdminApi {
  pub http: HttpClient,
  pub auth: AuthApi,
  pub banks: BanksApi,
  pub categories: CategoriesApi,
  pub groups: GroupsApi,
  pub icons: IconsApi,
  pub users: UsersApi,
}

impl AdminApi {
  pub fn new(config: &ApiConfig, session: AuthSession, navigator: Arc<dyn Navigator>) -> Result<Self> {
    let http = HttpClient::new(config, session.clone(), navigator)?;
    Ok(Self::from_http(http, session))
  }

  pub fn from_http(http: HttpClient, session: AuthSession) -> Self {
    Self {
      auth: AuthApi::new(http.clone(), session),
      banks: BanksApi::new(http.clone()),
      categories: CategoriesApi::new(http.clone()),
      groups: GroupsApi::new(http.clone()),
      icons: IconsApi::new(http.clone()),
      users: UsersApi::new(http.clone()),
      http,
    }
  }
}
