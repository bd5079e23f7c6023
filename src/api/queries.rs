//! Query and mutation hooks: resource clients bound to cache keys and
//! invalidation rules.

use std::time::Duration;

use super::form::{BankForm, CategoryForm, GroupForm, IconForm};
use super::keys::{self, AdminQueryKey};
use super::types::{
  BankMaster, Category, CategoryListing, CategoryParams, CategorySearch, CreatedCategory,
  DashboardData, DashboardFilter, Group, Icon, RecordRef, User,
};
use super::AdminApi;
use crate::cache::{Mutation, MutationOptions, QueryClient, QueryHandle, QueryOptions};

/// Input of an update mutation.
#[derive(Debug, Clone)]
pub struct Edit<K, F> {
  pub id: K,
  pub form: F,
}

/// Input of a delete mutation. `migrate_to` names the record that takes
/// over whatever still references the deleted one.
#[derive(Debug, Clone)]
pub struct Removal<K> {
  pub id: K,
  pub migrate_to: Option<K>,
}

/// The icon library changes rarely: keep it fresh for 30 seconds and do not
/// refetch it on mount or focus.
pub fn icon_options() -> QueryOptions {
  QueryOptions::default()
    .with_stale_time(Duration::from_secs(30))
    .with_gc_time(Duration::from_secs(5 * 60))
    .refetch_on_focus(false)
    .refetch_on_mount(false)
}

#[derive(Clone)]
pub struct AdminQueries {
  client: QueryClient,
  api: AdminApi,
}

impl AdminQueries {
  pub fn new(client: QueryClient, api: AdminApi) -> Self {
    Self { client, api }
  }

  pub fn client(&self) -> &QueryClient {
    &self.client
  }

  fn defaults(&self) -> QueryOptions {
    self.client.default_options()
  }

  // ==========================================================================
  // Banks
  // ==========================================================================

  pub fn use_banks(&self) -> QueryHandle<Vec<BankMaster>> {
    let banks = self.api.banks.clone();
    self.client.use_query(
      AdminQueryKey::Banks,
      move || {
        let banks = banks.clone();
        async move { banks.list().await }
      },
      self.defaults(),
    )
  }

  pub fn use_bank(&self, id: i64) -> QueryHandle<BankMaster> {
    let banks = self.api.banks.clone();
    self.client.use_query(
      AdminQueryKey::Bank { id },
      move || {
        let banks = banks.clone();
        async move { banks.get_by_id(id).await }
      },
      self.defaults().enabled(id != 0),
    )
  }

  pub fn create_bank(&self) -> Mutation<BankForm, BankMaster> {
    let banks = self.api.banks.clone();
    self.client.use_mutation(
      move |form| {
        let banks = banks.clone();
        async move { banks.create(form).await }
      },
      MutationOptions::new().invalidates(keys::all("banks")),
    )
  }

  pub fn update_bank(&self) -> Mutation<Edit<i64, BankForm>, BankMaster> {
    let banks = self.api.banks.clone();
    self.client.use_mutation(
      move |edit: Edit<i64, BankForm>| {
        let banks = banks.clone();
        async move { banks.update(edit.id, edit.form).await }
      },
      MutationOptions::new().invalidates(keys::all("banks")),
    )
  }

  pub fn delete_bank(&self) -> Mutation<Removal<i64>, Option<BankMaster>> {
    let banks = self.api.banks.clone();
    self.client.use_mutation(
      move |removal: Removal<i64>| {
        let banks = banks.clone();
        async move { banks.delete(removal.id, removal.migrate_to).await }
      },
      MutationOptions::new().invalidates(keys::all("banks")),
    )
  }

  // ==========================================================================
  // Categories
  // ==========================================================================

  pub fn use_categories(&self, params: CategoryParams) -> QueryHandle<CategoryListing> {
    let categories = self.api.categories.clone();
    let key = AdminQueryKey::Categories {
      params: params.clone(),
    };
    self.client.use_query(
      key,
      move || {
        let categories = categories.clone();
        let params = params.clone();
        async move { categories.list(&params).await }
      },
      self.defaults(),
    )
  }

  pub fn use_category(&self, id: &str, params: CategoryParams) -> QueryHandle<Category> {
    let categories = self.api.categories.clone();
    let key = AdminQueryKey::Category {
      id: id.to_string(),
      params: params.clone(),
    };
    let id = id.to_string();
    let enabled = !id.is_empty();
    self.client.use_query(
      key,
      move || {
        let categories = categories.clone();
        let id = id.clone();
        let epoch = params.epoch;
        async move { categories.get_by_id(&id, epoch).await }
      },
      self.defaults().enabled(enabled),
    )
  }

  pub fn use_dashboard(&self, filter: DashboardFilter, enabled: bool) -> QueryHandle<DashboardData> {
    let categories = self.api.categories.clone();
    let key = AdminQueryKey::Dashboard {
      filter: filter.clone(),
    };
    self.client.use_query(
      key,
      move || {
        let categories = categories.clone();
        let filter = filter.clone();
        async move { categories.dashboard(&filter).await }
      },
      self.defaults().enabled(enabled),
    )
  }

  pub fn use_category_search(&self, request: CategorySearch, enabled: bool) -> QueryHandle<CategoryListing> {
    let categories = self.api.categories.clone();
    let key = AdminQueryKey::CategorySearch {
      request: request.clone(),
    };
    self.client.use_query(
      key,
      move || {
        let categories = categories.clone();
        let request = request.clone();
        async move { categories.search(&request).await }
      },
      self.defaults().enabled(enabled),
    )
  }

  pub fn create_category(&self) -> Mutation<CategoryForm, CreatedCategory> {
    let categories = self.api.categories.clone();
    self.client.use_mutation(
      move |form| {
        let categories = categories.clone();
        async move { categories.create(form).await }
      },
      MutationOptions::new().invalidates(keys::all("categories")),
    )
  }

  pub fn update_category(&self) -> Mutation<Edit<String, CategoryForm>, RecordRef> {
    let categories = self.api.categories.clone();
    self.client.use_mutation(
      move |edit: Edit<String, CategoryForm>| {
        let categories = categories.clone();
        async move { categories.update(&edit.id, edit.form).await }
      },
      MutationOptions::new()
        .invalidates(keys::all("categories"))
        .invalidates_for(|edit: &Edit<String, CategoryForm>| keys::record("category", &edit.id)),
    )
  }

  pub fn delete_category(&self) -> Mutation<Removal<String>, ()> {
    let categories = self.api.categories.clone();
    self.client.use_mutation(
      move |removal: Removal<String>| {
        let categories = categories.clone();
        async move {
          categories
            .delete(&removal.id, removal.migrate_to.as_deref())
            .await
        }
      },
      MutationOptions::new().invalidates(keys::all("categories")),
    )
  }

  // ==========================================================================
  // Groups
  // ==========================================================================

  pub fn use_groups(&self) -> QueryHandle<Vec<Group>> {
    let groups = self.api.groups.clone();
    self.client.use_query(
      AdminQueryKey::Groups,
      move || {
        let groups = groups.clone();
        async move { groups.list().await }
      },
      self.defaults(),
    )
  }

  pub fn use_group(&self, id: &str) -> QueryHandle<Group> {
    let groups = self.api.groups.clone();
    let key = AdminQueryKey::Group { id: id.to_string() };
    let id = id.to_string();
    let enabled = !id.is_empty();
    self.client.use_query(
      key,
      move || {
        let groups = groups.clone();
        let id = id.clone();
        async move { groups.get_by_id(&id).await }
      },
      self.defaults().enabled(enabled),
    )
  }

  pub fn create_group(&self) -> Mutation<GroupForm, Group> {
    let groups = self.api.groups.clone();
    self.client.use_mutation(
      move |form| {
        let groups = groups.clone();
        async move { groups.create(form).await }
      },
      MutationOptions::new().invalidates(keys::all("groups")),
    )
  }

  pub fn update_group(&self) -> Mutation<Edit<String, GroupForm>, Group> {
    let groups = self.api.groups.clone();
    self.client.use_mutation(
      move |edit: Edit<String, GroupForm>| {
        let groups = groups.clone();
        async move { groups.update(&edit.id, edit.form).await }
      },
      MutationOptions::new()
        .invalidates(keys::all("groups"))
        .invalidates_for(|edit: &Edit<String, GroupForm>| keys::record("group", &edit.id)),
    )
  }

  /// Deleting a group moves its categories, so category listings go stale too.
  pub fn delete_group(&self) -> Mutation<Removal<String>, ()> {
    let groups = self.api.groups.clone();
    self.client.use_mutation(
      move |removal: Removal<String>| {
        let groups = groups.clone();
        async move { groups.delete(&removal.id, removal.migrate_to.as_deref()).await }
      },
      MutationOptions::new()
        .invalidates(keys::all("groups"))
        .invalidates(keys::all("categories")),
    )
  }

  // ==========================================================================
  // Icons
  // ==========================================================================

  pub fn use_icons(&self, search: Option<String>) -> QueryHandle<Vec<Icon>> {
    let icons = self.api.icons.clone();
    let key = AdminQueryKey::Icons {
      search: search.clone(),
    };
    self.client.use_query(
      key,
      move || {
        let icons = icons.clone();
        let search = search.clone();
        async move { icons.list(search.as_deref()).await }
      },
      icon_options(),
    )
  }

  pub fn use_icon(&self, id: &str) -> QueryHandle<Icon> {
    let icons = self.api.icons.clone();
    let key = AdminQueryKey::Icon { id: id.to_string() };
    let id = id.to_string();
    let enabled = !id.is_empty();
    self.client.use_query(
      key,
      move || {
        let icons = icons.clone();
        let id = id.clone();
        async move { icons.get_by_id(&id).await }
      },
      self.defaults().enabled(enabled),
    )
  }

  pub fn create_icon(&self) -> Mutation<IconForm, Icon> {
    let icons = self.api.icons.clone();
    self.client.use_mutation(
      move |form| {
        let icons = icons.clone();
        async move { icons.create(form).await }
      },
      MutationOptions::new().invalidates(keys::all("icons")),
    )
  }

  pub fn update_icon(&self) -> Mutation<Edit<String, IconForm>, Icon> {
    let icons = self.api.icons.clone();
    self.client.use_mutation(
      move |edit: Edit<String, IconForm>| {
        let icons = icons.clone();
        async move { icons.update(&edit.id, edit.form).await }
      },
      MutationOptions::new()
        .invalidates(keys::all("icons"))
        .invalidates_for(|edit: &Edit<String, IconForm>| keys::record("icon", &edit.id)),
    )
  }

  pub fn delete_icon(&self) -> Mutation<String, ()> {
    let icons = self.api.icons.clone();
    self.client.use_mutation(
      move |id: String| {
        let icons = icons.clone();
        async move { icons.delete(&id).await }
      },
      MutationOptions::new().invalidates(keys::all("icons")),
    )
  }

  // ==========================================================================
  // Users
  // ==========================================================================

  pub fn use_users(&self) -> QueryHandle<Vec<User>> {
    let users = self.api.users.clone();
    self.client.use_query(
      AdminQueryKey::Users,
      move || {
        let users = users.clone();
        async move { users.list().await }
      },
      self.defaults(),
    )
  }

  /// Lookup by email; stays idle until `enabled`.
  pub fn use_user_by_email(&self, email: &str, enabled: bool) -> QueryHandle<User> {
    let users = self.api.users.clone();
    let key = AdminQueryKey::User {
      email: email.to_string(),
    };
    let email = email.to_string();
    self.client.use_query(
      key,
      move || {
        let users = users.clone();
        let email = email.clone();
        async move { users.get_by_email(&email).await }
      },
      self.defaults().enabled(enabled),
    )
  }
}
