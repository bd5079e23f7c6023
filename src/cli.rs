//! Console subcommands. Each one mounts the hooks of its view, waits for
//! them to settle and prints the result.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kedil_admin::api::form::{Attachment, BankForm, CategoryForm, GroupForm, IconForm};
use kedil_admin::api::types::{
  BankMaster, CategoryListing, CategoryParams, CategorySearch, DashboardFilter, Group, Icon, User,
};
use kedil_admin::api::{Edit, Removal};
use kedil_admin::cache::QueryHandle;
use kedil_admin::config::Config;
use kedil_admin::session::Route;
use kedil_admin::{AdminContext, ApiError};

#[derive(Parser, Debug)]
#[command(name = "kedil-admin")]
#[command(about = "Administrative console for the Kedil budgeting backend")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/kedil-admin/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  pub verbose: u8,

  /// Print results as JSON
  #[arg(long, global = true)]
  pub json: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Log in as an administrator.
  Login {
    email: String,
    /// Falls back to KEDIL_ADMIN_PASSWORD.
    #[arg(long)]
    password: Option<String>,
  },
  /// End the session.
  Logout,
  /// Show the logged-in administrator.
  Whoami,
  /// Bank master records.
  #[command(subcommand)]
  Banks(BankCmd),
  /// Budget categories.
  #[command(subcommand)]
  Categories(CategoryCmd),
  /// Category groups.
  #[command(subcommand)]
  Groups(GroupCmd),
  /// Icon library.
  #[command(subcommand)]
  Icons(IconCmd),
  /// Registered users.
  #[command(subcommand)]
  Users(UserCmd),
  /// Budget totals for a date range (default: this month to date).
  Dashboard(RangeArgs),
}

#[derive(Args, Debug)]
pub struct RangeArgs {
  #[arg(long)]
  pub from: Option<NaiveDate>,
  #[arg(long)]
  pub to: Option<NaiveDate>,
  #[arg(long)]
  pub search: Option<String>,
  #[arg(long)]
  pub group: Option<String>,
}

impl RangeArgs {
  fn into_filter(self) -> DashboardFilter {
    let mut filter = DashboardFilter::month_to_date(Local::now().date_naive());
    if let Some(from) = self.from {
      filter.from_date = from;
    }
    if let Some(to) = self.to {
      filter.to_date = to;
    }
    filter.search = self.search.filter(|s| !s.trim().is_empty());
    filter.group_id = self.group.filter(|g| !g.trim().is_empty());
    filter
  }
}

#[derive(Subcommand, Debug)]
pub enum BankCmd {
  List,
  Show {
    id: i64,
  },
  Create(BankArgs),
  Update {
    id: i64,
    #[command(flatten)]
    bank: BankArgs,
  },
  /// Delete a bank; accounts still using it need --migrate-to.
  Delete {
    id: i64,
    #[arg(long)]
    migrate_to: Option<i64>,
  },
}

#[derive(Args, Debug)]
pub struct BankArgs {
  #[arg(long)]
  pub name: String,
  #[arg(long)]
  pub short_name: Option<String>,
  #[arg(long)]
  pub slug: Option<String>,
  /// Logo image to upload
  #[arg(long)]
  pub image: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCmd {
  List {
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    epoch: Option<i64>,
  },
  Show {
    id: String,
    #[arg(long)]
    epoch: Option<i64>,
  },
  Create {
    #[arg(long)]
    name: String,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  Update {
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  /// Delete a category, moving its transactions to --migrate-to.
  Delete {
    id: String,
    #[arg(long)]
    migrate_to: Option<String>,
  },
  /// Paged category listing for a date range.
  Search {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    size: u32,
    #[command(flatten)]
    range: RangeArgs,
  },
}

#[derive(Subcommand, Debug)]
pub enum GroupCmd {
  List,
  Show {
    id: String,
  },
  Create {
    #[arg(long)]
    name: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  Update {
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  /// Delete a group, moving its transactions to the category --migrate-to.
  Delete {
    id: String,
    #[arg(long)]
    migrate_to: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum IconCmd {
  List {
    #[arg(long)]
    search: Option<String>,
  },
  Show {
    id: String,
  },
  Create(IconArgs),
  Update {
    id: String,
    #[command(flatten)]
    icon: IconArgs,
  },
  Delete {
    id: String,
  },
}

#[derive(Args, Debug)]
pub struct IconArgs {
  #[arg(long)]
  pub slug: String,
  /// Comma-separated search tags
  #[arg(long)]
  pub tags: Option<String>,
  #[arg(long)]
  pub image: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum UserCmd {
  List,
  Show { id: String },
  ByEmail { email: String },
}

pub async fn run(ctx: &AdminContext, json: bool, command: Command) -> Result<()> {
  let out = Output { json };
  match command {
    Command::Login { email, password } => {
      let password = match password {
        Some(password) => password,
        None => Config::get_password()?,
      };
      let signed_in = ctx
        .login(&email, &password)
        .await
        .map_err(|e| eyre!("{}", e.message()))?;
      match signed_in.user {
        Some(user) => println!("Logged in as {} <{}>", user.display_name(), user.email),
        None => println!("Logged in as {}", email),
      }
      Ok(())
    }
    Command::Logout => {
      ctx.logout().await;
      println!("Logged out");
      Ok(())
    }
    Command::Whoami => {
      ctx.guard(Route::Dashboard)?;
      match ctx.session().user() {
        Some(user) => out.one(&user, render_user),
        None => {
          println!("Logged in (no profile stored)");
          Ok(())
        }
      }
    }
    Command::Banks(cmd) => {
      ctx.guard(Route::BankMaster)?;
      banks(ctx, &out, cmd).await
    }
    Command::Categories(cmd) => {
      ctx.guard(Route::Categories)?;
      categories(ctx, &out, cmd).await
    }
    Command::Groups(cmd) => {
      ctx.guard(Route::Groups)?;
      groups(ctx, &out, cmd).await
    }
    Command::Icons(cmd) => {
      ctx.guard(Route::Icons)?;
      icons(ctx, &out, cmd).await
    }
    Command::Users(cmd) => {
      ctx.guard(Route::Users)?;
      users(ctx, &out, cmd).await
    }
    Command::Dashboard(range) => {
      ctx.guard(Route::Dashboard)?;
      let filter = range.into_filter();
      let data = settle(ctx.queries().use_dashboard(filter.clone(), true)).await?;
      if out.json {
        return out.print_json(&*data);
      }
      println!("Dashboard {} .. {}", filter.from_date, filter.to_date);
      let summary = &data.summary;
      println!(
        "  assigned {:.2}  activity {:.2}  available {:.2}  overspent {:.2}",
        summary.assigned, summary.activity, summary.available, summary.overspent
      );
      println!("  uncategorized {:.2}", data.uncategorized.amount);
      for group in &data.groups {
        println!(
          "  {} (allocated {:.2}, available {:.2})",
          group.name,
          group.allocated.unwrap_or_default(),
          group.available.unwrap_or_default()
        );
        for category in &group.categories {
          println!(
            "    {}  allocated {:.2}  available {:.2}",
            category.name,
            category.allocated.unwrap_or_default(),
            category.available.unwrap_or_default()
          );
        }
      }
      Ok(())
    }
  }
}

async fn banks(ctx: &AdminContext, out: &Output, cmd: BankCmd) -> Result<()> {
  let queries = ctx.queries();
  match cmd {
    BankCmd::List => {
      let banks = settle(queries.use_banks()).await?;
      out.many(banks.as_slice(), render_bank)
    }
    BankCmd::Show { id } => {
      let bank = settle(queries.use_bank(id)).await?;
      out.one(&*bank, render_bank)
    }
    BankCmd::Create(args) => {
      let form = bank_form(args).await?;
      let bank = queries.create_bank().mutate(form).await?;
      out.one(&bank, render_bank)
    }
    BankCmd::Update { id, bank } => {
      let form = bank_form(bank).await?;
      let bank = queries.update_bank().mutate(Edit { id, form }).await?;
      out.one(&bank, render_bank)
    }
    BankCmd::Delete { id, migrate_to } => {
      if migrate_to == Some(id) {
        return Err(eyre!("Please select a different bank to migrate accounts to"));
      }
      match queries.delete_bank().mutate(Removal { id, migrate_to }).await {
        Ok(_) => {
          println!("Deleted bank {}", id);
          Ok(())
        }
        Err(ApiError::Conflict(message)) => Err(eyre!(
          "{}\nRetry with --migrate-to <BANK_ID> to move its accounts first",
          message
        )),
        Err(e) => Err(e.into()),
      }
    }
  }
}

async fn categories(ctx: &AdminContext, out: &Output, cmd: CategoryCmd) -> Result<()> {
  let queries = ctx.queries();
  match cmd {
    CategoryCmd::List { start, end, epoch } => {
      let params = CategoryParams {
        start_date: start,
        end_date: end,
        epoch,
      };
      let listing = settle(queries.use_categories(params)).await?;
      out.listing(&listing)
    }
    CategoryCmd::Show { id, epoch } => {
      let params = CategoryParams {
        epoch,
        ..CategoryParams::default()
      };
      let category = settle(queries.use_category(&id, params)).await?;
      out.one(&*category, |c| {
        format!(
          "{}  {}  group {}  allocated {:.2}  available {:.2}",
          c.id,
          c.name,
          c.group_name.as_deref().unwrap_or("-"),
          c.allocated.unwrap_or_default(),
          c.available.unwrap_or_default()
        )
      })
    }
    CategoryCmd::Create { name, group, image } => {
      let form = CategoryForm {
        name,
        group_id: group,
        image: attachment(image.as_deref()).await?,
      };
      let created = queries.create_category().mutate(form).await?;
      println!("Created category {}", created.category.id);
      Ok(())
    }
    CategoryCmd::Update { id, name, image } => {
      let form = CategoryForm {
        name,
        group_id: None,
        image: attachment(image.as_deref()).await?,
      };
      let updated = queries.update_category().mutate(Edit { id, form }).await?;
      println!("Updated category {}", updated.id);
      Ok(())
    }
    CategoryCmd::Delete { id, migrate_to } => {
      queries
        .delete_category()
        .mutate(Removal {
          id: id.clone(),
          migrate_to,
        })
        .await?;
      println!("Deleted category {}", id);
      Ok(())
    }
    CategoryCmd::Search { page, size, range } => {
      let request = CategorySearch {
        page,
        size,
        filter: range.into_filter(),
      };
      let listing = settle(queries.use_category_search(request, true)).await?;
      out.listing(&listing)
    }
  }
}

async fn groups(ctx: &AdminContext, out: &Output, cmd: GroupCmd) -> Result<()> {
  let queries = ctx.queries();
  match cmd {
    GroupCmd::List => {
      let groups = settle(queries.use_groups()).await?;
      out.many(groups.as_slice(), render_group)
    }
    GroupCmd::Show { id } => {
      let group = settle(queries.use_group(&id)).await?;
      out.one(&*group, render_group)
    }
    GroupCmd::Create { name, image } => {
      let form = GroupForm {
        name,
        image: attachment(image.as_deref()).await?,
      };
      let group = queries.create_group().mutate(form).await?;
      out.one(&group, render_group)
    }
    GroupCmd::Update { id, name, image } => {
      let form = GroupForm {
        name,
        image: attachment(image.as_deref()).await?,
      };
      let group = queries.update_group().mutate(Edit { id, form }).await?;
      out.one(&group, render_group)
    }
    GroupCmd::Delete { id, migrate_to } => {
      queries
        .delete_group()
        .mutate(Removal {
          id: id.clone(),
          migrate_to,
        })
        .await?;
      println!("Deleted group {}", id);
      Ok(())
    }
  }
}

async fn icons(ctx: &AdminContext, out: &Output, cmd: IconCmd) -> Result<()> {
  let queries = ctx.queries();
  match cmd {
    IconCmd::List { search } => {
      let icons = settle(queries.use_icons(search)).await?;
      out.many(icons.as_slice(), render_icon)
    }
    IconCmd::Show { id } => {
      let icon = settle(queries.use_icon(&id)).await?;
      out.one(&*icon, render_icon)
    }
    IconCmd::Create(args) => {
      let form = icon_form(args).await?;
      let icon = queries.create_icon().mutate(form).await?;
      out.one(&icon, render_icon)
    }
    IconCmd::Update { id, icon } => {
      let form = icon_form(icon).await?;
      let icon = queries.update_icon().mutate(Edit { id, form }).await?;
      out.one(&icon, render_icon)
    }
    IconCmd::Delete { id } => {
      queries.delete_icon().mutate(id.clone()).await?;
      println!("Deleted icon {}", id);
      Ok(())
    }
  }
}

async fn users(ctx: &AdminContext, out: &Output, cmd: UserCmd) -> Result<()> {
  let queries = ctx.queries();
  match cmd {
    UserCmd::List => {
      let users = settle(queries.use_users()).await?;
      out.many(users.as_slice(), render_user)
    }
    UserCmd::Show { id } => {
      let user = ctx.api().users.get_by_id(&id).await?;
      out.one(&user, render_user)
    }
    UserCmd::ByEmail { email } => {
      let user = settle(queries.use_user_by_email(&email, true)).await?;
      out.one(&*user, render_user)
    }
  }
}

/// Wait for a mounted query to settle and return its data.
async fn settle<T: Send + Sync + 'static>(mut handle: QueryHandle<T>) -> Result<Arc<T>> {
  let state = handle.settled().await;
  if let Some(error) = state.error {
    return Err(error.into());
  }
  state
    .data
    .ok_or_else(|| eyre!("query {} produced no data", handle.key()))
}

async fn attachment(path: Option<&Path>) -> Result<Option<Attachment>> {
  match path {
    Some(path) => Attachment::from_path(path)
      .await
      .map(Some)
      .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e)),
    None => Ok(None),
  }
}

async fn bank_form(args: BankArgs) -> Result<BankForm> {
  Ok(BankForm {
    name: args.name,
    short_name: args.short_name,
    slug: args.slug,
    image: attachment(args.image.as_deref()).await?,
  })
}

async fn icon_form(args: IconArgs) -> Result<IconForm> {
  Ok(IconForm {
    slug: args.slug,
    tags: args.tags,
    image: attachment(args.image.as_deref()).await?,
  })
}

fn render_bank(bank: &BankMaster) -> String {
  format!(
    "{:>5}  {:<30}  {:<8}  {}{}",
    bank.id,
    bank.name,
    bank.short_name,
    bank.slug,
    if bank.is_global { "  (global)" } else { "" }
  )
}

fn render_group(group: &Group) -> String {
  format!("{}  {}", group.id, group.name)
}

fn render_icon(icon: &Icon) -> String {
  let tags = icon
    .search_tags
    .as_ref()
    .map(|tags| tags.join(", "))
    .or_else(|| icon.tags.clone())
    .unwrap_or_default();
  format!("{}  {:<24}  {}", icon.id, icon.slug, tags)
}

fn render_user(user: &User) -> String {
  format!(
    "{}  {:<24}  {}",
    user.id.as_deref().unwrap_or("-"),
    user.display_name(),
    user.email
  )
}

struct Output {
  json: bool,
}

impl Output {
  fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
      .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
  }

  fn one<T: Serialize>(&self, value: &T, render: impl Fn(&T) -> String) -> Result<()> {
    if self.json {
      return self.print_json(value);
    }
    println!("{}", render(value));
    Ok(())
  }

  fn many<T: Serialize>(&self, values: &[T], render: impl Fn(&T) -> String) -> Result<()> {
    if self.json {
      return self.print_json(values);
    }
    if values.is_empty() {
      println!("(none)");
    }
    for value in values {
      println!("{}", render(value));
    }
    Ok(())
  }

  fn listing(&self, listing: &CategoryListing) -> Result<()> {
    if self.json {
      return self.print_json(listing);
    }
    for group in &listing.groups {
      println!("{}  {}", group.id, group.name);
      for category in &group.categories {
        println!("    {}  {}", category.id, category.name);
      }
    }
    println!("uncategorized {:.2}", listing.uncategorized.amount);
    if let Some(pagination) = &listing.pagination {
      println!("page {}", pagination);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parses_bank_delete_with_target() {
    let cli = Cli::try_parse_from(["kedil-admin", "banks", "delete", "5", "--migrate-to", "7"]).unwrap();
    match cli.command {
      Command::Banks(BankCmd::Delete { id, migrate_to }) => {
        assert_eq!(id, 5);
        assert_eq!(migrate_to, Some(7));
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_login_password_is_optional() {
    let cli = Cli::try_parse_from(["kedil-admin", "login", "admin@kedil.com"]).unwrap();
    match cli.command {
      Command::Login { email, password } => {
        assert_eq!(email, "admin@kedil.com");
        assert_eq!(password, None);
      }
      other => panic!("unexpected command: {:?}", other),
    }

    let cli = Cli::try_parse_from(["kedil-admin", "login", "admin@kedil.com", "--password", "pw"]).unwrap();
    assert!(matches!(cli.command, Command::Login { password: Some(ref p), .. } if p == "pw"));
  }

  #[test]
  fn test_dashboard_range_overrides() {
    let cli = Cli::try_parse_from([
      "kedil-admin",
      "dashboard",
      "--from",
      "2026-09-01",
      "--to",
      "2026-09-30",
      "--search",
      " ",
    ])
    .unwrap();
    let Command::Dashboard(range) = cli.command else {
      panic!("expected dashboard");
    };
    let filter = range.into_filter();
    assert_eq!(filter.from_date, NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
    assert_eq!(filter.to_date, NaiveDate::from_ymd_opt(2026, 9, 30).unwrap());
    assert_eq!(filter.search, None);
  }
}
