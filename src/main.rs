mod cli;

use clap::Parser;
use color_eyre::Result;
use std::sync::Arc;

use kedil_admin::config::Config;
use kedil_admin::session::{LogNavigator, SqliteSessionStore};
use kedil_admin::{telemetry, AdminContext};

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = cli::Cli::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _telemetry = telemetry::init(args.verbose, &config.logging);

  let store = match &config.session.path {
    Some(path) => SqliteSessionStore::open_at(path)?,
    None => SqliteSessionStore::open()?,
  };
  let ctx = AdminContext::init(&config, Arc::new(store), Arc::new(LogNavigator))?;

  cli::run(&ctx, args.json, args.command).await
}
