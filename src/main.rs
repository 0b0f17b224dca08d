mod api;
mod app;
mod config;
mod context;
mod event;
mod logging;
mod query;
mod session;
mod temporal;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use context::DashboardContext;
use query::Params;
use session::TokenStore;
use std::path::PathBuf;
use temporal::TimeRange;

#[derive(Parser, Debug)]
#[command(name = "kvdash")]
#[command(about = "A terminal dashboard for Klang Valley transit and attractions")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kvdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding config and KVDASH_API_BASE_URL
  #[arg(short, long)]
  base_url: Option<String>,

  /// Time range to start with
  #[arg(short, long, value_enum)]
  time_range: Option<TimeRange>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store a bearer token for future runs
  Login {
    #[arg(long)]
    token: String,
  },
  /// Forget the stored token
  Logout,
  /// GET an endpoint once and print the JSON response
  Fetch {
    endpoint: String,
    /// Query parameters as key=value
    #[arg(value_parser = parse_param)]
    params: Vec<(String, String)>,
  },
  /// POST a JSON body to an endpoint and print the response
  Post { endpoint: String, body: String },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected key=value, got '{}'", s)),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logs go to a file; keep the guard alive until exit
  let _log_guard = match logging::default_log_dir() {
    Some(dir) => Some(logging::init(&dir)?),
    None => None,
  };

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?.with_base_url(args.base_url);
  if let Some(range) = args.time_range {
    config.dashboard.default_time_range = range;
  }

  let token_store = match TokenStore::open_default() {
    Ok(store) => Some(store),
    Err(e) => {
      tracing::warn!(error = %e, "token storage unavailable, sign-in won't persist");
      None
    }
  };
  let mut ctx = DashboardContext::new(&config, token_store)?;

  match args.command {
    Some(Command::Login { token }) => {
      ctx.login(&token)?;
      println!("Logged in.");
    }
    Some(Command::Logout) => {
      ctx.logout()?;
      println!("Logged out.");
    }
    Some(Command::Fetch { endpoint, params }) => {
      let params: Params = params.into_iter().map(|(k, v)| (k, v.into())).collect();
      let value = ctx
        .client
        .get(&endpoint, &params)
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", endpoint, e))?;
      println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Some(Command::Post { endpoint, body }) => {
      let body: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| eyre!("Failed to parse request body: {}", e))?;
      let value = ctx
        .mutate(&endpoint, &body)
        .await
        .map_err(|e| eyre!("Failed to post to {}: {}", endpoint, e))?;
      println!("{}", serde_json::to_string_pretty(&value)?);
    }
    None => {
      let mut app = app::App::new(ctx, config);
      app.run().await?;
    }
  }

  Ok(())
}
