mod cli;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rendezvous::config;

#[derive(Parser)]
#[command(name = "rendezvous", version, about = "Social journal for VR sessions")]
struct Cli {
    /// Config file (defaults to ~/.rendezvous/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Manage registered users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Import a pasted presence log for a user
    Import {
        username: String,
        file: PathBuf,
        /// Timestamp the log's dates are read against (YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        reference: Option<String>,
    },
    /// Turn stored presence logs into shared events
    Convert {
        /// Only this user; all users when omitted
        username: Option<String>,
    },
    /// Recompute every event group
    Regroup,
    /// Show a user's journal statistics
    Stats { username: String },
    /// Export users, friendships and events as JSON
    Export,
    /// Check database health
    Doctor {
        /// Restore one-sided friend edges and regroup ungrouped events
        #[arg(long)]
        repair: bool,
    },
    /// Delete all journal data
    Reset {
        /// Delete users and friendships too
        #[arg(long)]
        users: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user
    Add { username: String },
    /// List registered users
    List,
    /// Show a user's friends
    Friends { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::JournalConfig::load_from(path)?,
        None => config::JournalConfig::load()?,
    };

    // Log to stderr so stdout stays clean for `export`.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::User { action } => match action {
            UserAction::Add { username } => cli::users::add(&config, &username)?,
            UserAction::List => cli::users::list(&config)?,
            UserAction::Friends { username } => cli::users::friends(&config, &username)?,
        },
        Command::Import {
            username,
            file,
            reference,
        } => cli::import::import(&config, &username, &file, reference.as_deref())?,
        Command::Convert { username } => cli::convert::convert(&config, username.as_deref())?,
        Command::Regroup => cli::convert::regroup(&config)?,
        Command::Stats { username } => cli::stats::stats(&config, &username)?,
        Command::Export => cli::export::export(&config)?,
        Command::Doctor { repair } => cli::doctor::doctor(&config, repair)?,
        Command::Reset { users } => cli::reset::reset(&config, users)?,
    }

    Ok(())
}
