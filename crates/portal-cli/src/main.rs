//! Member Portal CLI - drive a realm's session coordinator from the terminal.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use portal_config::{init_logging, Config, Paths};
use session_coordinator::{AdminRole, ManagerCapabilities, RealmConfig};

/// Member Portal command-line interface.
#[derive(Parser)]
#[command(name = "member-portal")]
#[command(about = "Sign in to the Member Portal and call its API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs and sessions. Defaults to ~/.member-portal
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Which portal to sign in to
    #[arg(long, value_enum, default_value_t = Realm::Manager, global = true)]
    realm: Realm,

    /// Current navigation path; selects the tenant
    #[arg(long, global = true)]
    location: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Realm {
    Admin,
    Manager,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Sign in, completing 2FA and a forced password change if the flags allow
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Two-factor code
        #[arg(long)]
        code: Option<String>,

        /// New password, when the backend requires a change
        #[arg(long, requires = "confirm_secret")]
        new_secret: Option<String>,

        #[arg(long)]
        confirm_secret: Option<String>,
    },
    /// Show the stored session
    Status,
    /// Sign out and clear the stored session
    Logout,
    /// Resolve the tenant for a path
    Tenant { path: String },
    /// Call the API through the session (tenant stamping, refresh on 401)
    Request {
        method: String,
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths);
    paths.ensure_dirs()?;

    let location = cli.location.as_deref();
    match cli.realm {
        Realm::Admin => {
            app::run::<AdminRole>(RealmConfig::admin(), cli.command, location, &config, &paths)
                .await?
        }
        Realm::Manager => {
            app::run::<ManagerCapabilities>(
                RealmConfig::manager(),
                cli.command,
                location,
                &config,
                &paths,
            )
            .await?
        }
    }

    Ok(())
}
