//! iCloud Drive from the command line.

mod commands;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use commands::Account;
use icloud_auth::AuthError;
use icloud_config_and_utils::{init_logging, Config, Paths};
use icloud_drive::DriveError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "icloud")]
#[command(about = "Sign in to iCloud and manage iCloud Drive files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Apple ID
    #[arg(short, long, env = "ICLOUD_USERNAME", global = true)]
    username: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(short, long, env = "ICLOUD_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding per-account session data
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, answering any verification challenge
    Login,

    /// Show authentication status
    Status,

    /// List a folder
    Ls {
        /// Remote path (defaults to the root)
        #[arg(default_value = "")]
        path: String,
    },

    /// Download a file
    Get {
        /// Remote file path
        remote: String,
        /// Local destination (defaults to the remote name)
        local: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        /// Local file
        local: PathBuf,
        /// Remote folder (defaults to the root)
        #[arg(default_value = "")]
        folder: String,
    },

    /// Move a file or folder to the trash
    Rm {
        /// Remote path
        path: String,
    },

    /// Rename a file or folder
    Mv {
        /// Remote path
        path: String,
        /// New name, without any folder part
        new_name: String,
    },

    /// Create a folder
    Mkdir {
        /// Remote parent folder
        parent: String,
        /// Name of the new folder
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        if is_transient(&e) {
            eprintln!("The service may be temporarily unavailable; try again.");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(root) = cli.data_root {
        config.data_root = Some(root);
    }
    init_logging(log_level(cli.verbose, &config.log_level));
    let paths = config.apply_to(paths);

    let account = Account::new(cli.username, cli.password, paths, config);
    let format = &cli.format;

    match cli.command {
        Commands::Login => commands::login(&account, format).await,
        Commands::Status => commands::status(&account, format).await,
        Commands::Ls { path } => commands::ls(&account, &path, format).await,
        Commands::Get { remote, local } => {
            commands::get(&account, &remote, local.as_deref(), format).await
        }
        Commands::Put { local, folder } => commands::put(&account, &local, &folder, format).await,
        Commands::Rm { path } => commands::rm(&account, &path, format).await,
        Commands::Mv { path, new_name } => commands::mv(&account, &path, &new_name, format).await,
        Commands::Mkdir { parent, name } => {
            commands::mkdir(&account, &parent, &name, format).await
        }
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DriveError>()
            .is_some_and(DriveError::is_transient)
            || cause
                .downcast_ref::<AuthError>()
                .is_some_and(AuthError::is_transient)
    })
}

/// Level for a `-v` count; without the flag the configured level applies.
fn log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
