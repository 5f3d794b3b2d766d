//! CLI command implementations.

mod auth;
mod drive;

pub use auth::{login, status};
pub use drive::{get, ls, mkdir, mv, put, rm};

use anyhow::{Context, Result};
use icloud_auth::{AuthError, IcloudClient};
use icloud_config_and_utils::{Config, Paths};
use icloud_drive::DriveService;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

/// Credentials and local settings for one invocation.
pub struct Account {
    username: Option<String>,
    password: Option<String>,
    paths: Paths,
    config: Config,
}

impl Account {
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        paths: Paths,
        config: Config,
    ) -> Self {
        Self {
            username,
            password,
            paths,
            config,
        }
    }

    /// Build a client over the stored session. No network traffic.
    pub fn open(&self) -> Result<IcloudClient> {
        let username = match self.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => prompt_line("Apple ID: ")?,
        };
        if username.is_empty() {
            anyhow::bail!("Apple ID is required");
        }
        let password = match &self.password {
            Some(password) => password.clone(),
            None => rpassword::prompt_password(format!("Password for {}: ", username))?,
        };

        IcloudClient::open(&username, &password, &self.paths, &self.config)
            .with_context(|| format!("Failed to open session for {}", username))
    }
}

/// Authenticated client. A pending verification code is an error here;
/// `icloud login` is the only command that answers challenges.
async fn connect(account: &Account) -> Result<Arc<IcloudClient>> {
    let client = account.open()?;
    let state = client.authenticate(false, None).await?;
    debug!(account = %client.account_name(), state = ?state, "Session ready");
    if state.needs_code() {
        return Err(AuthError::SecondStepRequired)
            .context("Verification required. Run 'icloud login' first");
    }
    Ok(Arc::new(client))
}

async fn connect_drive(account: &Account) -> Result<DriveService> {
    let client = connect(account).await?;
    Ok(DriveService::new(client)?)
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
