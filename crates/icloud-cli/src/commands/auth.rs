//! Authentication commands.

use super::{prompt_line, Account};
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use icloud_auth::{AuthState, Device, IcloudClient};
use tracing::debug;

/// Sign in and answer a second-step or second-factor challenge if one is
/// pending.
pub async fn login(account: &Account, format: &OutputFormat) -> Result<()> {
    let client = account.open()?;

    match client.authenticate(false, None).await? {
        AuthState::SecondFactorRequired => second_factor(&client).await?,
        AuthState::SecondStepRequired => second_step(&client).await?,
        _ => {}
    }

    let state = client.auth_state();
    if !state.is_authenticated() {
        anyhow::bail!("Login did not complete (state: {:?})", state);
    }

    output::print_success(&format!("Logged in as {}", client.account_name()), format);
    Ok(())
}

async fn second_factor(client: &IcloudClient) -> Result<()> {
    println!("Two-factor authentication required.");
    let code = prompt_line("Enter the code you received on one of your approved devices: ")?;
    client
        .complete_second_factor(&code)
        .await
        .context("Failed to verify security code")
}

async fn second_step(client: &IcloudClient) -> Result<()> {
    println!("Two-step authentication required.");
    let devices = client.trusted_devices().await?;
    for (i, device) in devices.iter().enumerate() {
        println!("  {}: {}", i, describe(device));
    }

    let device = devices
        .into_iter()
        .next()
        .context("No trusted devices available")?;
    debug!(device_type = %device.device_type, "Requesting verification code");
    client.send_verification_code(&device).await?;

    let code = prompt_line(&format!("Enter the code sent to {}: ", describe(&device)))?;
    client
        .validate_verification_code(&device, &code)
        .await
        .context("Failed to verify verification code")
}

fn describe(device: &Device) -> String {
    if device.phone_number.is_empty() {
        device.device_type.clone()
    } else {
        format!("SMS to {}", device.phone_number)
    }
}

/// Check authentication status.
pub async fn status(account: &Account, format: &OutputFormat) -> Result<()> {
    let client = account.open()?;
    client.authenticate(false, None).await?;
    let status = client.status();

    match format {
        OutputFormat::Json => output::print_json(&status)?,
        OutputFormat::Text => {
            output::print_heading("Account");
            output::print_row("Apple ID", &status.account_name);
            output::print_row("State", &format!("{:?}", status.state));
            output::print_row("Trusted", yes_no(status.trusted));
            output::print_row("Needs 2SA", yes_no(status.requires_2sa));
            output::print_row("Needs 2FA", yes_no(status.requires_2fa));
            output::print_row("Services", &status.services.join(", "));
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
