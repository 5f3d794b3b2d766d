//! Drive commands.

use super::{connect_drive, Account};
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use icloud_drive::{DriveNode, NodeKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One row of `ls` output.
#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    kind: NodeKind,
    size: Option<i64>,
    modified: Option<DateTime<Utc>>,
}

impl From<&DriveNode> for Entry {
    fn from(node: &DriveNode) -> Self {
        Self {
            name: node.name(),
            kind: node.kind(),
            size: node.size(),
            modified: node.modified(),
        }
    }
}

impl Entry {
    fn line(&self) -> String {
        let size = match self.kind {
            NodeKind::Folder => "-".to_string(),
            NodeKind::File => output::format_size(self.size.unwrap_or(0)),
        };
        let modified = self
            .modified
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let name = match self.kind {
            NodeKind::Folder => format!("{}/", self.name),
            NodeKind::File => self.name.clone(),
        };
        format!("{:>8}  {:<16}  {}", size, modified, name)
    }
}

/// List a folder, or describe a single file.
pub async fn ls(account: &Account, path: &str, format: &OutputFormat) -> Result<()> {
    let drive = connect_drive(account).await?;
    let node = drive.resolve(path).await?;

    let entries: Vec<Entry> = if node.is_dir() {
        drive.children(&node).await?.iter().map(Entry::from).collect()
    } else {
        vec![Entry::from(&node)]
    };

    match format {
        OutputFormat::Json => output::print_json(&entries)?,
        OutputFormat::Text => {
            for entry in &entries {
                println!("{}", entry.line());
            }
        }
    }
    Ok(())
}

/// Download a file.
pub async fn get(
    account: &Account,
    remote: &str,
    local: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    let drive = connect_drive(account).await?;
    let node = drive.resolve(remote).await?;
    let dest = destination(local, &node.name());
    debug!(remote, dest = %dest.display(), "Downloading");

    let bytes = drive
        .download(&node, &dest)
        .await
        .with_context(|| format!("Failed to download {}", remote))?;
    output::print_success(
        &format!("Downloaded {} to {} ({} bytes)", node.name(), dest.display(), bytes),
        format,
    );
    Ok(())
}

/// A directory destination receives the remote name.
fn destination(local: Option<&Path>, remote_name: &str) -> PathBuf {
    match local {
        Some(path) if path.is_dir() => path.join(remote_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(remote_name),
    }
}

/// Upload a local file into a folder.
pub async fn put(account: &Account, local: &Path, folder: &str, format: &OutputFormat) -> Result<()> {
    let drive = connect_drive(account).await?;
    let target = drive.resolve(folder).await?;
    debug!(local = %local.display(), folder = %target.name(), "Uploading");

    let committed = drive
        .upload(&target, local)
        .await
        .with_context(|| format!("Failed to upload {}", local.display()))?;
    output::print_success(
        &format!(
            "Uploaded {} (document {})",
            local.display(),
            committed.document_id
        ),
        format,
    );
    Ok(())
}

/// Move a node to the trash.
pub async fn rm(account: &Account, path: &str, format: &OutputFormat) -> Result<()> {
    let drive = connect_drive(account).await?;
    let node = drive.resolve(path).await?;
    drive.delete(&node).await?;
    output::print_success(&format!("Moved {} to trash", path), format);
    Ok(())
}

pub async fn mv(account: &Account, path: &str, new_name: &str, format: &OutputFormat) -> Result<()> {
    if new_name.contains('/') {
        anyhow::bail!("New name must not contain '/': {}", new_name);
    }
    let drive = connect_drive(account).await?;
    let node = drive.resolve(path).await?;
    drive.rename(&node, new_name).await?;
    output::print_success(&format!("Renamed {} to {}", path, new_name), format);
    Ok(())
}

pub async fn mkdir(account: &Account, parent: &str, name: &str, format: &OutputFormat) -> Result<()> {
    let drive = connect_drive(account).await?;
    let folder = drive.resolve(parent).await?;
    drive.mkdir(&folder, name).await?;
    output::print_success(&format!("Created folder {}", name), format);
    Ok(())
}
