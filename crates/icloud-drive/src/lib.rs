//! iCloud Drive: a lazily listed folder tree, downloads and uploads.
//!
//! This crate provides:
//! - A node arena that lists each folder at most once until marked stale
//! - Path resolution from the Drive root
//! - Streaming downloads and two-phase (stage, commit) uploads
//! - Trash, rename and folder creation

mod download;
mod error;
mod node;
mod tree;
mod types;
mod upload;

pub use error::{DriveError, DriveResult};
pub use node::{DriveNode, NodeKind};
pub use tree::DriveService;
pub use types::{DriveItem, SingleFile};
pub use upload::{CommittedUpload, UploadStaging};
