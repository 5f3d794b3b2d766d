//! Read-only handles to Drive nodes.

use crate::types::DriveItem;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Kind of a Drive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    fn from_wire(item_type: &str) -> Self {
        match item_type.to_ascii_lowercase().as_str() {
            "folder" | "app_library" => NodeKind::Folder,
            _ => NodeKind::File,
        }
    }
}

/// Snapshot of a node's metadata.
///
/// Handles are cheap to clone and refer to the service's node arena by id;
/// children are only reached through [`crate::DriveService`].
#[derive(Debug, Clone)]
pub struct DriveNode {
    item: Arc<DriveItem>,
}

impl DriveNode {
    pub(crate) fn new(item: Arc<DriveItem>) -> Self {
        Self { item }
    }

    /// Node id (`drivewsid`), the arena key.
    pub fn id(&self) -> &str {
        &self.item.drive_id
    }

    /// Document id (`docwsid`), used for listing, download and upload.
    pub fn document_id(&self) -> &str {
        &self.item.document_id
    }

    pub fn parent_id(&self) -> &str {
        &self.item.parent_id
    }

    pub fn etag(&self) -> &str {
        &self.item.etag
    }

    /// Name with the extension joined when both are present.
    pub fn name(&self) -> String {
        full_name(&self.item)
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_wire(&self.item.item_type)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == NodeKind::Folder
    }

    /// Size in bytes; `None` when the service did not report one.
    pub fn size(&self) -> Option<i64> {
        self.item.size
    }

    pub fn status(&self) -> &str {
        &self.item.status
    }

    pub fn zone(&self) -> &str {
        &self.item.zone
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.item.created
    }

    pub fn changed(&self) -> Option<DateTime<Utc>> {
        self.item.changed
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.item.modified
    }

    pub fn last_opened(&self) -> Option<DateTime<Utc>> {
        self.item.last_opened
    }
}

pub(crate) fn full_name(item: &DriveItem) -> String {
    if !item.name.is_empty() && !item.extension.is_empty() {
        format!("{}.{}", item.name, item.extension)
    } else {
        item.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, ext: &str, item_type: &str) -> DriveNode {
        DriveNode::new(Arc::new(DriveItem {
            name: name.into(),
            extension: ext.into(),
            item_type: item_type.into(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_name_joins_extension() {
        assert_eq!(node("notes", "txt", "FILE").name(), "notes.txt");
        assert_eq!(node("Makefile", "", "FILE").name(), "Makefile");
        assert_eq!(node("", "txt", "FILE").name(), "");
    }

    #[test]
    fn test_kind() {
        assert!(node("Documents", "", "FOLDER").is_dir());
        assert!(node("Pages", "", "APP_LIBRARY").is_dir());
        assert_eq!(node("a", "txt", "FILE").kind(), NodeKind::File);
    }

    #[test]
    fn test_unknown_size_is_none() {
        assert_eq!(node("a", "txt", "FILE").size(), None);
    }
}
