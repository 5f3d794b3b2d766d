//! Wire types for the drivews and docws services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file or folder as returned by `retrieveItemDetailsInFolders`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    /// Absent for folders and for files whose size is unknown.
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default, rename = "dateCreated")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, rename = "dateChanged")]
    pub changed: Option<DateTime<Utc>>,
    #[serde(default, rename = "dateModified")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, rename = "lastOpenTime")]
    pub last_opened: Option<DateTime<Utc>>,
    #[serde(default, rename = "docwsid")]
    pub document_id: String,
    #[serde(default, rename = "drivewsid")]
    pub drive_id: String,
    #[serde(default, rename = "parentId")]
    pub parent_id: String,
    #[serde(default)]
    pub etag: String,
    /// Children, present on folder listings only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<DriveItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DownloadResult {
    #[serde(default)]
    pub data_token: Option<DataToken>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DataToken {
    #[serde(default)]
    pub url: String,
}

/// One entry of the `upload/web` response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadSlot {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadedContent {
    #[serde(default)]
    pub single_file: SingleFile,
}

/// Checksums and keys of content posted to the content host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleFile {
    #[serde(default)]
    pub file_checksum: String,
    #[serde(default)]
    pub reference_checksum: String,
    #[serde(default)]
    pub receipt: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub wrapping_key: String,
}
