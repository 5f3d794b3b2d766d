//! Two-phase uploads: stage content, then commit the document.
//!
//! There is no compensation between the phases. If the commit fails, the
//! staged content is left orphaned on the server and the whole upload has
//! to be retried from the start.

use crate::node::DriveNode;
use crate::types::{SingleFile, UploadSlot, UploadedContent};
use crate::{DriveError, DriveResult, DriveService};
use chrono::{DateTime, Utc};
use icloud_auth::{Body, MultipartFile, Payload};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Cookie whose value carries the upload token.
const VALIDATE_COOKIE: &str = "X-APPLE-WEBAUTH-VALIDATE";
/// Host the validate cookie is scoped to.
const VALIDATE_COOKIE_URL: &str = "https://icloud.com";

/// Server-side placeholder produced by staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStaging {
    pub document_id: String,
    pub content_url: String,
    pub folder_id: String,
}

/// A committed upload.
#[derive(Debug, Clone)]
pub struct CommittedUpload {
    pub document_id: String,
    /// Raw commit response.
    pub response: Value,
}

impl DriveService {
    /// Upload a local file into `folder`, keeping its name and mtime.
    pub async fn upload(
        &self,
        folder: &DriveNode,
        path: impl AsRef<Path>,
    ) -> DriveResult<CommittedUpload> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DriveError::io(path, e))?;
        let metadata = file.metadata().await.map_err(|e| DriveError::io(path, e))?;
        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::NotFile(path.display().to_string()))?;

        self.put_stream(folder, file, &name, metadata.len() as i64, mtime)
            .await
    }

    /// Upload `size` bytes read from `source` as `name` inside `folder`.
    ///
    /// The source is read in full before anything is staged and must yield
    /// exactly `size` bytes. A failed commit leaves the staged content orphaned; retry the whole
    /// call.
    pub async fn put_stream<R>(
        &self,
        folder: &DriveNode,
        mut source: R,
        name: &str,
        size: i64,
        mtime: DateTime<Utc>,
    ) -> DriveResult<CommittedUpload>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !folder.is_dir() {
            return Err(DriveError::NotDirectory(folder.name()));
        }
        let content = read_exact_size(&mut source, name, size).await?;
        drop(source);

        let content_type = mime_guess::from_path(name)
            .first()
            .map(|mime| mime.essence_str().to_string());
        let staging = self
            .stage(folder, name, content_type.as_deref().unwrap_or(""), size)
            .await?;

        let uploaded = self
            .send_content(&staging, name, content_type, content)
            .await?;
        self.commit(&staging, &uploaded, name, mtime).await
    }

    /// Reserve a document and a content URL for a new file.
    pub async fn stage(
        &self,
        folder: &DriveNode,
        name: &str,
        content_type: &str,
        size: i64,
    ) -> DriveResult<UploadStaging> {
        let token = self.upload_token()?;
        let url = format!(
            "{}/ws/com.apple.CloudDocs/upload/web?token={}",
            self.doc_root, token
        );
        let body = json!({
            "filename": name,
            "type": "FILE",
            "content_type": content_type,
            "size": size,
        });

        let slots: Vec<UploadSlot> = self
            .client
            .post_json(&url, Body::Json(body), &[("Content-Type", "text/plain")])
            .await?;
        let slot = slots.into_iter().next().unwrap_or_default();
        if slot.document_id.is_empty() || slot.url.is_empty() {
            return Err(DriveError::InvalidResponse("invalid content url".to_string()));
        }

        debug!(name, document_id = %slot.document_id, "Staged upload");
        Ok(UploadStaging {
            document_id: slot.document_id,
            content_url: slot.url,
            folder_id: folder.document_id().to_string(),
        })
    }

    async fn send_content(
        &self,
        staging: &UploadStaging,
        name: &str,
        content_type: Option<String>,
        content: Vec<u8>,
    ) -> DriveResult<SingleFile> {
        let file = MultipartFile {
            field_name: name.to_string(),
            file_name: name.to_string(),
            mime_type: content_type,
            content: content.into(),
        };
        let uploaded: UploadedContent = self
            .client
            .post_json(&staging.content_url, Body::Multipart(file), &[])
            .await?;
        Ok(uploaded.single_file)
    }

    /// Attach staged content to a new document in the staging folder.
    pub async fn commit(
        &self,
        staging: &UploadStaging,
        uploaded: &SingleFile,
        name: &str,
        mtime: DateTime<Utc>,
    ) -> DriveResult<CommittedUpload> {
        let mut data = json!({
            "signature": uploaded.file_checksum,
            "wrapping_key": uploaded.wrapping_key,
            "reference_signature": uploaded.reference_checksum,
            "size": uploaded.size,
        });
        // Empty files come back without a receipt.
        if !uploaded.receipt.is_empty() {
            data["receipt"] = json!(uploaded.receipt);
        }
        let millis = mtime.timestamp_millis();
        let body = json!({
            "data": data,
            "command": "add_file",
            "create_short_guid": true,
            "document_id": staging.document_id,
            "path": {
                "starting_document_id": staging.folder_id,
                "path": name,
            },
            "allow_conflict": true,
            "file_flags": {
                "is_writable": true,
                "is_executable": false,
                "is_hidden": false,
            },
            "mtime": millis,
            "btime": millis,
        });

        let payload = self
            .client
            .post_payload(
                &format!("{}/ws/com.apple.CloudDocs/update/documents", self.doc_root),
                Body::Json(body),
                &[("Content-Type", "text/plain")],
            )
            .await?;
        let response = match payload {
            Payload::Json(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            _ => Value::Null,
        };

        info!(name, document_id = %staging.document_id, "Upload committed");
        Ok(CommittedUpload {
            document_id: staging.document_id.clone(),
            response,
        })
    }

    /// Token for the upload endpoint, taken from the validate cookie.
    pub(crate) fn upload_token(&self) -> DriveResult<String> {
        let cookie = self
            .client
            .cookie_value(VALIDATE_COOKIE_URL, VALIDATE_COOKIE)?
            .ok_or(DriveError::UploadToken)?;
        self.token_pattern
            .captures(&cookie)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(DriveError::UploadToken)
    }
}

/// Read `source` to the end, growing the buffer as data arrives. Reads stop
/// one byte past `size` so an oversized source is caught without buffering it.
async fn read_exact_size<R>(source: &mut R, name: &str, size: i64) -> DriveResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let declared = u64::try_from(size).map_err(|_| DriveError::SizeMismatch {
        name: name.to_string(),
        declared: size,
        actual: 0,
    })?;

    let mut content = Vec::new();
    source
        .take(declared.saturating_add(1))
        .read_to_end(&mut content)
        .await
        .map_err(|e| DriveError::io(name, e))?;

    let actual = content.len() as u64;
    if actual != declared {
        return Err(DriveError::SizeMismatch {
            name: name.to_string(),
            declared: size,
            actual,
        });
    }
    Ok(content)
}
