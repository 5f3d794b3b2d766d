//! File downloads.

use crate::node::DriveNode;
use crate::types::DownloadResult;
use crate::{DriveError, DriveResult, DriveService};
use icloud_auth::BodyStream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

impl DriveService {
    /// Open a file for reading.
    ///
    /// Files of unknown or zero size yield an empty stream without a network
    /// call; the service rejects download requests for empty documents.
    pub async fn open(&self, file: &DriveNode) -> DriveResult<BodyStream> {
        if file.is_dir() {
            return Err(DriveError::NotFile(file.name()));
        }
        if file.size().unwrap_or(0) <= 0 {
            debug!(name = %file.name(), "Empty file, nothing to fetch");
            return Ok(BodyStream::empty());
        }

        let url = format!(
            "{}/ws/com.apple.CloudDocs/download/by_id?document_id={}",
            self.doc_root,
            file.document_id()
        );
        let result: DownloadResult = self.client.get_json(&url).await?;
        let content_url = result
            .data_token
            .map(|token| token.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                DriveError::InvalidResponse(format!(
                    "no download url for document {}",
                    file.document_id()
                ))
            })?;

        Ok(self.client.get_stream(&content_url).await?)
    }

    /// Download a file to `path`, creating or truncating it.
    ///
    /// The destination is flushed and closed even when copying fails; the
    /// first error is the one reported.
    pub async fn download(&self, file: &DriveNode, path: impl AsRef<Path>) -> DriveResult<u64> {
        let path = path.as_ref();
        let mut stream = self.open(file).await?;
        let mut out = File::create(path)
            .await
            .map_err(|e| DriveError::io(path, e))?;

        let copied = copy_to_file(&mut stream, &mut out, path).await;
        let closed = out.shutdown().await.map_err(|e| DriveError::io(path, e));
        drop(out);

        let written = copied?;
        closed?;
        info!(name = %file.name(), path = %path.display(), bytes = written, "Downloaded");
        Ok(written)
    }
}

async fn copy_to_file(stream: &mut BodyStream, out: &mut File, path: &Path) -> DriveResult<u64> {
    let mut written = 0u64;
    while let Some(chunk) = stream.chunk().await? {
        out.write_all(&chunk)
            .await
            .map_err(|e| DriveError::io(path, e))?;
        written += chunk.len() as u64;
    }
    Ok(written)
}
