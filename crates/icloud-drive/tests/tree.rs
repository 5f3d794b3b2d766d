//! Folder listing, caching, downloads and mutations.

mod common;

use common::{docs_listing, drive, root_listing, DOCWS, DRIVEWS};
use icloud_auth::testing::{ScriptedBackend, ScriptedResponse};
use icloud_auth::{AuthError, IcloudClient};
use icloud_drive::{DriveError, DriveService, NodeKind};
use icloud_storage::MemoryStorage;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn root_is_fetched_once_with_children() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));

    let root = drive.root().await.unwrap();
    let again = drive.root().await.unwrap();
    let names = drive.dir(&root).await.unwrap();

    assert_eq!(root.id(), again.id());
    assert_eq!(names, vec!["a.txt", "b.txt", "Docs"]);
    assert_eq!(backend.request_count(), 2);

    let listing = &backend.requests()[1];
    assert_eq!(
        listing.url,
        format!("{}/retrieveItemDetailsInFolders", DRIVEWS)
    );
    assert_eq!(
        listing.json_body(),
        json!([{"drivewsid": "FOLDER::com.apple.CloudDocs::root", "partialData": false}])
    );
}

#[tokio::test]
async fn children_are_cached_until_stale() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    backend.push(ScriptedResponse::json(200, docs_listing(&["one", "two"])));

    let root = drive.root().await.unwrap();
    let docs = drive.get(&root, "Docs").await.unwrap();
    assert_eq!(docs.kind(), NodeKind::Folder);

    let first = drive.dir(&docs).await.unwrap();
    let second = drive.dir(&docs).await.unwrap();
    assert_eq!(first, vec!["one.md", "two.md"]);
    assert_eq!(first, second);
    assert_eq!(backend.request_count(), 3);
    assert_eq!(
        backend.requests()[2].json_body()[0]["drivewsid"],
        "FOLDER::com.apple.CloudDocs::DOCS"
    );

    drive.stale(&docs);
    backend.push(ScriptedResponse::json(200, docs_listing(&["one", "two", "three"])));
    assert_eq!(drive.dir(&docs).await.unwrap().len(), 3);
    assert_eq!(backend.request_count(), 4);
}

#[tokio::test]
async fn app_library_is_listed_by_its_own_id() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(
        200,
        json!([{
            "drivewsid": "FOLDER::com.apple.CloudDocs::root",
            "docwsid": "root",
            "name": "root",
            "type": "FOLDER",
            "items": [{
                "drivewsid": "FOLDER::iCloud.com.apple.Pages::documents",
                "docwsid": "documents",
                "zone": "iCloud.com.apple.Pages",
                "name": "Pages",
                "type": "APP_LIBRARY"
            }]
        }]),
    ));
    backend.push(ScriptedResponse::json(
        200,
        json!([{
            "drivewsid": "FOLDER::iCloud.com.apple.Pages::documents",
            "docwsid": "documents",
            "name": "Pages",
            "type": "APP_LIBRARY",
            "items": []
        }]),
    ));

    let pages = drive.resolve("Pages").await.unwrap();
    assert!(pages.is_dir());
    assert!(drive.children(&pages).await.unwrap().is_empty());

    assert_eq!(
        backend.requests()[2].json_body(),
        json!([{"drivewsid": "FOLDER::iCloud.com.apple.Pages::documents", "partialData": false}])
    );
}

#[tokio::test]
async fn vanished_children_are_forgotten_after_relist() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    backend.push(ScriptedResponse::json(200, docs_listing(&["one", "two"])));
    backend.push(ScriptedResponse::json(200, docs_listing(&["one"])));

    let docs = drive.resolve("Docs").await.unwrap();
    assert_eq!(drive.dir(&docs).await.unwrap(), vec!["one.md", "two.md"]);

    drive.stale(&docs);
    assert_eq!(drive.dir(&docs).await.unwrap(), vec!["one.md"]);
    assert!(matches!(
        drive.get(&docs, "two.md").await,
        Err(DriveError::NotFound(_))
    ));
    assert_eq!(backend.request_count(), 4);
}

#[tokio::test]
async fn failed_listing_leaves_folder_unpopulated() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    backend.push(ScriptedResponse::text(503, "Service Unavailable"));
    backend.push(ScriptedResponse::json(200, docs_listing(&["one"])));

    let docs = drive.resolve("Docs").await.unwrap();
    let err = drive.dir(&docs).await.unwrap_err();
    assert!(matches!(err, DriveError::Auth(AuthError::Api(e)) if e.code == 503));

    assert_eq!(drive.dir(&docs).await.unwrap(), vec!["one.md"]);
    assert_eq!(backend.request_count(), 4);
}

#[tokio::test]
async fn missing_child_is_not_found() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));

    let root = drive.root().await.unwrap();
    let err = drive.get(&root, "missing.txt").await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(name) if name == "missing.txt"));

    // Matching is exact.
    assert!(drive.get(&root, "A.txt").await.is_err());
    assert!(drive.get(&root, "a").await.is_err());
}

#[tokio::test]
async fn resolve_walks_path() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    backend.push(ScriptedResponse::json(200, docs_listing(&["readme"])));

    let node = drive.resolve("/Docs/readme.md").await.unwrap();
    assert_eq!(node.name(), "readme.md");
    assert_eq!(node.size(), Some(10));

    let root = drive.resolve("").await.unwrap();
    assert!(root.is_dir());
}

#[tokio::test]
async fn files_have_no_children_and_folders_cannot_be_opened() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));

    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    assert!(matches!(
        drive.children(&file).await,
        Err(DriveError::NotDirectory(_))
    ));
    assert!(matches!(drive.open(&root).await, Err(DriveError::NotFile(_))));
}

#[tokio::test]
async fn empty_file_downloads_without_network() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let empty = drive.get(&root, "b.txt").await.unwrap();
    let calls = backend.request_count();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("b.txt");
    let written = drive.download(&empty, &path).await.unwrap();

    assert_eq!(written, 0);
    assert_eq!(std::fs::read(&path).unwrap(), b"");
    assert_eq!(backend.request_count(), calls);
}

#[tokio::test]
async fn download_fetches_content_url() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    backend.push(ScriptedResponse::json(
        200,
        json!({"document_id": "A", "data_token": {"url": "https://cvws.icloud-content.com/B/a.txt"}}),
    ));
    backend.push(ScriptedResponse::bytes(200, b"hello".to_vec()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    assert_eq!(drive.download(&file, &path).await.unwrap(), 5);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");

    let requests = backend.requests();
    assert_eq!(
        requests[2].url,
        format!("{}/ws/com.apple.CloudDocs/download/by_id?document_id=A", DOCWS)
    );
    assert_eq!(requests[3].url, "https://cvws.icloud-content.com/B/a.txt");
}

#[tokio::test]
async fn interrupted_download_closes_file_and_reports_read_error() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    backend.push(ScriptedResponse::json(
        200,
        json!({"document_id": "A", "data_token": {"url": "https://cvws.icloud-content.com/B/a.txt"}}),
    ));
    backend.push(ScriptedResponse::bytes(200, b"hel".to_vec()).interrupted());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    let err = drive.download(&file, &path).await.unwrap_err();

    assert!(matches!(err, DriveError::Auth(AuthError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset));
    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"hel");
}

#[tokio::test]
async fn download_without_token_url_fails() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    backend.push(ScriptedResponse::json(200, json!({"document_id": "A"})));
    assert!(matches!(
        drive.open(&file).await,
        Err(DriveError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn mutations_send_ids_and_do_not_touch_cache() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    backend.push(ScriptedResponse::json(200, json!({"items": []})));
    drive.delete(&file).await.unwrap();
    backend.push(ScriptedResponse::json(200, json!({"items": []})));
    drive.rename(&file, "c.txt").await.unwrap();
    backend.push(ScriptedResponse::json(200, json!({"folders": []})));
    drive.mkdir(&root, "New").await.unwrap();

    let requests = backend.requests();
    let trash = &requests[2];
    assert_eq!(trash.url, format!("{}/moveItemsToTrash", DRIVEWS));
    assert_eq!(
        trash.json_body(),
        json!({"items": [{"drivewsid": "FILE::com.apple.CloudDocs::A", "etag": "e-a", "clientId": "auth-test"}]})
    );

    let rename = &requests[3];
    assert_eq!(rename.url, format!("{}/renameItems", DRIVEWS));
    assert_eq!(rename.json_body()["items"][0]["name"], "c.txt");
    assert_eq!(rename.json_body()["items"][0]["etag"], "e-a");

    let mkdir = &requests[4];
    assert_eq!(mkdir.url, format!("{}/createFolders", DRIVEWS));
    assert_eq!(mkdir.header("Content-Type"), Some("text/plain"));
    assert_eq!(
        mkdir.json_body(),
        json!({
            "destinationDrivewsId": "FOLDER::com.apple.CloudDocs::root",
            "folders": [{"clientId": "auth-test", "name": "New"}]
        })
    );

    assert_eq!(
        drive.dir(&root).await.unwrap(),
        vec!["a.txt", "b.txt", "Docs"]
    );
    assert_eq!(backend.request_count(), 5);
}

#[tokio::test]
async fn etag_conflict_surfaces_as_api_error() {
    let (backend, drive) = drive().await;
    backend.push(ScriptedResponse::json(200, root_listing()));
    let root = drive.root().await.unwrap();
    let file = drive.get(&root, "a.txt").await.unwrap();

    backend.push(ScriptedResponse::json(
        409,
        json!({"errorCode": "ETAG_CONFLICT", "error": "ETAG_CONFLICT"}),
    ));
    let err = drive.rename(&file, "c.txt").await.unwrap_err();
    assert!(matches!(err, DriveError::Auth(AuthError::Api(e)) if e.reason == "ETAG_CONFLICT"));
}

#[tokio::test]
async fn drive_requires_both_services() {
    let backend = Arc::new(ScriptedBackend::new());
    let storage = Arc::new(MemoryStorage::new());
    let client = IcloudClient::new("user@example.com", "secret", backend, storage).unwrap();

    let err = DriveService::new(Arc::new(client)).err().unwrap();
    assert!(matches!(
        err,
        DriveError::Auth(AuthError::ServiceNotActive(name)) if name == "drivews"
    ));
}
