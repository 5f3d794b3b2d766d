//! Shared fixtures: an authenticated client over a scripted backend.

#![allow(dead_code)]

use icloud_auth::testing::{ScriptedBackend, ScriptedResponse};
use icloud_auth::IcloudClient;
use icloud_drive::DriveService;
use icloud_storage::{MemoryStorage, SessionData};
use serde_json::{json, Value};
use std::sync::Arc;

pub const DRIVEWS: &str = "https://p01-drivews.icloud.com";
pub const DOCWS: &str = "https://p01-docws.icloud.com";
pub const UPLOAD_TOKEN: &str = "AQAAAABk==~abc";

pub fn account() -> Value {
    json!({
        "dsInfo": {"hsaVersion": 2, "dsid": "1234"},
        "hsaTrustedBrowser": true,
        "webservices": {
            "drivews": {"url": DRIVEWS, "status": "active"},
            "docws": {"url": DOCWS, "status": "active"}
        }
    })
}

pub fn root_listing() -> Value {
    json!([{
        "drivewsid": "FOLDER::com.apple.CloudDocs::root",
        "docwsid": "root",
        "name": "root",
        "type": "FOLDER",
        "etag": "1",
        "items": [
            {"drivewsid": "FILE::com.apple.CloudDocs::A", "docwsid": "A", "parentId": "FOLDER::com.apple.CloudDocs::root",
             "name": "a", "extension": "txt", "type": "FILE", "size": 5, "etag": "e-a"},
            {"drivewsid": "FILE::com.apple.CloudDocs::B", "docwsid": "B", "parentId": "FOLDER::com.apple.CloudDocs::root",
             "name": "b", "extension": "txt", "type": "FILE", "size": 0, "etag": "e-b"},
            {"drivewsid": "FOLDER::com.apple.CloudDocs::DOCS", "docwsid": "DOCS", "parentId": "FOLDER::com.apple.CloudDocs::root",
             "name": "Docs", "type": "FOLDER", "etag": "e-docs"}
        ]
    }])
}

pub fn docs_listing(names: &[&str]) -> Value {
    let items: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "drivewsid": format!("FILE::com.apple.CloudDocs::D{}", i),
                "docwsid": format!("D{}", i),
                "name": name,
                "extension": "md",
                "type": "FILE",
                "size": 10
            })
        })
        .collect();
    json!([{
        "drivewsid": "FOLDER::com.apple.CloudDocs::DOCS",
        "docwsid": "DOCS",
        "name": "Docs",
        "type": "FOLDER",
        "items": items
    }])
}

/// Client authenticated through a stored token, with the upload cookie set.
pub async fn drive() -> (Arc<ScriptedBackend>, DriveService) {
    let backend = Arc::new(ScriptedBackend::new());
    let storage = Arc::new(MemoryStorage::with_session(SessionData {
        client_id: "auth-test".to_string(),
        session_token: "token".to_string(),
        ..Default::default()
    }));
    let client = IcloudClient::new("user@example.com", "secret", backend.clone(), storage).unwrap();

    backend.push(ScriptedResponse::json(200, account()).with_header(
        "Set-Cookie",
        &format!(
            "X-APPLE-WEBAUTH-VALIDATE=\"v=1:t={}\"; Domain=icloud.com; Path=/; Secure",
            UPLOAD_TOKEN
        ),
    ));
    client.authenticate(false, None).await.unwrap();

    let drive = DriveService::new(Arc::new(client)).unwrap();
    (backend, drive)
}

/// Like [`drive`] but without the upload cookie.
pub async fn drive_without_cookie() -> (Arc<ScriptedBackend>, DriveService) {
    let backend = Arc::new(ScriptedBackend::new());
    let storage = Arc::new(MemoryStorage::with_session(SessionData {
        session_token: "token".to_string(),
        ..Default::default()
    }));
    let client = IcloudClient::new("user@example.com", "secret", backend.clone(), storage).unwrap();
    backend.push(ScriptedResponse::json(200, account()));
    client.authenticate(false, None).await.unwrap();

    let drive = DriveService::new(Arc::new(client)).unwrap();
    (backend, drive)
}
