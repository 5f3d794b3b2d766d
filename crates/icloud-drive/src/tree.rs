//! Lazily populated view of the Drive folder tree.
//!
//! Nodes live in an arena keyed by node id. A folder's child list is `None`
//! until it is first listed; after that it is served from the arena until
//! [`DriveService::stale`] drops it. Mutations never touch the arena.

use crate::node::DriveNode;
use crate::types::DriveItem;
use crate::{DriveError, DriveResult};
use icloud_auth::{Body, IcloudClient};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Prefix of folder node ids in the CloudDocs zone.
const FOLDER_PREFIX: &str = "FOLDER::com.apple.CloudDocs::";
/// Document id that names the Drive root.
const ROOT_DOCUMENT: &str = "root";
/// Extracts the upload token from the `X-APPLE-WEBAUTH-VALIDATE` cookie.
const UPLOAD_TOKEN_PATTERN: &str = r"\bt=([^:]+)";

struct NodeEntry {
    item: Arc<DriveItem>,
    children: Option<Vec<String>>,
    /// Child ids of the last listing, kept after `stale` so a relist can
    /// drop the ones that are gone.
    previous: Vec<String>,
}

#[derive(Default)]
struct NodeArena {
    root: Option<String>,
    entries: HashMap<String, NodeEntry>,
}

impl NodeArena {
    fn node(&self, id: &str) -> Option<DriveNode> {
        self.entries
            .get(id)
            .map(|entry| DriveNode::new(Arc::clone(&entry.item)))
    }

    fn children(&self, id: &str) -> Option<Vec<DriveNode>> {
        let ids = self.entries.get(id)?.children.as_ref()?;
        Some(ids.iter().filter_map(|child| self.node(child)).collect())
    }

    /// Record a folder listing under `id`, replacing its item and child list.
    /// Already known children keep their own cached listings; children that
    /// are no longer listed are dropped with everything below them.
    fn store_listing(&mut self, id: &str, mut item: DriveItem) -> Vec<DriveNode> {
        let previous = self
            .entries
            .get_mut(id)
            .map(|entry| {
                entry
                    .children
                    .take()
                    .unwrap_or_else(|| std::mem::take(&mut entry.previous))
            })
            .unwrap_or_default();
        let items = std::mem::take(&mut item.items);
        let mut ids = Vec::with_capacity(items.len());

        for mut child in items {
            child.items.clear();
            let child_id = child.drive_id.clone();
            let child = Arc::new(child);
            match self.entries.get_mut(&child_id) {
                Some(entry) => entry.item = child,
                None => {
                    self.entries.insert(
                        child_id.clone(),
                        NodeEntry {
                            item: child,
                            children: None,
                            previous: Vec::new(),
                        },
                    );
                }
            }
            ids.push(child_id);
        }

        let vanished: Vec<String> = previous
            .into_iter()
            .filter(|old| !ids.contains(old))
            .collect();
        self.entries.insert(
            id.to_string(),
            NodeEntry {
                item: Arc::new(item),
                children: Some(ids),
                previous: Vec::new(),
            },
        );
        self.forget(vanished);
        self.children(id).unwrap_or_default()
    }

    /// Remove nodes no folder lists any more, then their descendants.
    fn forget(&mut self, ids: Vec<String>) {
        let mut pending = ids;
        while let Some(id) = pending.pop() {
            let listed = self.root.as_deref() == Some(id.as_str())
                || self
                    .entries
                    .values()
                    .any(|entry| entry.children.as_ref().is_some_and(|c| c.contains(&id)));
            if listed {
                continue;
            }
            if let Some(entry) = self.entries.remove(&id) {
                pending.extend(entry.children.into_iter().flatten());
                pending.extend(entry.previous);
            }
        }
    }

    fn mark_stale(&mut self, id: &str) {
        if let Some(entry) = self.entries.get_mut(id) {
            if let Some(children) = entry.children.take() {
                entry.previous = children;
            }
        }
    }
}

/// The iCloud Drive service for one authenticated client.
pub struct DriveService {
    pub(crate) client: Arc<IcloudClient>,
    pub(crate) svc_root: String,
    pub(crate) doc_root: String,
    pub(crate) token_pattern: Regex,
    nodes: Mutex<NodeArena>,
}

impl DriveService {
    /// Resolve the drivews and docws roots from the account snapshot.
    pub fn new(client: Arc<IcloudClient>) -> DriveResult<Self> {
        let svc_root = client.webservice_url("drivews")?;
        let doc_root = client.webservice_url("docws")?;
        debug!(svc_root = %svc_root, doc_root = %doc_root, "Drive service roots");

        Ok(Self {
            client,
            svc_root,
            doc_root,
            token_pattern: Regex::new(UPLOAD_TOKEN_PATTERN)?,
            nodes: Mutex::new(NodeArena::default()),
        })
    }

    pub fn client(&self) -> &IcloudClient {
        &self.client
    }

    /// The root folder, fetched once and then served from memory.
    pub async fn root(&self) -> DriveResult<DriveNode> {
        {
            let nodes = lock(&self.nodes);
            if let Some(root) = nodes.root.as_deref().and_then(|id| nodes.node(id)) {
                return Ok(root);
            }
        }

        let root_id = format!("{}{}", FOLDER_PREFIX, ROOT_DOCUMENT);
        let item = self.fetch_folder(&root_id).await?;
        let id = if item.drive_id.is_empty() {
            root_id
        } else {
            item.drive_id.clone()
        };

        let mut nodes = lock(&self.nodes);
        nodes.store_listing(&id, item);
        nodes.root = Some(id.clone());
        nodes
            .node(&id)
            .ok_or_else(|| DriveError::InvalidResponse("root folder missing".to_string()))
    }

    /// Children of a folder. The first call lists the folder; later calls
    /// return the cached list until the folder is marked stale.
    pub async fn children(&self, folder: &DriveNode) -> DriveResult<Vec<DriveNode>> {
        if !folder.is_dir() {
            return Err(DriveError::NotDirectory(folder.name()));
        }
        let cached = lock(&self.nodes).children(folder.id());
        if let Some(children) = cached {
            return Ok(children);
        }

        let item = self.fetch_folder(folder.id()).await?;
        let children = lock(&self.nodes).store_listing(folder.id(), item);
        debug!(folder = %folder.name(), count = children.len(), "Listed folder");
        Ok(children)
    }

    /// Names of a folder's children.
    pub async fn dir(&self, folder: &DriveNode) -> DriveResult<Vec<String>> {
        Ok(self
            .children(folder)
            .await?
            .iter()
            .map(DriveNode::name)
            .collect())
    }

    /// Child of `folder` whose full name matches `name` exactly.
    pub async fn get(&self, folder: &DriveNode, name: &str) -> DriveResult<DriveNode> {
        self.children(folder)
            .await?
            .into_iter()
            .find(|child| child.name() == name)
            .ok_or_else(|| DriveError::NotFound(name.to_string()))
    }

    /// Walk a `/`-separated path from the root. An empty path is the root.
    pub async fn resolve(&self, path: &str) -> DriveResult<DriveNode> {
        let mut node = self.root().await?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            node = self.get(&node, component).await?;
        }
        Ok(node)
    }

    /// Drop the cached child list so the next `children` call refetches.
    pub fn stale(&self, node: &DriveNode) {
        lock(&self.nodes).mark_stale(node.id());
    }

    /// Move a node to the trash.
    pub async fn delete(&self, node: &DriveNode) -> DriveResult<()> {
        let body = json!({
            "items": [{
                "drivewsid": node.id(),
                "etag": node.etag(),
                "clientId": self.client.client_id(),
            }]
        });
        self.client
            .post(
                &format!("{}/moveItemsToTrash", self.svc_root),
                Body::Json(body),
                &[],
            )
            .await?;
        info!(name = %node.name(), "Moved to trash");
        Ok(())
    }

    pub async fn rename(&self, node: &DriveNode, name: &str) -> DriveResult<()> {
        let body = json!({
            "items": [{
                "drivewsid": node.id(),
                "etag": node.etag(),
                "name": name,
            }]
        });
        self.client
            .post(&format!("{}/renameItems", self.svc_root), Body::Json(body), &[])
            .await?;
        info!(from = %node.name(), to = %name, "Renamed");
        Ok(())
    }

    /// Create a folder named `name` inside `parent`.
    pub async fn mkdir(&self, parent: &DriveNode, name: &str) -> DriveResult<()> {
        if !parent.is_dir() {
            return Err(DriveError::NotDirectory(parent.name()));
        }
        let body = json!({
            "destinationDrivewsId": parent.id(),
            "folders": [{
                "clientId": self.client.client_id(),
                "name": name,
            }]
        });
        self.client
            .post(
                &format!("{}/createFolders", self.svc_root),
                Body::Json(body),
                &[("Content-Type", "text/plain")],
            )
            .await?;
        info!(parent = %parent.name(), name = %name, "Created folder");
        Ok(())
    }

    /// List one folder by its node id. App libraries live outside the
    /// CloudDocs zone, so the id is sent as the node carries it.
    async fn fetch_folder(&self, drive_id: &str) -> DriveResult<DriveItem> {
        let body = json!([{
            "drivewsid": drive_id,
            "partialData": false,
        }]);
        let listing: Vec<DriveItem> = self
            .client
            .post_json(
                &format!("{}/retrieveItemDetailsInFolders", self.svc_root),
                Body::Json(body),
                &[],
            )
            .await?;

        listing
            .into_iter()
            .next()
            .ok_or_else(|| DriveError::InvalidResponse("invalid node data".to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, children: Vec<DriveItem>) -> DriveItem {
        DriveItem {
            drive_id: id.into(),
            name: name.into(),
            item_type: "FOLDER".into(),
            items: children,
            ..Default::default()
        }
    }

    #[test]
    fn test_store_listing_populates_children() {
        let mut arena = NodeArena::default();
        let children = arena.store_listing(
            "root",
            item("root", "", vec![item("a", "A", vec![]), item("b", "B", vec![])]),
        );

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id(), "a");
        assert!(arena.children("root").is_some());
        assert!(arena.children("a").is_none());
    }

    #[test]
    fn test_relisting_keeps_grandchildren() {
        let mut arena = NodeArena::default();
        arena.store_listing("root", item("root", "", vec![item("a", "A", vec![])]));
        arena.store_listing("a", item("a", "A", vec![item("c", "C", vec![])]));
        arena.store_listing("root", item("root", "", vec![item("a", "A2", vec![])]));

        assert_eq!(arena.node("a").unwrap().name(), "A2");
        assert_eq!(arena.children("a").unwrap()[0].id(), "c");
    }

    #[test]
    fn test_relist_after_stale_drops_vanished_subtree() {
        let mut arena = NodeArena::default();
        arena.root = Some("root".into());
        arena.store_listing(
            "root",
            item("root", "", vec![item("a", "A", vec![]), item("b", "B", vec![])]),
        );
        arena.store_listing("a", item("a", "A", vec![item("c", "C", vec![])]));

        arena.mark_stale("root");
        assert!(arena.children("root").is_none());
        assert!(arena.node("a").is_some());

        arena.store_listing("root", item("root", "", vec![item("b", "B", vec![])]));

        assert!(arena.node("a").is_none());
        assert!(arena.node("c").is_none());
        assert!(arena.node("b").is_some());
        assert_eq!(arena.entries.len(), 2);
    }

    #[test]
    fn test_moved_child_is_kept() {
        let mut arena = NodeArena::default();
        arena.store_listing(
            "root",
            item("root", "", vec![item("a", "A", vec![]), item("x", "X", vec![])]),
        );
        arena.store_listing("a", item("a", "A", vec![]));

        // x moved into a; a is relisted first, then root.
        arena.mark_stale("a");
        arena.store_listing("a", item("a", "A", vec![item("x", "X", vec![])]));
        arena.mark_stale("root");
        arena.store_listing("root", item("root", "", vec![item("a", "A", vec![])]));

        assert!(arena.node("x").is_some());
        assert_eq!(arena.children("a").unwrap()[0].id(), "x");
    }
}
