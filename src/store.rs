// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The node store collaborator.
//!
//! [`NodeStore`] is the narrow slice of the Kubernetes API that node utilities need.
//! [`KubeNodeStore`] talks to a real API server through `kube::Api<Node>`; tests use
//! [`FakeNodeStore`](crate::testutil::FakeNodeStore), which keeps nodes in memory.

use crate::errors::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Value};
use tracing::debug;

/// Filter applied to `list` and `watch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Equality-based label selector, e.g. `node-role.kubernetes.io/worker,zone!=a`
    pub label_selector: Option<String>,
}

impl ListFilter {
    /// A filter that matches nodes selected by `selector`.
    #[must_use]
    pub fn labels(selector: &str) -> Self {
        Self {
            label_selector: Some(selector.to_string()),
        }
    }
}

/// A change observed by [`NodeStore::watch`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The node was created or modified
    Applied(Node),
    /// The node was deleted
    Deleted(Node),
}

impl NodeEvent {
    /// The node this event is about.
    #[must_use]
    pub fn node(&self) -> &Node {
        match self {
            Self::Applied(node) | Self::Deleted(node) => node,
        }
    }
}

/// The store calls a retried operation can wrap.
///
/// Used as the `operation` metric label, so the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `update_status`
    UpdateStatus,
    /// `patch_status`
    PatchStatus,
    /// `delete`
    Delete,
}

impl StoreOperation {
    /// The metric label value for this operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateStatus => "update_status",
            Self::PatchStatus => "patch_status",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations on cluster `Node` objects.
///
/// Implementations own their synchronization; every method may be called
/// concurrently.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a node by name.
    async fn get(&self, name: &str) -> Result<Node, StoreError>;

    /// List nodes matching `filter`.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Node>, StoreError>;

    /// Create a node.
    async fn create(&self, node: &Node) -> Result<Node, StoreError>;

    /// Replace a node. A set `metadata.resourceVersion` makes the write conditional.
    async fn update(&self, node: &Node) -> Result<Node, StoreError>;

    /// Write a node's status. A set `metadata.resourceVersion` makes the write conditional.
    async fn update_status(&self, node: &Node) -> Result<Node, StoreError>;

    /// Apply a strategic merge patch to the status of the named node.
    ///
    /// The body is the document built by
    /// [`create_status_patch`](crate::patch::create_status_patch): `conditions` and
    /// `addresses` merge entry by entry keyed by `type`, other fields follow JSON merge
    /// patch rules. A `metadata.resourceVersion` in the body makes the write conditional.
    async fn patch_status(&self, name: &str, patch: &[u8]) -> Result<Node, StoreError>;

    /// Delete a node.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Stream changes to nodes matching `filter`.
    fn watch(&self, filter: &ListFilter) -> BoxStream<'static, Result<NodeEvent, StoreError>>;
}

/// [`NodeStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeNodeStore {
    api: Api<Node>,
}

impl KubeNodeStore {
    /// Create a store for cluster-scoped `Node` objects.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

fn list_params(filter: &ListFilter) -> ListParams {
    match &filter.label_selector {
        Some(selector) => ListParams::default().labels(selector),
        None => ListParams::default(),
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    async fn get(&self, name: &str) -> Result<Node, StoreError> {
        self.api
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, name))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Node>, StoreError> {
        let nodes = self
            .api
            .list(&list_params(filter))
            .await
            .map_err(|e| StoreError::from_kube(e, ""))?;
        debug!(count = nodes.items.len(), "Listed nodes");
        Ok(nodes.items)
    }

    async fn create(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        self.api
            .create(&PostParams::default(), node)
            .await
            .map_err(|e| StoreError::from_kube(e, &name))
    }

    async fn update(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        self.api
            .replace(&name, &PostParams::default(), node)
            .await
            .map_err(|e| StoreError::from_kube(e, &name))
    }

    async fn update_status(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        let mut body = json!({ "status": node.status });
        if let Some(version) = node.resource_version() {
            body["metadata"] = json!({ "resourceVersion": version });
        }
        self.api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(|e| StoreError::from_kube(e, &name))
    }

    async fn patch_status(&self, name: &str, patch: &[u8]) -> Result<Node, StoreError> {
        let body: Value = serde_json::from_slice(patch).map_err(|e| StoreError::InvalidPatch {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.api
            .patch_status(name, &PatchParams::default(), &Patch::Strategic(&body))
            .await
            .map_err(|e| StoreError::from_kube(e, name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(e, name))
    }

    fn watch(&self, filter: &ListFilter) -> BoxStream<'static, Result<NodeEvent, StoreError>> {
        let config = match &filter.label_selector {
            Some(selector) => watcher::Config::default().labels(selector),
            None => watcher::Config::default(),
        };

        watcher(self.api.clone(), config)
            .filter_map(|event| {
                future::ready(match event {
                    Ok(watcher::Event::Apply(node) | watcher::Event::InitApply(node)) => {
                        Some(Ok(NodeEvent::Applied(node)))
                    }
                    Ok(watcher::Event::Delete(node)) => Some(Ok(NodeEvent::Deleted(node))),
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(StoreError::Unavailable(e.to_string()))),
                })
            })
            .boxed()
    }
}
