// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory test doubles for node controllers.
//!
//! - [`FakeNodeStore`] stands in for the API server's node endpoints.
//! - [`FakeRecorder`] captures events instead of publishing them.
//! - [`new_node`] and [`new_pod`] build minimal fixtures.
//!
//! # Store Layers
//!
//! The fake keeps nodes in three layers indexed by name. A lookup returns the first
//! hit in precedence order, skipping names that have been deleted:
//!
//! 1. `updated` - nodes written by `update`, `update_status` or `patch_status`
//! 2. `existing` - nodes the store was seeded with
//! 3. `created` - nodes added by `create`
//!
//! Every operation takes the same mutex, so each call is linearizable, but a
//! read-then-write across two calls is not atomic. Watch events are published
//! under that mutex, so watchers see writes in resource-version order. Writes that carry a
//! `metadata.resourceVersion` are rejected with [`StoreError::Conflict`] when it no
//! longer matches, just like the real API server.
//!
//! # Example
//!
//! ```rust
//! use nodeutil::store::NodeStore;
//! use nodeutil::testutil::{new_node, FakeNodeStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = FakeNodeStore::new(vec![new_node("node0")]);
//! let node = store.get("node0").await.unwrap();
//! assert_eq!(node.metadata.name.as_deref(), Some("node0"));
//! assert_eq!(store.request_count(), 1);
//! # }
//! ```

use crate::address::get_zone_key;
use crate::constants::{DEFAULT_EVENT_NAMESPACE, FAKE_RECORDER_COMPONENT, WATCH_CHANNEL_CAPACITY};
use crate::errors::StoreError;
use crate::events::{event_type_name, EventRecorder};
use crate::patch::apply_status_patch;
use crate::selector::matches_selector;
use crate::store::{ListFilter, NodeEvent, NodeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::{
    Node, NodeSpec, NodeStatus, ObjectReference, Pod, PodCondition, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Decides whether a `create` is accepted.
pub type CreateHook = Box<dyn Fn(&Node) -> bool + Send + Sync>;

#[derive(Default)]
struct FakeState {
    existing: BTreeMap<String, Node>,
    created: BTreeMap<String, Node>,
    updated: BTreeMap<String, Node>,
    deleted: BTreeSet<String>,

    created_log: Vec<Node>,
    updated_status_log: Vec<Node>,
    deleted_log: Vec<Node>,
    patch_log: Vec<(String, Value)>,

    request_count: usize,
    resource_version: u64,
}

impl FakeState {
    fn live(&self, name: &str) -> Option<&Node> {
        if self.deleted.contains(name) {
            return None;
        }
        self.updated
            .get(name)
            .or_else(|| self.existing.get(name))
            .or_else(|| self.created.get(name))
    }

    fn live_or_not_found(&self, name: &str) -> Result<Node, StoreError> {
        self.live(name).cloned().ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Reject a write whose precondition version is stale.
    fn check_version(&self, name: &str, stored: &Node, expected: Option<&str>) -> Result<(), StoreError> {
        match expected {
            Some(expected) if !expected.is_empty() => {
                let current = stored.metadata.resource_version.as_deref().unwrap_or_default();
                if current == expected {
                    Ok(())
                } else {
                    Err(StoreError::Conflict {
                        name: name.to_string(),
                        message: format!(
                            "the object has been modified; resourceVersion {expected} is stale, current is {current}"
                        ),
                    })
                }
            }
            _ => Ok(()),
        }
    }

    /// Stamp a new resource version on `node` and make it the visible copy.
    fn store_updated(&mut self, name: &str, mut node: Node) -> Node {
        node.metadata.resource_version = Some(self.next_resource_version());
        self.updated.insert(name.to_string(), node.clone());
        node
    }

    fn names(&self) -> BTreeSet<String> {
        self.updated
            .keys()
            .chain(self.existing.keys())
            .chain(self.created.keys())
            .filter(|name| !self.deleted.contains(*name))
            .cloned()
            .collect()
    }
}

/// In-memory [`NodeStore`].
pub struct FakeNodeStore {
    state: Mutex<FakeState>,
    create_hook: Option<CreateHook>,
    delete_notifier: Option<mpsc::UnboundedSender<String>>,
    events: broadcast::Sender<NodeEvent>,
}

impl FakeNodeStore {
    /// Create a store seeded with `existing` nodes.
    ///
    /// Seeded nodes without a resource version get one.
    #[must_use]
    pub fn new(existing: Vec<Node>) -> Self {
        let mut state = FakeState::default();
        for mut node in existing {
            if node.metadata.resource_version.is_none() {
                node.metadata.resource_version = Some(state.next_resource_version());
            }
            state.existing.insert(node.name_any(), node);
        }
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);

        Self {
            state: Mutex::new(state),
            create_hook: None,
            delete_notifier: None,
            events,
        }
    }

    /// Accept or refuse each `create` with `hook`.
    #[must_use]
    pub fn with_create_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.create_hook = Some(Box::new(hook));
        self
    }

    /// Send the name of every deleted node to `notifier`.
    #[must_use]
    pub fn with_delete_notifier(mut self, notifier: mpsc::UnboundedSender<String>) -> Self {
        self.delete_notifier = Some(notifier);
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state and count the request.
    fn begin(&self) -> MutexGuard<'_, FakeState> {
        let mut state = self.lock();
        state.request_count += 1;
        state
    }

    /// Publish a watch event. Callers hold the state guard so events leave in
    /// resource-version order.
    fn emit(&self, event: NodeEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Nodes accepted by `create`, in call order.
    #[must_use]
    pub fn created_nodes(&self) -> Vec<Node> {
        self.lock().created_log.clone()
    }

    /// The current `updated` layer, sorted by name.
    #[must_use]
    pub fn updated_nodes(&self) -> Vec<Node> {
        self.lock().updated.values().cloned().collect()
    }

    /// Nodes returned by `update_status`, in call order.
    #[must_use]
    pub fn updated_node_statuses(&self) -> Vec<Node> {
        self.lock().updated_status_log.clone()
    }

    /// Nodes removed by `delete`, in call order.
    #[must_use]
    pub fn deleted_nodes(&self) -> Vec<Node> {
        self.lock().deleted_log.clone()
    }

    /// `(name, patch)` for every successful `patch_status`, in call order.
    #[must_use]
    pub fn patched_statuses(&self) -> Vec<(String, Value)> {
        self.lock().patch_log.clone()
    }

    /// Number of store operations served, successful or not. Watches are not counted.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().request_count
    }

    /// Sorted, de-duplicated zone keys of all live nodes.
    ///
    /// Nodes without topology labels contribute the empty key.
    #[must_use]
    pub fn zones(&self) -> Vec<String> {
        let state = self.lock();
        let zones: BTreeSet<String> = state
            .names()
            .iter()
            .filter_map(|name| state.live(name))
            .map(get_zone_key)
            .collect();
        zones.into_iter().collect()
    }
}

#[async_trait]
impl NodeStore for FakeNodeStore {
    async fn get(&self, name: &str) -> Result<Node, StoreError> {
        self.begin().live_or_not_found(name)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Node>, StoreError> {
        let state = self.begin();
        let selector = filter.label_selector.as_deref().unwrap_or_default();

        let nodes = state
            .names()
            .iter()
            .filter_map(|name| state.live(name))
            .filter(|node| matches_selector(selector, node.labels()))
            .cloned()
            .collect();
        Ok(nodes)
    }

    async fn create(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        let created = {
            let mut state = self.begin();
            if state.live(&name).is_some() {
                return Err(StoreError::AlreadyExists { name });
            }
            if let Some(hook) = &self.create_hook {
                if !hook(node) {
                    return Err(StoreError::CreateRejected { name });
                }
            }

            let mut created = node.clone();
            created.metadata.resource_version = Some(state.next_resource_version());
            state.deleted.remove(&name);
            state.updated.remove(&name);
            state.existing.remove(&name);
            state.created.insert(name.clone(), created.clone());
            state.created_log.push(created.clone());
            self.emit(NodeEvent::Applied(created.clone()));
            created
        };

        debug!(node = %name, "Fake store created node");
        Ok(created)
    }

    async fn update(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        let updated = {
            let mut state = self.begin();
            let stored = state.live_or_not_found(&name)?;
            state.check_version(&name, &stored, node.metadata.resource_version.as_deref())?;
            let updated = state.store_updated(&name, node.clone());
            self.emit(NodeEvent::Applied(updated.clone()));
            updated
        };

        Ok(updated)
    }

    async fn update_status(&self, node: &Node) -> Result<Node, StoreError> {
        let name = node.name_any();
        let updated = {
            let mut state = self.begin();
            let mut stored = state.live_or_not_found(&name)?;
            state.check_version(&name, &stored, node.metadata.resource_version.as_deref())?;
            stored.status.clone_from(&node.status);
            let updated = state.store_updated(&name, stored);
            state.updated_status_log.push(updated.clone());
            self.emit(NodeEvent::Applied(updated.clone()));
            updated
        };

        Ok(updated)
    }

    async fn patch_status(&self, name: &str, patch: &[u8]) -> Result<Node, StoreError> {
        let invalid = |reason: String| StoreError::InvalidPatch {
            name: name.to_string(),
            reason,
        };

        let updated = {
            let mut state = self.begin();
            let stored = state.live_or_not_found(name)?;

            let document: Value =
                serde_json::from_slice(patch).map_err(|e| invalid(e.to_string()))?;
            if !document.is_object() {
                return Err(invalid("patch must be a JSON object".to_string()));
            }
            let expected = document
                .pointer("/metadata/resourceVersion")
                .and_then(Value::as_str);
            state.check_version(name, &stored, expected)?;

            let mut patched = stored.clone();
            if let Some(status_patch) = document.get("status") {
                let mut status = serde_json::to_value(&stored.status)
                    .map_err(|e| invalid(e.to_string()))?;
                apply_status_patch(&mut status, status_patch);
                patched.status = if status.is_null() {
                    None
                } else {
                    Some(
                        serde_json::from_value::<NodeStatus>(status)
                            .map_err(|e| invalid(e.to_string()))?,
                    )
                };
            }

            let updated = state.store_updated(name, patched);
            state.patch_log.push((name.to_string(), document));
            self.emit(NodeEvent::Applied(updated.clone()));
            updated
        };

        debug!(node = name, "Fake store patched node status");
        Ok(updated)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.begin();
        let stored = state.live_or_not_found(name)?;
        state.deleted.insert(name.to_string());
        state.deleted_log.push(stored.clone());
        self.emit(NodeEvent::Deleted(stored));
        drop(state);

        if let Some(notifier) = &self.delete_notifier {
            // The receiver may have been dropped by a finished test.
            let _ = notifier.send(name.to_string());
        }
        Ok(())
    }

    fn watch(&self, filter: &ListFilter) -> BoxStream<'static, Result<NodeEvent, StoreError>> {
        let selector = filter.label_selector.clone().unwrap_or_default();
        let receiver = self.events.subscribe();

        stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Some((
                    Err(StoreError::Unavailable(format!(
                        "watch fell behind by {skipped} events"
                    ))),
                    receiver,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        .filter(move |event| {
            future::ready(match event {
                Ok(event) => matches_selector(&selector, event.node().labels()),
                Err(_) => true,
            })
        })
        .boxed()
    }
}

/// An event captured by [`FakeRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// `<object name>.<unix nanos in hex>`
    pub name: String,
    /// Namespace of the involved object, or `default` for cluster-scoped objects
    pub namespace: String,
    /// The object the event is about
    pub involved_object: ObjectReference,
    /// `Normal` or `Warning`
    pub type_: String,
    /// Machine-readable reason
    pub reason: String,
    /// Action the controller took
    pub action: String,
    /// Human-readable message, empty when none was given
    pub message: String,
    /// Reporting component
    pub source_component: String,
    /// When the event was first seen
    pub first_timestamp: DateTime<Utc>,
    /// When the event was last seen
    pub last_timestamp: DateTime<Utc>,
    /// Occurrence count, always 1
    pub count: i32,
}

/// [`EventRecorder`] that stores events in memory.
///
/// Time is frozen at construction and only moves through [`FakeRecorder::set_time`].
pub struct FakeRecorder {
    source_component: String,
    clock: Mutex<DateTime<Utc>>,
    events: Mutex<Vec<RecordedEvent>>,
}

impl Default for FakeRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRecorder {
    /// A recorder frozen at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time(Utc::now())
    }

    /// A recorder frozen at `now`.
    #[must_use]
    pub fn with_time(now: DateTime<Utc>) -> Self {
        Self {
            source_component: FAKE_RECORDER_COMPONENT.to_string(),
            clock: Mutex::new(now),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Move the frozen clock.
    pub fn set_time(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Events recorded so far, in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn make_event(
        &self,
        reference: &ObjectReference,
        object_name: &str,
        type_: &EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) -> RecordedEvent {
        let now = *self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let nanos = now.timestamp_nanos_opt().unwrap_or_default();
        let namespace = reference
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_NAMESPACE.to_string());

        RecordedEvent {
            name: format!("{object_name}.{nanos:x}"),
            namespace,
            involved_object: reference.clone(),
            type_: event_type_name(type_).to_string(),
            reason: reason.to_string(),
            action: action.to_string(),
            message: note.unwrap_or_default(),
            source_component: self.source_component.clone(),
            first_timestamp: now,
            last_timestamp: now,
            count: 1,
        }
    }
}

#[async_trait]
impl EventRecorder for FakeRecorder {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        // Unnamed references cannot be events' subjects.
        let Some(object_name) = reference.name.as_deref() else {
            return;
        };
        let event = self.make_event(reference, object_name, &type_, reason, action, note);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// A node named `name` with 10 CPUs and 10G of memory.
#[must_use]
pub fn new_node(name: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(name.to_string()),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            capacity: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("10".to_string())),
                ("memory".to_string(), Quantity("10G".to_string())),
            ])),
            ..Default::default()
        }),
    }
}

/// A ready pod named `name` in the `default` namespace, bound to node `host`.
#[must_use]
pub fn new_pod(name: &str, host: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(DEFAULT_EVENT_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(host.to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
#[path = "testutil_tests.rs"]
mod testutil_tests;
