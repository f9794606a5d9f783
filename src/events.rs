// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes Event recording.
//!
//! Provides a trait over `kube::runtime::events::Recorder` so that node controllers
//! can emit Events visible via `kubectl describe node`, and so that tests can swap in
//! [`FakeRecorder`](crate::testutil::FakeRecorder).
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about objects.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Publish an event on `reference`.
    ///
    /// # Arguments
    ///
    /// * `reference` - The object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason, e.g. `NoPreferredAddress`
    /// * `action` - What the controller was doing, e.g. `Reconcile`
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// [`EventRecorder`] that writes events through the API server.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as `controller_name`.
    ///
    /// `instance` is usually the pod name, so events from replicas can be told apart.
    #[must_use]
    pub fn new(client: Client, controller_name: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, reference).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// No preferred address type matched any of the node's addresses
    pub const NO_PREFERRED_ADDRESS: &str = "NoPreferredAddress";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
}

/// Render an event type the way the Events API spells it.
#[must_use]
pub fn event_type_name(type_: &EventType) -> &'static str {
    match type_ {
        EventType::Normal => "Normal",
        EventType::Warning => "Warning",
    }
}
