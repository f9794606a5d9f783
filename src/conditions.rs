// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node condition helpers.
//!
//! These functions edit a [`NodeStatus`] in memory only. Persist the result with
//! [`patch_node_status`](crate::patch::patch_node_status), which sends just the
//! conditions that changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use nodeutil::conditions::{new_node_condition, now_time, set_node_condition};
//! use nodeutil::patch::patch_node_status;
//!
//! let mut updated = node.clone();
//! let status = updated.status.get_or_insert_with(Default::default);
//! set_node_condition(
//!     status,
//!     new_node_condition("NetworkUnavailable", "False", "RouteCreated", "route ready", now_time()?),
//! );
//! patch_node_status(&store, "node-a", &node, &updated).await?;
//! ```

use crate::errors::NodeError;
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Current time as a Kubernetes [`Time`], truncated to whole seconds.
///
/// # Errors
///
/// Returns [`NodeError::Serialization`] if the timestamp cannot be represented.
pub fn now_time() -> Result<Time, NodeError> {
    let rfc3339 = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(serde_json::from_value(serde_json::Value::String(rfc3339))?)
}

/// Build a node condition whose heartbeat and transition times are both `now`.
#[must_use]
pub fn new_node_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    now: Time,
) -> NodeCondition {
    NodeCondition {
        type_: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_heartbeat_time: Some(now.clone()),
        last_transition_time: Some(now),
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_node_condition<'a>(
    status: &'a NodeStatus,
    condition_type: &str,
) -> Option<&'a NodeCondition> {
    status
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == condition_type)
}

/// Replace the condition of the same type, or append it.
///
/// When the existing condition already has the same `status` value its
/// `lastTransitionTime` is kept; only a real transition moves the timestamp.
pub fn set_node_condition(status: &mut NodeStatus, mut condition: NodeCondition) {
    let conditions = status.conditions.get_or_insert_with(Vec::new);

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status && existing.last_transition_time.is_some() {
            condition
                .last_transition_time
                .clone_from(&existing.last_transition_time);
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Compare two condition lists ignoring timestamps and order.
///
/// Two lists are equal when they hold the same conditions, counted with
/// multiplicity, by type, status, reason and message.
#[must_use]
pub fn node_conditions_equal(current: &[NodeCondition], new: &[NodeCondition]) -> bool {
    fn sorted_keys(
        conditions: &[NodeCondition],
    ) -> Vec<(&str, &str, Option<&str>, Option<&str>)> {
        let mut keys: Vec<_> = conditions
            .iter()
            .map(|c| {
                (
                    c.type_.as_str(),
                    c.status.as_str(),
                    c.reason.as_deref(),
                    c.message.as_deref(),
                )
            })
            .collect();
        keys.sort_unstable();
        keys
    }

    if current.len() != new.len() {
        return false;
    }

    sorted_keys(current) == sorted_keys(new)
}

#[cfg(test)]
#[path = "conditions_tests.rs"]
mod conditions_tests;
