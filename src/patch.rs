// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node status patching.
//!
//! A controller that mutates a local copy of a node's status should not write the
//! whole status back: the kubelet and other controllers own other fields and a full
//! write would clobber their concurrent changes. Instead [`patch_node_status`]
//! diffs the old and new snapshots and sends a strategic merge patch that mentions
//! only the fields that changed.
//!
//! # Patch Semantics
//!
//! - Objects are diffed recursively; unchanged keys are omitted.
//! - Keys present in the old status and absent in the new one become `null`.
//! - `conditions` and `addresses` are lists keyed by `type`. Only entries that were
//!   added or changed are sent, changed entries carry just their differing fields
//!   plus the key, and removed entries become `{"type": ..., "$patch": "delete"}`.
//!   Entries present in both snapshots with equal content are never sent, so a
//!   concurrent writer's change to another entry survives the patch.
//! - A keyed list whose entries repeat a key cannot be merged entry by entry; it is
//!   sent whole behind a `{"$patch": "replace"}` directive.
//! - Every other list (images, volumes) is atomic and replaced whole when it differs.
//! - Equal snapshots produce no patch and no request.

use crate::errors::NodeError;
use crate::metrics;
use crate::store::NodeStore;
use k8s_openapi::api::core::v1::Node;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

/// Compute the merge patch that turns `old` into `new`.
///
/// Returns `None` when the values are equal.
#[must_use]
pub fn diff_values(old: &Value, new: &Value) -> Option<Value> {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();

            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) => {
                        if let Some(nested) = diff_values(old_value, new_value) {
                            patch.insert(key.clone(), nested);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }

            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }

            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        _ if old == new => None,
        _ => Some(new.clone()),
    }
}

/// Apply a JSON merge patch to `target` in place.
///
/// `null` members delete keys, objects merge recursively and every other value
/// replaces what was there.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else {
        return;
    };

    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

/// Status lists merged entry by entry, with the field that identifies an entry.
pub const STATUS_LIST_MERGE_KEYS: &[(&str, &str)] =
    &[("conditions", "type"), ("addresses", "type")];

/// Strategic merge patch directive key.
const PATCH_DIRECTIVE: &str = "$patch";

fn list_merge_key(field: &str) -> Option<&'static str> {
    STATUS_LIST_MERGE_KEYS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, key)| *key)
}

/// Index list entries by `merge_key`, or `None` if an entry lacks the key or
/// repeats one.
fn index_by_key<'a>(items: &'a [Value], merge_key: &str) -> Option<Vec<(&'a str, &'a Value)>> {
    let mut indexed: Vec<(&str, &Value)> = Vec::with_capacity(items.len());
    for item in items {
        let key = item.get(merge_key)?.as_str()?;
        if indexed.iter().any(|(seen, _)| *seen == key) {
            return None;
        }
        indexed.push((key, item));
    }
    Some(indexed)
}

/// Diff two lists whose entries are identified by `merge_key`.
///
/// Returns `None` when the lists hold the same entries in the same order.
#[must_use]
pub fn diff_keyed_list(old: &[Value], new: &[Value], merge_key: &str) -> Option<Value> {
    if old == new {
        return None;
    }

    let (Some(old_index), Some(new_index)) =
        (index_by_key(old, merge_key), index_by_key(new, merge_key))
    else {
        let mut replace = vec![json!({ PATCH_DIRECTIVE: "replace" })];
        replace.extend(new.iter().cloned());
        return Some(Value::Array(replace));
    };

    let mut entries = Vec::new();
    for (key, new_item) in &new_index {
        match old_index.iter().find(|(old_key, _)| old_key == key) {
            Some((_, old_item)) => {
                if let Some(Value::Object(mut changed)) = diff_values(old_item, new_item) {
                    changed.insert(merge_key.to_string(), Value::String((*key).to_string()));
                    entries.push(Value::Object(changed));
                }
            }
            None => entries.push((*new_item).clone()),
        }
    }
    for (key, _) in &old_index {
        if !new_index.iter().any(|(new_key, _)| new_key == key) {
            entries.push(json!({ merge_key: key, PATCH_DIRECTIVE: "delete" }));
        }
    }

    if entries.is_empty() {
        None
    } else {
        Some(Value::Array(entries))
    }
}

/// Diff two serialized node statuses into a strategic merge patch body.
///
/// Returns `None` when the statuses are equal.
#[must_use]
pub fn diff_status(old: &Value, new: &Value) -> Option<Value> {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        return diff_values(old, new);
    };

    let mut patch = Map::new();
    for (field, new_value) in new_map {
        let changed = match (old_map.get(field), list_merge_key(field)) {
            (Some(Value::Array(old_list)), Some(merge_key)) => match new_value {
                Value::Array(new_list) => diff_keyed_list(old_list, new_list, merge_key),
                other => Some(other.clone()),
            },
            (Some(old_value), _) => diff_values(old_value, new_value),
            (None, _) => Some(new_value.clone()),
        };
        if let Some(changed) = changed {
            patch.insert(field.clone(), changed);
        }
    }
    for field in old_map.keys() {
        if !new_map.contains_key(field) {
            patch.insert(field.clone(), Value::Null);
        }
    }

    if patch.is_empty() {
        None
    } else {
        Some(Value::Object(patch))
    }
}

/// Apply a keyed-list patch to `target` in place.
fn apply_keyed_list(target: &mut Value, patch: &[Value], merge_key: &str) {
    let directive = |item: &Value| {
        item.get(PATCH_DIRECTIVE)
            .and_then(Value::as_str)
            .map(str::to_owned)
    };

    if patch
        .iter()
        .any(|item| directive(item).as_deref() == Some("replace"))
    {
        *target = Value::Array(
            patch
                .iter()
                .filter(|item| directive(item).is_none())
                .cloned()
                .collect(),
        );
        return;
    }

    if !target.is_array() {
        *target = Value::Array(Vec::new());
    }
    let Value::Array(items) = target else {
        return;
    };

    for entry in patch {
        let key = entry.get(merge_key).and_then(Value::as_str);
        let position = key.and_then(|key| {
            items
                .iter()
                .position(|item| item.get(merge_key).and_then(Value::as_str) == Some(key))
        });

        match (directive(entry).as_deref(), position) {
            (Some("delete"), Some(index)) => {
                items.remove(index);
            }
            (Some(_), _) => {}
            (None, Some(index)) => apply_merge_patch(&mut items[index], entry),
            (None, None) => {
                let mut added = Value::Null;
                apply_merge_patch(&mut added, entry);
                items.push(added);
            }
        }
    }
}

/// Apply a status patch built by [`diff_status`] to a serialized status in place.
///
/// Keyed lists merge entry by entry and honour `$patch` directives; everything else
/// follows JSON merge patch rules.
pub fn apply_status_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else {
        return;
    };

    for (field, value) in patch_map {
        match (value, list_merge_key(field)) {
            (Value::Null, _) => {
                target_map.remove(field);
            }
            (Value::Array(entries), Some(merge_key)) => {
                let slot = target_map.entry(field.clone()).or_insert(Value::Null);
                apply_keyed_list(slot, entries, merge_key);
            }
            _ => apply_merge_patch(target_map.entry(field.clone()).or_insert(Value::Null), value),
        }
    }
}

/// Serialize a node's status, treating a missing status as an empty object.
fn status_value(node: &Node) -> Result<Value, NodeError> {
    match &node.status {
        Some(status) => Ok(serde_json::to_value(status)?),
        None => Ok(Value::Object(Map::new())),
    }
}

/// Build the serialized `{"status": ...}` patch between two node snapshots.
///
/// Only the status subtree is compared; metadata and spec differences are ignored.
///
/// # Errors
///
/// Returns [`NodeError::Serialization`] if either status cannot be serialized.
pub fn create_status_patch(old: &Node, new: &Node) -> Result<Option<Vec<u8>>, NodeError> {
    let old_status = status_value(old)?;
    let new_status = status_value(new)?;

    match diff_status(&old_status, &new_status) {
        Some(diff) => Ok(Some(serde_json::to_vec(&json!({ "status": diff }))?)),
        None => Ok(None),
    }
}

/// Persist the status change between `old` and `new` for `node_name`.
///
/// When the snapshots' statuses are equal no patch is sent and the currently stored
/// node is returned unchanged. Otherwise the minimal patch is submitted through
/// [`NodeStore::patch_status`] and the store's post-patch node is returned.
///
/// Store failures are returned as-is; this function never retries. Wrap the call in
/// [`retry_on_conflict`](crate::retry::retry_on_conflict) to retry.
///
/// # Errors
///
/// Returns [`NodeError::Serialization`] if a status cannot be serialized, or
/// [`NodeError::Store`] with the store's error.
pub async fn patch_node_status<S>(
    store: &S,
    node_name: &str,
    old: &Node,
    new: &Node,
) -> Result<Node, NodeError>
where
    S: NodeStore + ?Sized,
{
    let start = Instant::now();

    let Some(patch) = create_status_patch(old, new)? else {
        debug!(node = node_name, "Node status unchanged, skipping patch");
        let current = store.get(node_name).await?;
        metrics::record_status_patch("skipped", start.elapsed());
        return Ok(current);
    };

    debug!(
        node = node_name,
        patch_bytes = patch.len(),
        "Patching node status"
    );

    match store.patch_status(node_name, &patch).await {
        Ok(updated) => {
            metrics::record_status_patch("applied", start.elapsed());
            Ok(updated)
        }
        Err(e) => {
            warn!(node = node_name, error = %e, "Failed to patch node status");
            metrics::record_status_patch("failed", start.elapsed());
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod patch_tests;
