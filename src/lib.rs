// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # nodeutil - Node helpers for Kubernetes controllers
//!
//! nodeutil collects the small pieces every node-facing controller ends up writing:
//! picking the address to reach a node by, and writing status changes back without
//! trampling fields owned by the kubelet.
//!
//! ## Modules
//!
//! - [`address`] - Preferred address, host IP and zone key resolution
//! - [`patch`] - Minimal strategic merge patches for node status
//! - [`conditions`] - Node condition helpers
//! - [`store`] - The [`store::NodeStore`] trait and its API server implementation
//! - [`events`] - Kubernetes Event recording
//! - [`retry`] - Exponential backoff for conflicting writes
//! - [`selector`] - Label selector matching
//! - [`testutil`] - In-memory store and recorder for tests
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use nodeutil::address::{get_preferred_node_address, parse_preferences};
//! use nodeutil::patch::patch_node_status;
//! use nodeutil::store::NodeStore;
//!
//! # async fn example(store: &dyn NodeStore) -> anyhow::Result<()> {
//! let preferences = parse_preferences("Hostname,InternalIP,ExternalIP")?;
//! let old = store.get("node-a").await?;
//! let address = get_preferred_node_address(&old, &preferences)?;
//!
//! let mut new = old.clone();
//! new.status.get_or_insert_with(Default::default).phase = Some("Running".into());
//! patch_node_status(store, "node-a", &old, &new).await?;
//! # let _ = address;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod conditions;
pub mod constants;
pub mod errors;
pub mod events;
pub mod labels;
pub mod metrics;
pub mod patch;
pub mod retry;
pub mod selector;
pub mod store;
pub mod testutil;
