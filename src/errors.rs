// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for node address resolution, status patching and node stores.
//!
//! Two layers:
//! - [`StoreError`] describes failures reported by a [`NodeStore`](crate::store::NodeStore)
//!   (the Kubernetes API server, or the in-memory fake used by tests).
//! - [`NodeError`] is what the public operations of this crate return. Store errors are
//!   wrapped verbatim, never rewritten.

use thiserror::Error;

/// Errors reported by a node store.
///
/// The variants mirror the HTTP status classes of the Kubernetes API server so that
/// the fake store and the real client surface the same conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The named node does not exist (HTTP 404)
    #[error("node \"{name}\" not found")]
    NotFound {
        /// The node name that was looked up
        name: String,
    },

    /// A node with this name already exists (HTTP 409, reason `AlreadyExists`)
    #[error("node \"{name}\" already exists")]
    AlreadyExists {
        /// The node name that collided
        name: String,
    },

    /// The write was based on a stale resource version (HTTP 409)
    #[error("conflict writing node \"{name}\": {message}")]
    Conflict {
        /// The node being written
        name: String,
        /// Server-provided explanation
        message: String,
    },

    /// A create hook refused the node
    #[error("create of node \"{name}\" was rejected")]
    CreateRejected {
        /// The node name that was refused
        name: String,
    },

    /// The patch document could not be parsed or applied
    #[error("invalid patch for node \"{name}\": {reason}")]
    InvalidPatch {
        /// The node being patched
        name: String,
        /// Why the patch was rejected
        reason: String,
    },

    /// Any other API error response
    #[error("node API error (HTTP {code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Server-provided explanation
        message: String,
    },

    /// Transport-level failure reaching the store
    #[error("node store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Map a `kube::Error` for an operation on `name` into a store error.
    #[must_use]
    pub fn from_kube(err: kube::Error, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => Self::NotFound {
                    name: name.to_string(),
                },
                409 if resp.reason == "AlreadyExists" => Self::AlreadyExists {
                    name: name.to_string(),
                },
                409 => Self::Conflict {
                    name: name.to_string(),
                    message: resp.message,
                },
                code => Self::Api {
                    code,
                    message: resp.message,
                },
            },
            other => Self::Unavailable(other.to_string()),
        }
    }

    /// Returns true if the same request may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Unavailable(_) => true,
            Self::Api { code, .. } => *code == 429 || (500..600).contains(code),
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::CreateRejected { .. }
            | Self::InvalidPatch { .. } => false,
        }
    }

    /// Returns the Kubernetes-style reason string for this error.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::Conflict { .. } => "Conflict",
            Self::CreateRejected { .. } => "CreateRejected",
            Self::InvalidPatch { .. } => "InvalidPatch",
            Self::Api { .. } => "ApiError",
            Self::Unavailable(_) => "Unavailable",
        }
    }
}

/// Errors returned by the node utilities in this crate.
#[derive(Error, Debug)]
pub enum NodeError {
    /// None of the preferred address types matched a label or status address.
    ///
    /// `known` is the rendered address list, see
    /// [`format_known_addresses`](crate::address::format_known_addresses).
    #[error("no preferred addresses found; known addresses: {known}")]
    AddressNotFound {
        /// Rendered list of every address the node reports
        known: String,
    },

    /// The node reports no parseable internal or external IP
    #[error("host IP unknown; known addresses: {known}")]
    HostIpUnknown {
        /// Rendered list of every address the node reports
        known: String,
    },

    /// An address type name is not one Kubernetes defines
    #[error("unknown node address type \"{0}\"")]
    UnknownAddressType(String),

    /// A node status could not be converted to or from JSON
    #[error("failed to serialize node status: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The node store rejected or failed the request
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NodeError {
    /// Returns true if the failed operation may succeed when retried.
    ///
    /// Only store errors can be transient; resolution and serialization failures
    /// are deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::AddressNotFound { .. }
            | Self::HostIpUnknown { .. }
            | Self::UnknownAddressType(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Returns true if this is a store-level not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
