// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - argument parsing and node reconciliation

#[cfg(test)]
mod tests {
    use super::super::{error_policy, reconcile_node, Args, Context, ReconcileError};
    use clap::Parser;
    use k8s_openapi::api::core::v1::NodeAddress;
    use kube::runtime::controller::Action;
    use nodeutil::address::NodeAddressType;
    use nodeutil::constants::{DEFAULT_REQUEUE_SECS, ERROR_REQUEUE_DURATION_SECS};
    use nodeutil::testutil::{new_node, FakeRecorder};
    use std::sync::Arc;
    use std::time::Duration;

    fn context(recorder: Arc<FakeRecorder>) -> Arc<Context> {
        Arc::new(Context {
            preferences: vec![NodeAddressType::InternalIP, NodeAddressType::ExternalIP],
            recorder,
            requeue: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_args_explicit_values() {
        let args = Args::try_parse_from([
            "nodeutil",
            "--preferred-address-types",
            "ExternalIP,InternalIP",
            "--label-selector",
            "node-role.kubernetes.io/worker",
            "--requeue-secs",
            "60",
            "--metrics-port",
            "9090",
        ])
        .unwrap();

        assert_eq!(args.preferred_address_types, "ExternalIP,InternalIP");
        assert_eq!(
            args.label_selector.as_deref(),
            Some("node-role.kubernetes.io/worker")
        );
        assert_eq!(args.requeue_secs, 60);
        assert_eq!(args.metrics_port, 9090);
    }

    #[test]
    fn test_args_reject_non_numeric_requeue() {
        assert!(Args::try_parse_from(["nodeutil", "--requeue-secs", "soon"]).is_err());
        assert!(DEFAULT_REQUEUE_SECS > ERROR_REQUEUE_DURATION_SECS);
    }

    #[tokio::test]
    async fn test_reconcile_resolved_address_requeues_without_event() {
        let recorder = Arc::new(FakeRecorder::new());
        let mut node = new_node("node0");
        node.status.as_mut().unwrap().addresses = Some(vec![NodeAddress {
            type_: "ExternalIP".to_string(),
            address: "1.2.3.5".to_string(),
        }]);

        let action = reconcile_node(Arc::new(node), context(recorder.clone()))
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_missing_address_records_warning() {
        let recorder = Arc::new(FakeRecorder::new());
        let node = new_node("node0");

        let action = reconcile_node(Arc::new(node), context(recorder.clone()))
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_, "Warning");
        assert_eq!(events[0].reason, "NoPreferredAddress");
        assert_eq!(events[0].action, "Reconcile");
        assert_eq!(
            events[0].message,
            "no preferred addresses found; known addresses: []"
        );
        assert_eq!(events[0].involved_object.name.as_deref(), Some("node0"));
    }

    #[test]
    fn test_error_policy_requeues_after_error_interval() {
        let recorder = Arc::new(FakeRecorder::new());
        let err = ReconcileError(anyhow::anyhow!("boom"));

        let action = error_policy(Arc::new(new_node("node0")), &err, context(recorder));

        assert_eq!(
            action,
            Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
        );
    }
}
