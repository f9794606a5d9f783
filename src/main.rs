// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    runtime::{controller::Action, events::EventType, watcher::Config, Controller},
    Api, Client, Resource, ResourceExt,
};
use nodeutil::{
    address::{
        get_node_host_ip, get_preferred_node_address, get_zone_key, parse_preferences,
        NodeAddressType,
    },
    constants::{
        DEFAULT_CONTROLLER_NAME, DEFAULT_PREFERRED_ADDRESS_TYPES, DEFAULT_REQUEUE_SECS,
        ERROR_REQUEUE_DURATION_SECS, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH,
        METRICS_SERVER_PORT, TOKIO_WORKER_THREADS,
    },
    errors::NodeError,
    events::{actions, reasons, EventRecorder, KubeEventRecorder},
    metrics,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Watches cluster nodes and reports the address each one is reachable at.
#[derive(Debug, Parser)]
#[command(name = "nodeutil", version, about)]
struct Args {
    /// Comma-separated address types, most preferred first
    #[arg(
        long,
        env = "NODEUTIL_PREFERRED_ADDRESS_TYPES",
        default_value = DEFAULT_PREFERRED_ADDRESS_TYPES
    )]
    preferred_address_types: String,

    /// Only watch nodes matching this label selector
    #[arg(long, env = "NODEUTIL_LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Seconds between periodic re-checks of a node
    #[arg(long, env = "NODEUTIL_REQUEUE_SECS", default_value_t = DEFAULT_REQUEUE_SECS)]
    requeue_secs: u64,

    /// Name reported as the source of Kubernetes events
    #[arg(long, env = "NODEUTIL_CONTROLLER_NAME", default_value = DEFAULT_CONTROLLER_NAME)]
    controller_name: String,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, env = "NODEUTIL_METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    metrics_port: u16,

    /// Reporting instance for events, usually the pod name
    #[arg(long, env = "POD_NAME")]
    instance: Option<String>,
}

/// Shared state handed to every reconciliation.
struct Context {
    preferences: Vec<NodeAddressType>,
    recorder: Arc<dyn EventRecorder>,
    requeue: Duration,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("nodeutil-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_logging() {
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT=json|text
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_logging();

    info!("Starting node address controller");

    let preferences = parse_preferences(&args.preferred_address_types)?;
    debug!(preferences = ?preferences, "Parsed preferred address types");

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let recorder = KubeEventRecorder::new(client.clone(), &args.controller_name, args.instance);
    let context = Arc::new(Context {
        preferences,
        recorder: Arc::new(recorder),
        requeue: Duration::from_secs(args.requeue_secs),
    });

    tokio::select! {
        result = run_node_controller(client, args.label_selector, context) => {
            error!("CRITICAL: Node controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Node controller exited unexpectedly without error")
        }
        result = run_metrics_server(args.metrics_port) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        () = shutdown_signal() => {
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    }
}

/// Run the `Node` controller
async fn run_node_controller(
    client: Client,
    label_selector: Option<String>,
    context: Arc<Context>,
) -> Result<()> {
    info!(selector = ?label_selector, "Starting Node controller");

    let api = Api::<Node>::all(client);
    let config = match &label_selector {
        Some(selector) => Config::default().labels(selector),
        None => Config::default(),
    };

    Controller::new(api, config)
        .run(reconcile_node, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Resolve and report the preferred address of one node.
async fn reconcile_node(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let name = node.name_any();

    match get_preferred_node_address(&node, &ctx.preferences) {
        Ok(address) => {
            let host_ip = get_node_host_ip(&node).ok();
            info!(
                node = %name,
                address = %address,
                host_ip = ?host_ip,
                zone = ?get_zone_key(&node),
                "Resolved node address"
            );
            metrics::record_reconciliation("success", start.elapsed());
            Ok(Action::requeue(ctx.requeue))
        }
        Err(e @ NodeError::AddressNotFound { .. }) => {
            warn!(node = %name, error = %e, "Node has no preferred address");
            ctx.recorder
                .publish(
                    &node.object_ref(&()),
                    EventType::Warning,
                    reasons::NO_PREFERRED_ADDRESS,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            metrics::record_reconciliation("not_found", start.elapsed());
            Ok(Action::requeue(ctx.requeue))
        }
        Err(e) => {
            error!(node = %name, error = %e, "Failed to reconcile Node");
            metrics::record_reconciliation("error", start.elapsed());
            Err(anyhow::Error::from(e).into())
        }
    }
}

/// Error policy for the `Node` controller
fn error_policy(_node: Arc<Node>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve Prometheus metrics until the listener fails.
async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let address = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, path = METRICS_SERVER_PATH, "Metrics server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
