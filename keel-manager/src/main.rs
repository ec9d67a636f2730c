//! keel-manager: controller manager for the keel resource kinds.
//!
//! Runs one reconciliation engine per kind plus the device mirror loop:
//! - Routes are resolved through the directions backend
//! - Workloads are installed and torn down through the deployment backend
//! - Devices observed by the network backend are mirrored into the store
//!
//! Each kind's store events additionally feed the audit trail.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keel_core::{Engine, EngineConfig, MemoryStore, MirrorLoop, ObjectStore};

use keel_manager::audit::ControllerAudit;
use keel_manager::clients::{DeployClient, DirectionsClient, NetworkClient};
use keel_manager::reconciler::device::DeviceMirror;
use keel_manager::reconciler::route::RouteReconciler;
use keel_manager::reconciler::workload::{WorkloadReconciler, WORKLOAD_FINALIZER};
use keel_manager::resources::{
    DeviceSpec, DeviceStatus, RouteSpec, RouteStatus, WorkloadSpec, WorkloadStatus,
};

/// keel controller manager
#[derive(Parser, Debug)]
#[command(name = "keel-manager", version, about)]
struct Args {
    /// Directions backend endpoint
    #[arg(long, default_value = "http://[::1]:7301")]
    directions_endpoint: String,

    /// Network-management backend endpoint
    #[arg(long, default_value = "http://[::1]:7302")]
    network_endpoint: String,

    /// Network site whose stations are mirrored
    #[arg(long, default_value = "default")]
    network_site: String,

    /// Deployment backend endpoint
    #[arg(long, default_value = "http://[::1]:7303")]
    deploy_endpoint: String,

    /// Chart repository releases are installed from
    #[arg(long, default_value = "https://charts.example.com")]
    chart_repo: String,

    /// Namespace mirrored device objects are created in
    #[arg(long, default_value = "default")]
    device_namespace: String,

    /// Device mirror interval in seconds
    #[arg(long, default_value = "5")]
    mirror_interval: u64,

    /// Full re-list interval in seconds
    #[arg(long, default_value = "30")]
    resync_interval: u64,

    /// Concurrent reconciliation passes per kind
    #[arg(long, default_value = "4")]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("keel_manager=info".parse()?)
                .add_directive("keel_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!("Starting keel-manager");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let resync_interval = Duration::from_secs(args.resync_interval);

    // Route controller
    let route_store: Arc<MemoryStore<RouteSpec, RouteStatus>> = Arc::new(MemoryStore::new());
    let route_audit = ControllerAudit::new("route").watch(route_store.subscribe());
    let route_engine = Engine::new(
        Arc::new(RouteReconciler::new(DirectionsClient::new(
            args.directions_endpoint.clone(),
        ))),
        Arc::clone(&route_store),
        EngineConfig {
            workers: args.workers,
            resync_interval,
            ..EngineConfig::new("route")
        },
    );
    let route_handle = tokio::spawn(route_engine.run(shutdown_rx.clone()));

    // Workload controller
    let workload_store: Arc<MemoryStore<WorkloadSpec, WorkloadStatus>> =
        Arc::new(MemoryStore::new());
    let workload_audit = ControllerAudit::new("workload").watch(workload_store.subscribe());
    let workload_engine = Engine::new(
        Arc::new(WorkloadReconciler::new(DeployClient::new(
            args.deploy_endpoint.clone(),
            args.chart_repo.clone(),
        ))),
        Arc::clone(&workload_store),
        EngineConfig {
            workers: args.workers,
            resync_interval,
            finalizer: Some(WORKLOAD_FINALIZER.to_string()),
            ..EngineConfig::new("workload")
        },
    );
    let workload_handle = tokio::spawn(workload_engine.run(shutdown_rx.clone()));

    // Device mirror loop
    let device_store: Arc<MemoryStore<DeviceSpec, DeviceStatus>> = Arc::new(MemoryStore::new());
    let device_audit = ControllerAudit::new("device").watch(device_store.subscribe());
    let device_mirror = MirrorLoop::new(
        DeviceMirror::new(NetworkClient::new(
            args.network_endpoint.clone(),
            args.network_site.clone(),
        )),
        Arc::clone(&device_store),
        args.device_namespace.clone(),
        Duration::from_secs(args.mirror_interval),
    );
    let mirror_handle = tokio::spawn(device_mirror.run(shutdown_rx));

    // Wait for shutdown signal
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    // Signal shutdown and let in-flight passes drain.
    let _ = shutdown_tx.send(true);
    let _ = route_handle.await;
    let _ = workload_handle.await;
    let _ = mirror_handle.await;

    route_audit.abort();
    workload_audit.abort();
    device_audit.abort();

    info!("Shutdown complete");
    Ok(())
}
