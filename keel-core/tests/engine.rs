//! End-to-end engine behavior over the in-process store.
//!
//! These tests run under paused time so backoff delays resolve
//! deterministically.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tokio::time::timeout;

use keel_core::{
    Backoff, Engine, EngineConfig, MemoryStore, Object, ObjectRef, ObjectStatus, ObjectStore,
    ReconcileError, Reconciler,
};

#[derive(Debug, Clone, PartialEq)]
struct DeploySpec {
    replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct DeployStatus {
    phase: String,
    error: String,
}

impl ObjectStatus for DeployStatus {
    fn failed(message: String) -> Self {
        Self {
            phase: "Failed".to_string(),
            error: message,
        }
    }
}

type DeployStore = MemoryStore<DeploySpec, DeployStatus>;

/// Fake provisioner with programmable failures and call counters.
#[derive(Default)]
struct FakeDeploy {
    /// Reconcile invocations.
    calls: AtomicU32,
    /// External resources actually created (at most one per identity).
    side_effects: AtomicU32,
    created: AtomicBool,
    /// Finalize invocations.
    releases: AtomicU32,
    /// First N reconciles fail transiently.
    fail_reconciles: AtomicU32,
    /// First N finalizes fail transiently.
    fail_releases: AtomicU32,
    /// Reject the spec as permanently invalid.
    reject_spec: AtomicBool,
}

fn take_failure(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Reconciler for FakeDeploy {
    type Spec = DeploySpec;
    type Status = DeployStatus;

    async fn reconcile(
        &self,
        _object: &Object<DeploySpec, DeployStatus>,
    ) -> Result<DeployStatus, ReconcileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_spec.load(Ordering::SeqCst) {
            return Err(ReconcileError::permanent("replica count not supported"));
        }
        if take_failure(&self.fail_reconciles) {
            return Err(ReconcileError::transient("backend unavailable"));
        }
        if !self.created.swap(true, Ordering::SeqCst) {
            self.side_effects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(DeployStatus {
            phase: "Provisioned".to_string(),
            error: String::new(),
        })
    }

    async fn finalize(
        &self,
        _object: &Object<DeploySpec, DeployStatus>,
    ) -> Result<(), ReconcileError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_releases) {
            return Err(ReconcileError::transient("teardown failed"));
        }
        Ok(())
    }
}

struct Harness {
    deploy: Arc<FakeDeploy>,
    store: Arc<DeployStore>,
    shutdown: watch::Sender<bool>,
    engine: tokio::task::JoinHandle<()>,
}

impl Harness {
    /// Spawn an engine and give it a turn to subscribe and run its initial
    /// re-list over the (still empty) store.
    async fn start(config: EngineConfig) -> Self {
        let deploy = Arc::new(FakeDeploy::default());
        let store = Arc::new(DeployStore::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let engine = tokio::spawn(
            Engine::new(Arc::clone(&deploy), Arc::clone(&store), config).run(shutdown_rx),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        Self {
            deploy,
            store,
            shutdown,
            engine,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.engine.await;
    }
}

/// Test config: long re-sync so only explicit triggers and backoff requeues
/// drive passes.
fn quiet_config() -> EngineConfig {
    EngineConfig {
        resync_interval: Duration::from_secs(3600),
        backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(300)),
        ..EngineConfig::new("deploy")
    }
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(120), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_phase(store: &DeployStore, object_ref: &ObjectRef, phase: &str) -> Object<DeploySpec, DeployStatus> {
    timeout(Duration::from_secs(120), async {
        loop {
            if let Some(object) = store.get(object_ref).await.unwrap() {
                if object.status.phase == phase {
                    return object;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("phase not reached in time")
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_spec_reconciles_to_identical_status_with_one_side_effect() {
    let harness = Harness::start(EngineConfig {
        resync_interval: Duration::from_secs(1),
        ..EngineConfig::new("deploy")
    })
    .await;
    let r = ObjectRef::new("default", "app-1");

    harness
        .store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();
    let first = wait_for_phase(&harness.store, &r, "Provisioned").await;

    // Let several re-sync passes run over the unchanged spec.
    let deploy = Arc::clone(&harness.deploy);
    wait_for(move || deploy.calls.load(Ordering::SeqCst) >= 4).await;

    let second = harness.store.get(&r).await.unwrap().unwrap();
    assert_eq!(second.status, first.status);
    // No-op status writes are skipped, so the version never moved.
    assert_eq!(second.meta.resource_version, first.meta.resource_version);
    assert_eq!(harness.deploy.side_effects.load(Ordering::SeqCst), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retries_and_provisions_on_second_call() {
    let harness = Harness::start(quiet_config()).await;
    harness.deploy.fail_reconciles.store(1, Ordering::SeqCst);
    let r = ObjectRef::new("default", "app-1");

    // Trigger 1: the create event. Trigger 2: the backoff requeue.
    harness
        .store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();
    let object = wait_for_phase(&harness.store, &r, "Provisioned").await;

    assert_eq!(object.status.error, "");
    assert_eq!(harness.deploy.calls.load(Ordering::SeqCst), 2);

    // Status was never written by the failed attempt.
    assert_eq!(object.meta.generation, 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_halts_until_spec_changes() {
    let harness = Harness::start(EngineConfig {
        resync_interval: Duration::from_secs(1),
        ..EngineConfig::new("deploy")
    })
    .await;
    harness.deploy.reject_spec.store(true, Ordering::SeqCst);
    let r = ObjectRef::new("default", "app-1");

    harness
        .store
        .create("default", "app-1", DeploySpec { replicas: 0 })
        .await
        .unwrap();
    let object = wait_for_phase(&harness.store, &r, "Failed").await;
    assert_eq!(object.status.error, "replica count not supported");

    // Re-syncs keep firing but the halted generation is skipped without
    // invoking the adapter.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.deploy.calls.load(Ordering::SeqCst), 1);

    // An author edit re-triggers reconciliation.
    harness.deploy.reject_spec.store(false, Ordering::SeqCst);
    harness
        .store
        .update_spec(&r, DeploySpec { replicas: 3 })
        .await
        .unwrap();
    let object = wait_for_phase(&harness.store, &r, "Provisioned").await;
    assert_eq!(object.status.error, "");
    assert_eq!(harness.deploy.calls.load(Ordering::SeqCst), 2);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_deletion_waits_for_successful_release() {
    let harness = Harness::start(EngineConfig {
        finalizer: Some("deploy.release".to_string()),
        ..quiet_config()
    })
    .await;
    harness.deploy.fail_releases.store(1, Ordering::SeqCst);
    let r = ObjectRef::new("default", "app-1");

    harness
        .store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();
    let object = wait_for_phase(&harness.store, &r, "Provisioned").await;
    assert!(object.meta.has_finalizer("deploy.release"));

    harness.store.delete(&r).await.unwrap();

    // First release fails, so the object must survive that pass.
    let deploy = Arc::clone(&harness.deploy);
    wait_for(move || deploy.releases.load(Ordering::SeqCst) >= 1).await;
    assert!(harness.store.get(&r).await.unwrap().is_some());

    // The retried release succeeds; only then does the object go away.
    timeout(Duration::from_secs(120), async {
        while harness.store.get(&r).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("object not removed in time");

    assert_eq!(harness.deploy.releases.load(Ordering::SeqCst), 2);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_write_conflict_is_retried_after_refetch() {
    // Reconciler that bumps the object's resource version mid-pass, forcing
    // the engine's status write into the conflict path.
    struct ConflictingReconciler {
        store: Arc<DeployStore>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Reconciler for ConflictingReconciler {
        type Spec = DeploySpec;
        type Status = DeployStatus;

        async fn reconcile(
            &self,
            object: &Object<DeploySpec, DeployStatus>,
        ) -> Result<DeployStatus, ReconcileError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // Same generation, newer resource version.
                self.store
                    .set_finalizer(&object.object_ref(), "extra")
                    .await
                    .map_err(ReconcileError::transient)?;
            }
            Ok(DeployStatus {
                phase: "Provisioned".to_string(),
                error: String::new(),
            })
        }

        async fn finalize(
            &self,
            _object: &Object<DeploySpec, DeployStatus>,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    let store = Arc::new(DeployStore::new());
    let reconciler = Arc::new(ConflictingReconciler {
        store: Arc::clone(&store),
        calls: AtomicU32::new(0),
    });
    let (shutdown, shutdown_rx) = watch::channel(false);
    let engine = tokio::spawn(
        Engine::new(Arc::clone(&reconciler), Arc::clone(&store), quiet_config()).run(shutdown_rx),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let r = ObjectRef::new("default", "app-1");
    store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();
    let object = wait_for_phase(&store, &r, "Provisioned").await;

    // The conflicting write went through after an immediate re-fetch, not
    // through the backoff path.
    assert!(object.meta.has_finalizer("extra"));
    assert_eq!(object.status.error, "");

    let _ = shutdown.send(true);
    let _ = engine.await;
}

#[tokio::test(start_paused = true)]
async fn test_passes_for_one_identity_never_overlap() {
    // Reconciler whose first call blocks until released, tracking the peak
    // number of concurrent passes.
    struct BlockingReconciler {
        release: Notify,
        calls: AtomicU32,
        running: AtomicU32,
        max_running: AtomicU32,
    }

    #[async_trait]
    impl Reconciler for BlockingReconciler {
        type Spec = DeploySpec;
        type Status = DeployStatus;

        async fn reconcile(
            &self,
            _object: &Object<DeploySpec, DeployStatus>,
        ) -> Result<DeployStatus, ReconcileError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.release.notified().await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(DeployStatus {
                phase: "Provisioned".to_string(),
                error: String::new(),
            })
        }

        async fn finalize(
            &self,
            _object: &Object<DeploySpec, DeployStatus>,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    let store = Arc::new(DeployStore::new());
    let reconciler = Arc::new(BlockingReconciler {
        release: Notify::new(),
        calls: AtomicU32::new(0),
        running: AtomicU32::new(0),
        max_running: AtomicU32::new(0),
    });
    let config = EngineConfig {
        pass_deadline: Duration::from_secs(3600),
        ..quiet_config()
    };
    let (shutdown, shutdown_rx) = watch::channel(false);
    let engine =
        tokio::spawn(Engine::new(Arc::clone(&reconciler), Arc::clone(&store), config).run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let r = ObjectRef::new("default", "app-1");
    store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();

    // First pass is now blocked inside reconcile.
    let rec = Arc::clone(&reconciler);
    wait_for(move || rec.calls.load(Ordering::SeqCst) == 1).await;

    // A second trigger arrives mid-pass; it must be deferred, not run
    // concurrently.
    store
        .update_spec(&r, DeploySpec { replicas: 5 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);

    reconciler.release.notify_one();
    let rec = Arc::clone(&reconciler);
    wait_for(move || rec.calls.load(Ordering::SeqCst) == 2).await;
    wait_for_phase(&store, &r, "Provisioned").await;

    assert_eq!(reconciler.max_running.load(Ordering::SeqCst), 1);

    let _ = shutdown.send(true);
    let _ = engine.await;
}

#[tokio::test(start_paused = true)]
async fn test_trigger_for_missing_object_is_a_noop() {
    let harness = Harness::start(quiet_config()).await;
    let r = ObjectRef::new("default", "app-1");

    // Create and immediately delete: the engine may process the create
    // trigger after the object is gone and must treat it as success.
    harness
        .store
        .create("default", "app-1", DeploySpec { replicas: 3 })
        .await
        .unwrap();
    harness.store.delete(&r).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(harness.store.get(&r).await.unwrap().is_none());

    harness.stop().await;
}
