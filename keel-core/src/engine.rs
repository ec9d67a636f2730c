//! Reconciliation engine: level-triggered, per-identity serialized passes.
//!
//! The engine subscribes to a store's change events, re-lists periodically,
//! and drives one reconciler toward the desired state of every object of a
//! kind. Passes for distinct identities run in parallel on a bounded worker
//! budget; passes for one identity never overlap. Transient failures are
//! retried with exponential backoff, permanent failures halt the identity
//! until its spec generation changes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::ReconcileError;
use crate::object::{Object, ObjectRef, ObjectStatus};
use crate::store::{Event, ObjectStore, StoreError};

/// Converges one resource kind toward its spec.
///
/// Implementations compare desired state (the spec) with actual state in
/// the external backend and take actions to close the gap. Both operations
/// must be idempotent per identity: the engine will call them again for
/// unchanged objects on every re-sync.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// The desired-state type, author-owned.
    type Spec: Clone + Send + Sync + 'static;
    /// The observed-state type, engine-owned.
    type Status: ObjectStatus;

    /// Compute the status the object should have, performing any external
    /// actions required to get there.
    async fn reconcile(
        &self,
        object: &Object<Self::Spec, Self::Status>,
    ) -> Result<Self::Status, ReconcileError>;

    /// Release externally provisioned state before the object is removed.
    /// Must tolerate being called on an already-released resource.
    async fn finalize(
        &self,
        object: &Object<Self::Spec, Self::Status>,
    ) -> Result<(), ReconcileError>;
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Kind label used in logs.
    pub kind: String,
    /// Maximum concurrent passes across distinct identities.
    pub workers: usize,
    /// Interval of the periodic full re-list.
    pub resync_interval: Duration,
    /// Deadline for a single pass's adapter work.
    pub pass_deadline: Duration,
    /// Retry policy for transient failures.
    pub backoff: Backoff,
    /// Finalizer installed on objects whose reconciler provisions external
    /// state; `None` for kinds with nothing to release.
    pub finalizer: Option<String>,
}

impl EngineConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            workers: 4,
            resync_interval: Duration::from_secs(30),
            pass_deadline: Duration::from_secs(30),
            backoff: Backoff::default(),
            finalizer: None,
        }
    }
}

/// What a single reconciliation pass concluded.
enum PassOutcome {
    /// The pass ran to completion; status matches the adapter's result.
    Reconciled,
    /// The object no longer exists; all per-identity state is dropped.
    Gone,
    /// Halted generation, adapter not invoked.
    Skipped,
    /// Transient trouble; retry with backoff.
    Retry(String),
    /// The spec at this generation can never succeed; wait for an edit.
    Halt { generation: u64 },
}

struct PassResult {
    object_ref: ObjectRef,
    outcome: PassOutcome,
}

/// Reconciliation engine for one resource kind.
pub struct Engine<R, S> {
    reconciler: Arc<R>,
    store: Arc<S>,
    config: EngineConfig,
}

impl<R, S> Engine<R, S>
where
    R: Reconciler,
    S: ObjectStore<Spec = R::Spec, Status = R::Status> + 'static,
{
    pub fn new(reconciler: Arc<R>, store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            reconciler,
            store,
            config,
        }
    }

    /// Run until `shutdown` flips to true, then drain in-flight passes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.store.subscribe();
        let mut resync = interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (done_tx, mut done_rx) = mpsc::channel::<PassResult>(64);
        let (retry_tx, mut retry_rx) = mpsc::channel::<ObjectRef>(64);

        // Scheduler state. Invariant: an identity is in at most one of
        // `queue` and `inflight`; `dirty` marks in-flight identities that
        // must re-run once their current pass finishes.
        let mut queue: VecDeque<ObjectRef> = VecDeque::new();
        let mut queued: HashSet<ObjectRef> = HashSet::new();
        let mut inflight: HashSet<ObjectRef> = HashSet::new();
        let mut dirty: HashSet<ObjectRef> = HashSet::new();
        let mut attempts: HashMap<ObjectRef, u32> = HashMap::new();
        let mut halted: HashMap<ObjectRef, u64> = HashMap::new();
        let mut retries: HashMap<ObjectRef, JoinHandle<()>> = HashMap::new();

        info!(kind = %self.config.kind, "Reconciliation engine started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    // Our own status writes are not triggers.
                    Ok(Event::StatusUpdated(_)) => {}
                    Ok(event) => {
                        debug!(kind = %self.config.kind, object = %event.object_ref(), event = event.kind(), "Trigger");
                        enqueue(
                            event.object_ref().clone(),
                            &mut queue,
                            &mut queued,
                            &inflight,
                            &mut dirty,
                            &mut retries,
                        );
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(kind = %self.config.kind, missed, "Watch stream lagged, falling back to re-list");
                        self.enqueue_all(&mut queue, &mut queued, &inflight, &mut dirty, &mut retries)
                            .await;
                    }
                    Err(RecvError::Closed) => {
                        // The store owns the sender, so this only happens if
                        // the store itself went away.
                        warn!(kind = %self.config.kind, "Watch stream closed");
                        break;
                    }
                },
                _ = resync.tick() => {
                    self.enqueue_all(&mut queue, &mut queued, &inflight, &mut dirty, &mut retries)
                        .await;
                }
                Some(object_ref) = retry_rx.recv() => {
                    retries.remove(&object_ref);
                    enqueue(object_ref, &mut queue, &mut queued, &inflight, &mut dirty, &mut retries);
                }
                Some(result) = done_rx.recv() => {
                    let PassResult { object_ref, outcome } = result;
                    inflight.remove(&object_ref);
                    match outcome {
                        PassOutcome::Reconciled => {
                            attempts.remove(&object_ref);
                            halted.remove(&object_ref);
                        }
                        PassOutcome::Gone => {
                            attempts.remove(&object_ref);
                            halted.remove(&object_ref);
                            dirty.remove(&object_ref);
                            if let Some(handle) = retries.remove(&object_ref) {
                                handle.abort();
                            }
                        }
                        PassOutcome::Skipped => {}
                        PassOutcome::Retry(message) => {
                            let attempt = attempts.entry(object_ref.clone()).or_insert(0);
                            let delay = self.config.backoff.delay(*attempt);
                            *attempt += 1;
                            warn!(
                                kind = %self.config.kind,
                                object = %object_ref,
                                attempt = *attempt,
                                "Reconciliation failed ({}), retrying in {:?}",
                                message,
                                delay,
                            );
                            // A trigger that already arrived supersedes the
                            // backoff requeue.
                            if !queued.contains(&object_ref) && !dirty.contains(&object_ref) {
                                let tx = retry_tx.clone();
                                let target = object_ref.clone();
                                let handle = tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    let _ = tx.send(target).await;
                                });
                                if let Some(old) = retries.insert(object_ref.clone(), handle) {
                                    old.abort();
                                }
                            }
                        }
                        PassOutcome::Halt { generation } => {
                            attempts.remove(&object_ref);
                            halted.insert(object_ref.clone(), generation);
                        }
                    }
                    if dirty.remove(&object_ref) {
                        enqueue(object_ref, &mut queue, &mut queued, &inflight, &mut dirty, &mut retries);
                    }
                }
            }

            // Dispatch pending work up to the worker budget.
            while inflight.len() < self.config.workers {
                let Some(object_ref) = queue.pop_front() else {
                    break;
                };
                queued.remove(&object_ref);
                inflight.insert(object_ref.clone());

                let reconciler = Arc::clone(&self.reconciler);
                let store = Arc::clone(&self.store);
                let halted_generation = halted.get(&object_ref).copied();
                let deadline = self.config.pass_deadline;
                let finalizer = self.config.finalizer.clone();
                let done = done_tx.clone();
                tokio::spawn(async move {
                    let outcome = run_pass(
                        reconciler,
                        store,
                        &object_ref,
                        halted_generation,
                        deadline,
                        finalizer.as_deref(),
                    )
                    .await;
                    let _ = done.send(PassResult { object_ref, outcome }).await;
                });
            }
        }

        // Let in-flight passes finish so no status write is torn off
        // mid-flight; their outcomes no longer matter.
        if !inflight.is_empty() {
            debug!(kind = %self.config.kind, inflight = inflight.len(), "Draining in-flight passes");
            while !inflight.is_empty() {
                match done_rx.recv().await {
                    Some(result) => {
                        inflight.remove(&result.object_ref);
                    }
                    None => break,
                }
            }
        }
        for handle in retries.into_values() {
            handle.abort();
        }
        info!(kind = %self.config.kind, "Reconciliation engine stopped");
    }

    /// Queue every object of the kind (periodic re-sync, lag recovery).
    async fn enqueue_all(
        &self,
        queue: &mut VecDeque<ObjectRef>,
        queued: &mut HashSet<ObjectRef>,
        inflight: &HashSet<ObjectRef>,
        dirty: &mut HashSet<ObjectRef>,
        retries: &mut HashMap<ObjectRef, JoinHandle<()>>,
    ) {
        match self.store.list().await {
            Ok(objects) => {
                for object in objects {
                    enqueue(object.object_ref(), queue, queued, inflight, dirty, retries);
                }
            }
            Err(e) => {
                warn!(kind = %self.config.kind, error = %e, "Re-list failed");
            }
        }
    }
}

/// Queue a trigger for an identity, coalescing with anything already
/// pending and deferring behind an in-flight pass.
fn enqueue(
    object_ref: ObjectRef,
    queue: &mut VecDeque<ObjectRef>,
    queued: &mut HashSet<ObjectRef>,
    inflight: &HashSet<ObjectRef>,
    dirty: &mut HashSet<ObjectRef>,
    retries: &mut HashMap<ObjectRef, JoinHandle<()>>,
) {
    // An explicit trigger supersedes a scheduled backoff requeue.
    if let Some(handle) = retries.remove(&object_ref) {
        handle.abort();
    }
    if inflight.contains(&object_ref) {
        dirty.insert(object_ref);
        return;
    }
    if queued.insert(object_ref.clone()) {
        queue.push_back(object_ref);
    }
}

/// One reconciliation pass for one identity.
async fn run_pass<R, S>(
    reconciler: Arc<R>,
    store: Arc<S>,
    object_ref: &ObjectRef,
    halted_generation: Option<u64>,
    deadline: Duration,
    finalizer: Option<&str>,
) -> PassOutcome
where
    R: Reconciler,
    S: ObjectStore<Spec = R::Spec, Status = R::Status>,
{
    // Re-fetch at the start of every pass; the trigger may be stale.
    let mut object = match store.get(object_ref).await {
        Ok(Some(object)) => object,
        // Deleted between trigger and fetch: a no-op success.
        Ok(None) => return PassOutcome::Gone,
        Err(e) => return PassOutcome::Retry(format!("fetch failed: {}", e)),
    };

    if object.meta.is_deleting() {
        let Some(finalizer) = finalizer else {
            return PassOutcome::Gone;
        };
        if !object.meta.has_finalizer(finalizer) {
            return PassOutcome::Gone;
        }
        return match timeout(deadline, reconciler.finalize(&object)).await {
            Ok(Ok(())) => match store.remove_finalizer(object_ref, finalizer).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!(object = %object_ref, "Released external state, deletion complete");
                    PassOutcome::Gone
                }
                Err(e) => PassOutcome::Retry(format!("finalizer removal failed: {}", e)),
            },
            // Deletion is retried, never forced: removing the object with a
            // failed release would orphan the external resource.
            Ok(Err(e)) => PassOutcome::Retry(format!("release failed: {}", e)),
            Err(_) => PassOutcome::Retry(format!("release deadline ({:?}) exceeded", deadline)),
        };
    }

    if halted_generation == Some(object.meta.generation) {
        debug!(object = %object_ref, generation = object.meta.generation, "Skipping halted generation");
        return PassOutcome::Skipped;
    }

    // Install the finalizer before the first provisioning call so a crash
    // between the two cannot leak external state.
    if let Some(finalizer) = finalizer {
        if !object.meta.has_finalizer(finalizer) {
            object = match store.set_finalizer(object_ref, finalizer).await {
                Ok(object) => object,
                Err(StoreError::NotFound(_)) => return PassOutcome::Gone,
                Err(e) => return PassOutcome::Retry(format!("finalizer install failed: {}", e)),
            };
        }
    }

    match timeout(deadline, reconciler.reconcile(&object)).await {
        Ok(Ok(status)) => write_status(store.as_ref(), object, status).await,
        Ok(Err(ReconcileError::Transient(message))) => PassOutcome::Retry(message),
        Ok(Err(ReconcileError::Permanent(message))) => {
            error!(object = %object_ref, "Reconciliation failed permanently: {}", message);
            let generation = object.meta.generation;
            match write_status(store.as_ref(), object, R::Status::failed(message)).await {
                PassOutcome::Reconciled => PassOutcome::Halt { generation },
                other => other,
            }
        }
        Err(_) => PassOutcome::Retry(format!("pass deadline ({:?}) exceeded", deadline)),
    }
}

/// Write a status atomically, resolving optimistic-concurrency conflicts by
/// re-fetching and retrying immediately.
async fn write_status<S>(
    store: &S,
    mut object: Object<S::Spec, S::Status>,
    status: S::Status,
) -> PassOutcome
where
    S: ObjectStore,
    S::Status: ObjectStatus,
{
    let object_ref = object.object_ref();
    loop {
        // Unchanged status: the write would be a no-op, skip it.
        if object.status == status {
            return PassOutcome::Reconciled;
        }
        match store
            .update_status(&object_ref, status.clone(), object.meta.resource_version)
            .await
        {
            Ok(_) => return PassOutcome::Reconciled,
            Err(StoreError::Conflict { .. }) => match store.get(&object_ref).await {
                Ok(Some(current)) => {
                    if current.meta.generation != object.meta.generation {
                        // The spec moved mid-pass; this result is stale and
                        // the edit has already queued a fresh pass.
                        debug!(object = %object_ref, "Dropping stale status write");
                        return PassOutcome::Reconciled;
                    }
                    object = current;
                }
                Ok(None) => return PassOutcome::Gone,
                Err(e) => return PassOutcome::Retry(format!("re-fetch after conflict failed: {}", e)),
            },
            Err(StoreError::NotFound(_)) => return PassOutcome::Gone,
            Err(e) => return PassOutcome::Retry(format!("status write failed: {}", e)),
        }
    }
}
