//! Mirror loop: polls an external feed and creates derived objects.
//!
//! Mirrored entities come from a system the control plane does not own and
//! cannot watch, so the loop alternates between listing and sleeping for
//! the lifetime of the process. Creates are idempotent and the loop never
//! updates or deletes an object it finds already present: once created,
//! ownership passes to whoever edits the object next.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapter::MirrorAdapter;
use crate::store::{ObjectStore, StoreError};

pub const DEFAULT_MIRROR_INTERVAL: Duration = Duration::from_secs(5);

/// Counters for one mirror pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Entities returned by the adapter.
    pub listed: usize,
    /// Derived objects created this pass.
    pub created: usize,
    /// Entities skipped: not yet eligible, or already mirrored.
    pub skipped: usize,
    /// Entities whose create failed; retried implicitly next pass.
    pub failed: usize,
}

/// Continuously mirrors external entities into derived objects of one kind.
pub struct MirrorLoop<M, S> {
    adapter: M,
    store: Arc<S>,
    namespace: String,
    interval: Duration,
}

impl<M, S> MirrorLoop<M, S>
where
    M: MirrorAdapter,
    S: ObjectStore<Spec = M::Spec>,
{
    pub fn new(adapter: M, store: Arc<S>, namespace: impl Into<String>, interval: Duration) -> Self {
        Self {
            adapter,
            store,
            namespace: namespace.into(),
            interval,
        }
    }

    /// Run listing passes on the fixed interval until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(namespace = %self.namespace, interval = ?self.interval, "Mirror loop started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let stats = self.sync_once().await;
                    debug!(
                        listed = stats.listed,
                        created = stats.created,
                        skipped = stats.skipped,
                        failed = stats.failed,
                        "Mirror pass complete",
                    );
                }
            }
        }
        info!(namespace = %self.namespace, "Mirror loop stopped");
    }

    /// One listing pass: create a derived object for every eligible entity
    /// that does not have one yet.
    pub async fn sync_once(&self) -> MirrorStats {
        let mut stats = MirrorStats::default();

        let existing: HashSet<String> = match self.store.list().await {
            Ok(objects) => objects.into_iter().map(|o| o.meta.name).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list derived objects, skipping pass");
                return stats;
            }
        };

        // A backend failure means fewer entities this pass, never a crash.
        let entities = match self.adapter.list_entities().await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "Failed to list external entities, skipping pass");
                return stats;
            }
        };
        stats.listed = entities.len();

        for entity in &entities {
            let Some((name, spec)) = self.adapter.derive(entity) else {
                // Not yet eligible, e.g. no address assigned.
                stats.skipped += 1;
                continue;
            };
            if existing.contains(&name) {
                stats.skipped += 1;
                continue;
            }
            match self.store.create(&self.namespace, &name, spec).await {
                Ok(_) => {
                    info!(namespace = %self.namespace, object = %name, "Mirrored new entity");
                    stats.created += 1;
                }
                // Someone beat us to it; a derived object existing is the
                // goal state, not an error.
                Err(StoreError::AlreadyExists(_)) => stats.skipped += 1,
                Err(e) => {
                    error!(namespace = %self.namespace, object = %name, error = %e, "Failed to create mirrored object");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
