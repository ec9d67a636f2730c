//! Controller audit trail.
//!
//! Object lifecycle events are logged on the dedicated `audit` target so
//! operators can filter them from regular diagnostics. The trail is fed
//! from each kind's store event stream.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use keel_core::{Event, ObjectRef};

/// Audit logger for one resource kind.
pub struct ControllerAudit {
    kind: &'static str,
}

impl ControllerAudit {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }

    pub fn object_created(&self, object: &ObjectRef) {
        info!(target: "audit", kind = %self.kind, object = %object, "Object created");
    }

    pub fn object_updated(&self, object: &ObjectRef) {
        info!(target: "audit", kind = %self.kind, object = %object, "Spec or metadata updated");
    }

    pub fn status_updated(&self, object: &ObjectRef) {
        info!(target: "audit", kind = %self.kind, object = %object, "Status updated");
    }

    pub fn object_deleted(&self, object: &ObjectRef) {
        info!(target: "audit", kind = %self.kind, object = %object, "Object deleted");
    }

    /// Spawn a task forwarding store events to the audit trail until the
    /// store goes away.
    pub fn watch(self, mut events: broadcast::Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(Event::Created(r)) => self.object_created(&r),
                    Ok(Event::Updated(r)) => self.object_updated(&r),
                    Ok(Event::StatusUpdated(r)) => self.status_updated(&r),
                    Ok(Event::Deleted(r)) => self.object_deleted(&r),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(target: "audit", kind = %self.kind, missed, "Audit trail lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
