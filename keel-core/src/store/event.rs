//! Events emitted by object changes.

use crate::object::ObjectRef;

/// Events dispatched via broadcast channels to store subscribers.
///
/// Delivery is at-least-once; receivers that lag are expected to fall back
/// to a full re-list. Status writes are a distinct variant so a controller
/// can tell its own writes apart from author edits.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new object was created.
    Created(ObjectRef),
    /// An object's spec or metadata changed.
    Updated(ObjectRef),
    /// An object's status was written by a controller.
    StatusUpdated(ObjectRef),
    /// An object was removed from the store.
    Deleted(ObjectRef),
}

impl Event {
    /// Get the identity this event refers to.
    pub fn object_ref(&self) -> &ObjectRef {
        match self {
            Event::Created(r) | Event::Updated(r) | Event::StatusUpdated(r) | Event::Deleted(r) => {
                r
            }
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Created(_) => "created",
            Event::Updated(_) => "updated",
            Event::StatusUpdated(_) => "status-updated",
            Event::Deleted(_) => "deleted",
        }
    }
}
