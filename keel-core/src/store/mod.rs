//! Object store contract and the in-process implementation.
//!
//! The store is the single source of truth for spec and status: authors
//! write specs, controllers write status, and every mutation is announced
//! on a broadcast event channel that controllers subscribe to.

mod error;
mod event;
mod memory;

pub use error::{Result, StoreError};
pub use event::Event;
pub use memory::MemoryStore;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::object::{Object, ObjectRef};

/// Read/write access to the versioned objects of one resource kind.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Author-owned desired state.
    type Spec: Clone + Send + Sync + 'static;
    /// Controller-owned observed state.
    type Status: Clone + Default + Send + Sync + 'static;

    /// Get an object by identity.
    async fn get(&self, object_ref: &ObjectRef) -> Result<Option<Object<Self::Spec, Self::Status>>>;

    /// List all objects of this kind, ordered by identity.
    async fn list(&self) -> Result<Vec<Object<Self::Spec, Self::Status>>>;

    /// Create a new object with a default status. Fails with
    /// [`StoreError::AlreadyExists`] if the identity is taken.
    async fn create(
        &self,
        namespace: &str,
        name: &str,
        spec: Self::Spec,
    ) -> Result<Object<Self::Spec, Self::Status>>;

    /// Replace an object's spec, bumping its generation.
    async fn update_spec(
        &self,
        object_ref: &ObjectRef,
        spec: Self::Spec,
    ) -> Result<Object<Self::Spec, Self::Status>>;

    /// Replace an object's status as a whole value.
    ///
    /// Fails with [`StoreError::Conflict`] if the object's resource version
    /// moved since `expected_version` was read; the caller re-fetches and
    /// retries.
    async fn update_status(
        &self,
        object_ref: &ObjectRef,
        status: Self::Status,
        expected_version: u64,
    ) -> Result<Object<Self::Spec, Self::Status>>;

    /// Request deletion. Objects without finalizers are removed at once;
    /// otherwise the deletion timestamp is set and removal completes when
    /// the last finalizer is gone.
    async fn delete(&self, object_ref: &ObjectRef) -> Result<()>;

    /// Add a finalizer if not already present.
    async fn set_finalizer(
        &self,
        object_ref: &ObjectRef,
        finalizer: &str,
    ) -> Result<Object<Self::Spec, Self::Status>>;

    /// Remove a finalizer; removing the last finalizer of a deletion-marked
    /// object completes the deletion.
    async fn remove_finalizer(&self, object_ref: &ObjectRef, finalizer: &str) -> Result<()>;

    /// Subscribe to change events for this kind.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}
