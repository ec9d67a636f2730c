//! Backend adapter contracts.
//!
//! Adapters are the only seam between the control loops and external
//! systems. Each adapter constructs its errors as [`ReconcileError`]
//! variants at the boundary, so every backend failure maps to exactly one
//! retry outcome.

use async_trait::async_trait;

use crate::error::ReconcileError;

/// Stateless lookup against an external system.
#[async_trait]
pub trait QueryAdapter: Send + Sync + 'static {
    type Request: Send + Sync;
    type Reply: Send;

    /// `Ok(None)` is a normal "nothing found" outcome, not an error. Must
    /// not mutate external state.
    async fn query(&self, request: &Self::Request) -> Result<Option<Self::Reply>, ReconcileError>;
}

/// Read-only feed of entities observed in an external system.
#[async_trait]
pub trait MirrorAdapter: Send + Sync + 'static {
    type Entity: Send;
    type Spec: Send;

    /// May return fewer entities on partial backend failure; the mirror
    /// loop treats that as "fewer entities this pass".
    async fn list_entities(&self) -> Result<Vec<Self::Entity>, ReconcileError>;

    /// Derived object name and spec for an entity, or `None` while the
    /// entity is not yet eligible for mirroring (e.g. no address assigned).
    /// The mapping must be deterministic for an unchanged entity.
    fn derive(&self, entity: &Self::Entity) -> Option<(String, Self::Spec)>;
}

/// Result of an idempotent ensure call.
#[derive(Debug, Clone)]
pub struct Ensured<T> {
    pub state: T,
    /// The external resource already matched the spec; no action was taken.
    pub already_satisfied: bool,
}

/// Idempotent create/upgrade of an external deployment.
#[async_trait]
pub trait ProvisioningAdapter: Send + Sync + 'static {
    type Spec: Send + Sync;
    type State: Send;

    /// Safe to call repeatedly with an unchanged spec: at most one external
    /// resource is created per identity.
    async fn ensure(&self, spec: &Self::Spec) -> Result<Ensured<Self::State>, ReconcileError>;

    /// Idempotent teardown used during finalization; tolerates an
    /// already-released resource.
    async fn release(&self, spec: &Self::Spec) -> Result<(), ReconcileError>;
}
