//! keel-core: reconciliation control-loop core.
//!
//! Keeps versioned resource objects converged with external backends:
//! a level-triggered reconciliation engine with per-identity serialization,
//! bounded retry and finalizer-based teardown, plus a polling mirror loop
//! for backends that cannot be watched. Backends sit behind the narrow
//! adapter contracts in [`adapter`]; the control plane sits behind the
//! [`store::ObjectStore`] contract.

pub mod adapter;
pub mod backoff;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod object;
pub mod store;

pub use adapter::{Ensured, MirrorAdapter, ProvisioningAdapter, QueryAdapter};
pub use backoff::Backoff;
pub use engine::{Engine, EngineConfig, Reconciler};
pub use error::ReconcileError;
pub use mirror::{MirrorLoop, MirrorStats};
pub use object::{Object, ObjectMeta, ObjectRef, ObjectStatus};
pub use store::{Event, MemoryStore, ObjectStore, StoreError};
