//! Resource object model shared by every controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace-qualified identity of an object, unique within its kind and
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata maintained by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    /// Bumped on every spec update, never on status updates.
    pub generation: u64,
    /// Bumped on every mutation; the optimistic-concurrency token for
    /// status writes.
    pub resource_version: u64,
    pub created_at: String,
    pub updated_at: String,
    /// Set when deletion was requested while finalizers remain.
    pub deletion_timestamp: Option<String>,
    pub finalizers: Vec<String>,
}

impl ObjectMeta {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.name)
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

/// A versioned resource object: author-owned spec, controller-owned status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object<S, St> {
    pub meta: ObjectMeta,
    pub spec: S,
    pub status: St,
}

impl<S, St> Object<S, St> {
    pub fn object_ref(&self) -> ObjectRef {
        self.meta.object_ref()
    }
}

/// Status types the engine can write terminal failures into.
///
/// Status is replaced as a whole value on every write, never field by field.
/// `failed` builds the terminal variant with a populated error message.
pub trait ObjectStatus: Clone + Default + PartialEq + Send + Sync + 'static {
    fn failed(message: String) -> Self;
}
