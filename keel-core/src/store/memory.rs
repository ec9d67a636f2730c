//! In-process object store backing tests and the standalone manager.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{Event, ObjectStore, Result, StoreError};
use crate::object::{Object, ObjectMeta, ObjectRef};

/// HashMap-backed store with broadcast change events.
pub struct MemoryStore<S, St> {
    objects: RwLock<HashMap<ObjectRef, Object<S, St>>>,
    events: broadcast::Sender<Event>,
}

impl<S, St> MemoryStore<S, St> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

impl<S, St> Default for MemoryStore<S, St> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S, St> ObjectStore for MemoryStore<S, St>
where
    S: Clone + Send + Sync + 'static,
    St: Clone + Default + Send + Sync + 'static,
{
    type Spec = S;
    type Status = St;

    async fn get(&self, object_ref: &ObjectRef) -> Result<Option<Object<S, St>>> {
        Ok(self.objects.read().await.get(object_ref).cloned())
    }

    async fn list(&self) -> Result<Vec<Object<S, St>>> {
        let mut objects: Vec<_> = self.objects.read().await.values().cloned().collect();
        objects.sort_by(|a, b| a.object_ref().cmp(&b.object_ref()));
        Ok(objects)
    }

    async fn create(&self, namespace: &str, name: &str, spec: S) -> Result<Object<S, St>> {
        let object_ref = ObjectRef::new(namespace, name);
        let mut objects = self.objects.write().await;
        if objects.contains_key(&object_ref) {
            return Err(StoreError::AlreadyExists(object_ref.to_string()));
        }
        let now = Utc::now().to_rfc3339();
        let object = Object {
            meta: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                uid: Uuid::new_v4().to_string(),
                generation: 1,
                resource_version: 1,
                created_at: now.clone(),
                updated_at: now,
                deletion_timestamp: None,
                finalizers: vec![],
            },
            spec,
            status: St::default(),
        };
        objects.insert(object_ref.clone(), object.clone());
        drop(objects);
        self.emit(Event::Created(object_ref));
        Ok(object)
    }

    async fn update_spec(&self, object_ref: &ObjectRef, spec: S) -> Result<Object<S, St>> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(object_ref)
            .ok_or_else(|| StoreError::NotFound(object_ref.to_string()))?;
        object.spec = spec;
        object.meta.generation += 1;
        object.meta.resource_version += 1;
        object.meta.updated_at = Utc::now().to_rfc3339();
        let updated = object.clone();
        drop(objects);
        self.emit(Event::Updated(object_ref.clone()));
        Ok(updated)
    }

    async fn update_status(
        &self,
        object_ref: &ObjectRef,
        status: St,
        expected_version: u64,
    ) -> Result<Object<S, St>> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(object_ref)
            .ok_or_else(|| StoreError::NotFound(object_ref.to_string()))?;
        if object.meta.resource_version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: object.meta.resource_version,
            });
        }
        object.status = status;
        object.meta.resource_version += 1;
        object.meta.updated_at = Utc::now().to_rfc3339();
        let updated = object.clone();
        drop(objects);
        self.emit(Event::StatusUpdated(object_ref.clone()));
        Ok(updated)
    }

    async fn delete(&self, object_ref: &ObjectRef) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(object_ref)
            .ok_or_else(|| StoreError::NotFound(object_ref.to_string()))?;
        if object.meta.finalizers.is_empty() {
            objects.remove(object_ref);
            drop(objects);
            self.emit(Event::Deleted(object_ref.clone()));
        } else if object.meta.deletion_timestamp.is_none() {
            object.meta.deletion_timestamp = Some(Utc::now().to_rfc3339());
            object.meta.resource_version += 1;
            object.meta.updated_at = Utc::now().to_rfc3339();
            drop(objects);
            self.emit(Event::Updated(object_ref.clone()));
        }
        // Deletion already requested: nothing more to do.
        Ok(())
    }

    async fn set_finalizer(&self, object_ref: &ObjectRef, finalizer: &str) -> Result<Object<S, St>> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(object_ref)
            .ok_or_else(|| StoreError::NotFound(object_ref.to_string()))?;
        if object.meta.has_finalizer(finalizer) {
            return Ok(object.clone());
        }
        object.meta.finalizers.push(finalizer.to_string());
        object.meta.resource_version += 1;
        object.meta.updated_at = Utc::now().to_rfc3339();
        let updated = object.clone();
        drop(objects);
        self.emit(Event::Updated(object_ref.clone()));
        Ok(updated)
    }

    async fn remove_finalizer(&self, object_ref: &ObjectRef, finalizer: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(object_ref)
            .ok_or_else(|| StoreError::NotFound(object_ref.to_string()))?;
        if !object.meta.has_finalizer(finalizer) {
            return Ok(());
        }
        object.meta.finalizers.retain(|f| f != finalizer);
        if object.meta.is_deleting() && object.meta.finalizers.is_empty() {
            objects.remove(object_ref);
            drop(objects);
            self.emit(Event::Deleted(object_ref.clone()));
        } else {
            object.meta.resource_version += 1;
            object.meta.updated_at = Utc::now().to_rfc3339();
            drop(objects);
            self.emit(Event::Updated(object_ref.clone()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
