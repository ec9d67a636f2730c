//! Route controller - resolves journeys through the directions backend.

use async_trait::async_trait;
use tracing::info;

use keel_core::{Object, QueryAdapter, ReconcileError, Reconciler};

use crate::resources::{RoutePhase, RouteSpec, RouteStatus};

/// A resolved route as returned by the directions backend.
#[derive(Debug, Clone)]
pub struct Route {
    pub summary: String,
    /// Plain-text step instructions, in travel order.
    pub steps: Vec<String>,
    pub start_location: String,
    pub end_location: String,
    pub distance: String,
    pub duration: String,
}

/// Reconciles route objects against a directions query backend.
pub struct RouteReconciler<Q> {
    directions: Q,
}

impl<Q> RouteReconciler<Q> {
    pub fn new(directions: Q) -> Self {
        Self { directions }
    }
}

#[async_trait]
impl<Q> Reconciler for RouteReconciler<Q>
where
    Q: QueryAdapter<Request = RouteSpec, Reply = Route>,
{
    type Spec = RouteSpec;
    type Status = RouteStatus;

    async fn reconcile(
        &self,
        object: &Object<RouteSpec, RouteStatus>,
    ) -> Result<RouteStatus, ReconcileError> {
        let spec = &object.spec;
        if spec.source.trim().is_empty() || spec.destination.trim().is_empty() {
            return Err(ReconcileError::permanent(
                "source and destination must both be set",
            ));
        }

        info!(
            object = %object.object_ref(),
            source = %spec.source,
            destination = %spec.destination,
            "Determining journey",
        );

        let Some(route) = self.directions.query(spec).await? else {
            // No route is a result in its own right; stale directions must
            // not linger in status.
            return Ok(RouteStatus {
                phase: RoutePhase::Failed,
                error: format!(
                    "no route found from {} to {}",
                    spec.source, spec.destination
                ),
                ..RouteStatus::default()
            });
        };

        info!(object = %object.object_ref(), summary = %route.summary, "New route");
        Ok(RouteStatus {
            phase: RoutePhase::Done,
            directions: route.steps.join("\n"),
            route_summary: route.summary,
            start_location: route.start_location,
            end_location: route.end_location,
            distance: route.distance,
            duration: route.duration,
            error: String::new(),
        })
    }

    async fn finalize(
        &self,
        _object: &Object<RouteSpec, RouteStatus>,
    ) -> Result<(), ReconcileError> {
        // Routes provision nothing external.
        Ok(())
    }
}
