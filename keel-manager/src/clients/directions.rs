//! Client for the directions backend.

use async_trait::async_trait;
use tracing::debug;

use keel_core::{QueryAdapter, ReconcileError};

use crate::reconciler::route::Route;
use crate::resources::RouteSpec;

/// Client for the external directions service.
pub struct DirectionsClient {
    endpoint: String,
}

impl DirectionsClient {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl QueryAdapter for DirectionsClient {
    type Request = RouteSpec;
    type Reply = Route;

    async fn query(&self, request: &RouteSpec) -> Result<Option<Route>, ReconcileError> {
        debug!(
            endpoint = %self.endpoint,
            source = %request.source,
            destination = %request.destination,
            "Querying directions",
        );
        // TODO: Implement the HTTP call against the directions API
        Ok(None)
    }
}
