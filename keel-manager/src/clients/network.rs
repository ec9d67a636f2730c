//! Client for the network-management backend.

use async_trait::async_trait;
use tracing::debug;

use keel_core::ReconcileError;

use crate::reconciler::device::{Station, StationSource};

/// Client for the external network controller.
pub struct NetworkClient {
    endpoint: String,
    /// Site whose connected stations are listed.
    site: String,
}

impl NetworkClient {
    pub fn new(endpoint: String, site: String) -> Self {
        Self { endpoint, site }
    }
}

#[async_trait]
impl StationSource for NetworkClient {
    async fn list_stations(&self) -> Result<Vec<Station>, ReconcileError> {
        debug!(endpoint = %self.endpoint, site = %self.site, "Listing connected stations");
        // TODO: Implement the station listing against the network API
        Ok(vec![])
    }
}
