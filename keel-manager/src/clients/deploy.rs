//! Client for the deployment backend.

use async_trait::async_trait;
use tracing::debug;

use keel_core::{Ensured, ProvisioningAdapter, ReconcileError};

use crate::reconciler::workload::ReleaseState;
use crate::resources::WorkloadSpec;

/// Client for the external deployment service.
pub struct DeployClient {
    endpoint: String,
    /// Chart repository releases are installed from.
    chart_repo: String,
}

impl DeployClient {
    pub fn new(endpoint: String, chart_repo: String) -> Self {
        Self {
            endpoint,
            chart_repo,
        }
    }
}

#[async_trait]
impl ProvisioningAdapter for DeployClient {
    type Spec = WorkloadSpec;
    type State = ReleaseState;

    async fn ensure(&self, spec: &WorkloadSpec) -> Result<Ensured<ReleaseState>, ReconcileError> {
        debug!(
            endpoint = %self.endpoint,
            chart_repo = %self.chart_repo,
            release = %spec.name,
            version = %spec.chart_version,
            "Ensuring release",
        );
        // TODO: Implement install-or-upgrade against the deployment API
        Ok(Ensured {
            state: ReleaseState {
                name: spec.name.clone(),
            },
            already_satisfied: false,
        })
    }

    async fn release(&self, spec: &WorkloadSpec) -> Result<(), ReconcileError> {
        debug!(endpoint = %self.endpoint, release = %spec.name, "Removing release");
        // TODO: Implement uninstall against the deployment API
        Ok(())
    }
}
