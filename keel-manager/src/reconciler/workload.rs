//! Workload controller - installs packaged workloads via the deployment
//! backend and tears them down on deletion.

use async_trait::async_trait;
use tracing::{debug, info};

use keel_core::{Object, ProvisioningAdapter, ReconcileError, Reconciler};

use crate::resources::{WorkloadPhase, WorkloadSpec, WorkloadStatus};

/// Finalizer guarding workload objects until their release is removed.
pub const WORKLOAD_FINALIZER: &str = "workload.release";

/// State reported by the deployment backend for an installed release.
#[derive(Debug, Clone)]
pub struct ReleaseState {
    pub name: String,
}

/// Reconciles workload objects against a deployment backend.
pub struct WorkloadReconciler<P> {
    deploy: P,
}

impl<P> WorkloadReconciler<P> {
    pub fn new(deploy: P) -> Self {
        Self { deploy }
    }
}

#[async_trait]
impl<P> Reconciler for WorkloadReconciler<P>
where
    P: ProvisioningAdapter<Spec = WorkloadSpec, State = ReleaseState>,
{
    type Spec = WorkloadSpec;
    type Status = WorkloadStatus;

    async fn reconcile(
        &self,
        object: &Object<WorkloadSpec, WorkloadStatus>,
    ) -> Result<WorkloadStatus, ReconcileError> {
        let spec = &object.spec;
        if spec.name.trim().is_empty() {
            return Err(ReconcileError::permanent("release name must be set"));
        }
        if spec.chart_version.trim().is_empty() {
            return Err(ReconcileError::permanent("chart version must be set"));
        }

        let ensured = self.deploy.ensure(spec).await?;
        if ensured.already_satisfied {
            debug!(object = %object.object_ref(), release = %ensured.state.name, "Release already installed");
        } else {
            info!(object = %object.object_ref(), release = %ensured.state.name, version = %spec.chart_version, "Installed release");
        }

        Ok(WorkloadStatus {
            phase: WorkloadPhase::Provisioned,
            release: ensured.state.name,
            error: String::new(),
        })
    }

    async fn finalize(
        &self,
        object: &Object<WorkloadSpec, WorkloadStatus>,
    ) -> Result<(), ReconcileError> {
        info!(object = %object.object_ref(), release = %object.spec.name, "Removing installed release");
        self.deploy.release(&object.spec).await
    }
}
