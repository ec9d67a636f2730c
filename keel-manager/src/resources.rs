//! Resource kinds managed by the controllers.

use serde::{Deserialize, Serialize};

use keel_core::ObjectStatus;

// =============================================================================
// Route
// =============================================================================

/// Desired state: a journey to resolve into driving directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Where the journey begins.
    pub source: String,
    /// Where the journey ends.
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoutePhase {
    #[default]
    Pending,
    Done,
    Failed,
}

/// Observed state written by the route controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteStatus {
    pub phase: RoutePhase,
    /// Step-by-step directions, one instruction per line.
    pub directions: String,
    pub route_summary: String,
    pub start_location: String,
    pub end_location: String,
    pub distance: String,
    pub duration: String,
    /// Populated when no route could be resolved; empty on success.
    pub error: String,
}

impl ObjectStatus for RouteStatus {
    fn failed(message: String) -> Self {
        Self {
            phase: RoutePhase::Failed,
            error: message,
            ..Self::default()
        }
    }
}

// =============================================================================
// Device (mirrored)
// =============================================================================

/// Spec copied from an observed station. The mirror loop creates these and
/// never touches them again; edits belong to whoever picks the object up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    pub name: String,
    /// RFC 3339 rendering of the backend's last-seen timestamp.
    pub last_seen: String,
}

/// Placeholder status for mirrored devices; no controller writes it today.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub error: String,
}

// =============================================================================
// Workload
// =============================================================================

/// Desired state: a packaged workload installed into a target namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Release name used by the deployment backend.
    pub name: String,
    /// Namespace the workload is installed into.
    pub namespace: String,
    /// Chart version to install or upgrade to.
    pub chart_version: String,
    /// Service CIDR handed to the chart values.
    pub service_cidr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkloadPhase {
    #[default]
    Pending,
    Provisioned,
    Failed,
}

/// Observed state written by the workload controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub phase: WorkloadPhase,
    /// Installed release name reported by the deployment backend.
    pub release: String,
    /// Populated on failure; empty on success.
    pub error: String,
}

impl ObjectStatus for WorkloadStatus {
    fn failed(message: String) -> Self {
        Self {
            phase: WorkloadPhase::Failed,
            error: message,
            ..Self::default()
        }
    }
}
