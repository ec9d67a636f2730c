//! keel-manager: controllers for the keel resource kinds.
//!
//! Wires the keel-core engine and mirror loop to three kinds:
//! - Routes are resolved through the directions backend
//! - Devices observed by the network backend are mirrored into the store
//! - Workloads are installed and torn down through the deployment backend

pub mod audit;
pub mod clients;
pub mod reconciler;
pub mod resources;
