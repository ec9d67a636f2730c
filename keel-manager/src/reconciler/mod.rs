//! Controllers for the managed resource kinds.
//!
//! Each controller compares desired state (the spec) with what its backend
//! reports and converges the two, reporting the outcome through status.

pub mod device;
pub mod route;
pub mod workload;
