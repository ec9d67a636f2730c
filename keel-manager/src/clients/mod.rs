//! Clients for the external backends.

mod deploy;
mod directions;
mod network;

pub use deploy::DeployClient;
pub use directions::DirectionsClient;
pub use network::NetworkClient;
