//! Device mirror - maps stations observed by the network backend to
//! derived device objects named by their address.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use keel_core::{MirrorAdapter, ReconcileError};

use crate::resources::DeviceSpec;

/// A station as reported by the network backend.
#[derive(Debug, Clone)]
pub struct Station {
    pub mac: String,
    /// Unset until the backend has assigned an address.
    pub ip: Option<String>,
    pub hostname: String,
    pub name: String,
    /// Unix timestamp (seconds) of the last time the station was seen.
    pub last_seen: i64,
}

/// Source of station observations.
#[async_trait]
pub trait StationSource: Send + Sync + 'static {
    async fn list_stations(&self) -> Result<Vec<Station>, ReconcileError>;
}

/// Mirror adapter turning stations into device objects. A station without
/// an address has no derivable identity yet and is skipped.
pub struct DeviceMirror<C> {
    network: C,
}

impl<C> DeviceMirror<C> {
    pub fn new(network: C) -> Self {
        Self { network }
    }
}

#[async_trait]
impl<C> MirrorAdapter for DeviceMirror<C>
where
    C: StationSource,
{
    type Entity = Station;
    type Spec = DeviceSpec;

    async fn list_entities(&self) -> Result<Vec<Station>, ReconcileError> {
        self.network.list_stations().await
    }

    fn derive(&self, station: &Station) -> Option<(String, DeviceSpec)> {
        let ip = station.ip.as_deref().filter(|ip| !ip.is_empty())?;
        Some((
            ip.to_string(),
            DeviceSpec {
                mac: station.mac.clone(),
                ip: ip.to_string(),
                hostname: station.hostname.clone(),
                name: station.name.clone(),
                last_seen: format_last_seen(station.last_seen),
            },
        ))
    }
}

/// The backend reports epoch seconds; derived specs store RFC 3339.
fn format_last_seen(epoch_secs: i64) -> String {
    Utc.timestamp_opt(epoch_secs, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}
