//! Domain types for the SBC state store.

use serde::{Deserialize, Serialize};

use sbc_core::config::PortDefaults;

/// Row identifier in any of the state store tables.
pub type RecordId = i64;

/// Everything needed to allocate and persist a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub fqdn: String,
    /// Upstream PBX the proxy forwards plain SIP to.
    pub pbx_address: String,
    pub pbx_port: u16,
    /// Public address the relay advertises for media.
    pub media_public_ip: String,
    /// LAN address of the container host.
    pub host_ip: String,
    pub regenerate_config: bool,
    pub packet_capture: bool,
    /// Ports used when no proxy/relay record exists yet.
    pub defaults: PortDefaults,
}

impl ProvisionRequest {
    pub fn new(fqdn: &str, pbx_address: &str, media_public_ip: &str) -> Self {
        let defaults = PortDefaults::default();
        Self {
            fqdn: fqdn.to_string(),
            pbx_address: pbx_address.to_string(),
            pbx_port: defaults.pbx,
            media_public_ip: media_public_ip.to_string(),
            host_ip: String::new(),
            regenerate_config: true,
            packet_capture: false,
            defaults,
        }
    }
}

/// Row ids written by one `allocate_and_save` call, used to undo it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedIds {
    pub proxy: RecordId,
    pub relay: RecordId,
    pub instance: RecordId,
}

/// Denormalized view of an instance and both of its config rows.
///
/// A default (empty) record is returned for unknown instance ids; check
/// [`InstanceRecord::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: RecordId,
    pub proxy_id: RecordId,
    pub relay_id: RecordId,
    pub fqdn: String,
    /// Container name prefix.
    pub name: String,
    /// Unix timestamp (seconds) when the instance was stored.
    pub created_at: u64,
    pub tls_port: u16,
    pub udp_port: u16,
    pub pbx_address: String,
    pub pbx_port: u16,
    /// Relay signalling port the proxy talks to.
    pub relay_port: u16,
    pub host_ip: String,
    pub regenerate_config: bool,
    pub packet_capture: bool,
    pub media_min: u16,
    pub media_max: u16,
    pub media_public_ip: String,
    /// Relay's own signalling listen port.
    pub relay_listen_port: u16,
    pub proxy_container_id: Option<String>,
    pub relay_container_id: Option<String>,
}

impl InstanceRecord {
    pub fn is_empty(&self) -> bool {
        self.fqdn.is_empty()
    }
}

/// Engine ids of the two containers an instance owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceContainers {
    pub proxy: String,
    pub relay: String,
}

impl InstanceContainers {
    /// Proxy first, then relay.
    pub fn ids(&self) -> [&str; 2] {
        [self.proxy.as_str(), self.relay.as_str()]
    }
}
