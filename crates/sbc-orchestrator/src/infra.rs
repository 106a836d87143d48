//! Proxy and relay container definitions for one instance.

use sbc_core::{CERTIFICATE_VOLUME, ContainerKind};
use sbc_engine::{ContainerSpec, NetworkMode};
use sbc_state::InstanceRecord;

use crate::settings::Settings;

pub const PROXY_CONFIG_MOUNT: &str = "/etc/kamailio";
pub const PROXY_CAPTURE_MOUNT: &str = "/tmp";
pub const PROXY_CERTIFICATE_MOUNT: &str = "/cert";
pub const RELAY_TMP_MOUNT: &str = "/tmp";

pub fn proxy_config_volume(name: &str) -> String {
    format!("{name}-proxy-config")
}

pub fn capture_volume(name: &str) -> String {
    format!("{name}-capture")
}

pub fn relay_tmp_volume(name: &str) -> String {
    format!("{name}-relay-tmp")
}

pub fn relay_spec(record: &InstanceRecord, settings: &Settings) -> ContainerSpec {
    ContainerSpec::new(
        ContainerKind::Relay.container_name(&record.name),
        &settings.images.relay,
    )
    .env("RTP_MAX", record.media_max)
    .env("RTP_MIN", record.media_min)
    .env("MEDIA_PUB_IP", &record.media_public_ip)
    .env("NG_LISTEN", record.relay_listen_port)
    .volume(relay_tmp_volume(&record.name), RELAY_TMP_MOUNT)
    .restart_policy(settings.restart_policy)
    .network_mode(NetworkMode::Host)
}

/// `cert_folder` names the directory inside the shared certificate volume,
/// which is the certificate authority's primary domain.
pub fn proxy_spec(record: &InstanceRecord, cert_folder: &str, settings: &Settings) -> ContainerSpec {
    ContainerSpec::new(
        ContainerKind::Proxy.container_name(&record.name),
        &settings.images.proxy,
    )
    .env("NEW_CONFIG", record.regenerate_config)
    .env("EN_DUMP", record.packet_capture)
    .env("ADVERTISE_IP", &record.name)
    .env("ALIAS", &record.name)
    .env("SBC_NAME", &record.name)
    .env("CERT_FOLDER_NAME", cert_folder)
    .env("SBC_PORT", record.tls_port)
    .env("HOST_IP", &record.host_ip)
    .env("UDP_SIP_PORT", record.udp_port)
    .env("PBX_IP", &record.pbx_address)
    .env("PBX_PORT", record.pbx_port)
    .env("RTP_ENG_IP", &record.host_ip)
    .env("RTP_ENG_PORT", record.relay_port)
    .volume(proxy_config_volume(&record.name), PROXY_CONFIG_MOUNT)
    .volume(capture_volume(&record.name), PROXY_CAPTURE_MOUNT)
    .volume(CERTIFICATE_VOLUME, PROXY_CERTIFICATE_MOUNT)
    .restart_policy(settings.restart_policy)
    .network_mode(NetworkMode::Host)
}
