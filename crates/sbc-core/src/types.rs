//! Shared types used across SBC crates.

use serde::{Deserialize, Serialize};

/// Named volume holding the certificate tree for every fqdn on the host.
pub const CERTIFICATE_VOLUME: &str = "certificates";

/// Fixed name of the certificate authority container.
pub const CERTIFICATE_AUTHORITY_CONTAINER: &str = "certificates-handler";

/// The three container roles an SBC host runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// SIP proxy (Kamailio), one per instance.
    Proxy,
    /// Media relay (RTP engine), one per instance.
    Relay,
    /// Certificate issuer shared by all instances.
    CertificateAuthority,
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContainerKind::Proxy => "proxy",
            ContainerKind::Relay => "relay",
            ContainerKind::CertificateAuthority => "certificate-authority",
        }
    }

    /// Engine-side container name. Per-instance kinds are prefixed with the
    /// instance name so several instances can share one engine.
    pub fn container_name(&self, instance_name: &str) -> String {
        match self {
            ContainerKind::Proxy => format!("{instance_name}-proxy"),
            ContainerKind::Relay => format!("{instance_name}-relay"),
            ContainerKind::CertificateAuthority => CERTIFICATE_AUTHORITY_CONTAINER.to_string(),
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_names_are_namespaced() {
        assert_eq!(ContainerKind::Proxy.container_name("a.example.com"), "a.example.com-proxy");
        assert_eq!(ContainerKind::Relay.container_name("a.example.com"), "a.example.com-relay");
        assert_eq!(
            ContainerKind::CertificateAuthority.container_name("ignored"),
            CERTIFICATE_AUTHORITY_CONTAINER
        );
    }
}
