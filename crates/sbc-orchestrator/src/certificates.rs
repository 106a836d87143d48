//! Certificate authority container definition.
//!
//! One certificate authority serves every fqdn on the host. The first stored
//! fqdn is the primary domain; every other fqdn is requested as an extra
//! domain on the same certificate.

use sbc_core::{CERTIFICATE_VOLUME, ContainerKind, Fqdn};
use sbc_engine::{ContainerSpec, NetworkMode};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::settings::Settings;

/// Where the certificate authority keeps its certificate tree.
pub const CERTIFICATE_AUTHORITY_MOUNT: &str = "/config/etc/letsencrypt";

/// Container spec for a certificate authority covering `fqdns`, in stored
/// order.
pub fn certificate_authority_spec(
    fqdns: &[String],
    settings: &Settings,
) -> OrchestratorResult<ContainerSpec> {
    let (primary, extra) = fqdns.split_first().ok_or(OrchestratorError::NoDomains)?;
    let primary = Fqdn::parse(primary)?;

    let (url, subdomains, only_subdomains) = match primary.subdomain() {
        Some(sub) => (primary.base_domain(), sub, true),
        None => (primary.as_str(), "", false),
    };

    let cert = &settings.certificates;
    let spec = ContainerSpec::new(
        ContainerKind::CertificateAuthority.container_name(""),
        &settings.images.certificate_authority,
    )
    .env("PUID", cert.puid)
    .env("PGID", cert.pgid)
    .env("TZ", &cert.timezone)
    .env("VALIDATION", &cert.validation)
    .env("URL", url)
    .env("SUBDOMAINS", subdomains)
    .env("ONLY_SUBDOMAINS", only_subdomains)
    .env("EXTRA_DOMAINS", extra.join(","))
    .env("STAGING", cert.staging)
    .volume(CERTIFICATE_VOLUME, CERTIFICATE_AUTHORITY_MOUNT)
    .restart_policy(settings.restart_policy)
    .network_mode(NetworkMode::Host);

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fqdns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_primary_domain_split() {
        let spec = certificate_authority_spec(
            &fqdns(&["sbc1.example.com", "sbc2.example.com", "voice.other.org"]),
            &Settings::default(),
        )
        .unwrap();

        assert_eq!(spec.name, "certificates-handler");
        assert_eq!(spec.image, "linuxserver/swag");
        assert_eq!(spec.env_value("URL"), Some("example.com"));
        assert_eq!(spec.env_value("SUBDOMAINS"), Some("sbc1"));
        assert_eq!(spec.env_value("ONLY_SUBDOMAINS"), Some("true"));
        assert_eq!(
            spec.env_value("EXTRA_DOMAINS"),
            Some("sbc2.example.com,voice.other.org")
        );
        assert_eq!(spec.env_value("STAGING"), Some("false"));
        assert_eq!(spec.env_value("TZ"), Some("Europe/Belgrade"));
        assert_eq!(spec.mounts[0].volume, CERTIFICATE_VOLUME);
        assert_eq!(spec.mounts[0].target, CERTIFICATE_AUTHORITY_MOUNT);
    }

    #[test]
    fn test_single_apex_domain() {
        let spec =
            certificate_authority_spec(&fqdns(&["example.com"]), &Settings::default()).unwrap();
        assert_eq!(spec.env_value("URL"), Some("example.com"));
        assert_eq!(spec.env_value("SUBDOMAINS"), Some(""));
        assert_eq!(spec.env_value("ONLY_SUBDOMAINS"), Some("false"));
        assert_eq!(spec.env_value("EXTRA_DOMAINS"), Some(""));
    }

    #[test]
    fn test_rejects_empty_and_dotless() {
        assert!(matches!(
            certificate_authority_spec(&[], &Settings::default()),
            Err(OrchestratorError::NoDomains)
        ));
        assert!(matches!(
            certificate_authority_spec(&fqdns(&["localhost"]), &Settings::default()),
            Err(OrchestratorError::InvalidFqdn(_))
        ));
    }

    #[test]
    fn test_staging_and_timezone_from_settings() {
        let mut settings = Settings::default();
        settings.certificates.staging = true;
        settings.certificates.timezone = "UTC".to_string();

        let spec = certificate_authority_spec(&fqdns(&["a.example.com"]), &settings).unwrap();
        assert_eq!(spec.env_value("STAGING"), Some("true"));
        assert_eq!(spec.env_value("TZ"), Some("UTC"));
    }
}
