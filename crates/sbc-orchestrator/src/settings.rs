//! Resolved orchestration settings.

use std::time::Duration;

use sbc_core::SbcConfig;
use sbc_core::config::{CertificateConfig, ImagesConfig};
use sbc_engine::RestartPolicy;

/// The parts of [`SbcConfig`] the sequencer needs, with durations resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    pub images: ImagesConfig,
    pub certificates: CertificateConfig,
    /// Pause between creating and starting a proxy.
    pub proxy_start_delay: Duration,
    pub restart_timeout: Duration,
    /// Used when pausing containers during a certificate reissue.
    pub stop_timeout: Duration,
    pub restart_policy: RestartPolicy,
}

impl From<&SbcConfig> for Settings {
    fn from(config: &SbcConfig) -> Self {
        Self {
            images: config.images.clone(),
            certificates: config.certificates.clone(),
            proxy_start_delay: config.lifecycle.proxy_start_delay(),
            restart_timeout: config.lifecycle.restart_timeout(),
            stop_timeout: config.lifecycle.stop_timeout(),
            restart_policy: RestartPolicy::OnFailure {
                max_retries: config.lifecycle.restart_max_retries,
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&SbcConfig::default())
    }
}
