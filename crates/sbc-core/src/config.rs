//! sbc.toml configuration parser.
//!
//! Every section is optional; missing keys fall back to the defaults the
//! command-line flags advertise. Flags are applied on top of the parsed file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbcConfig {
    pub paths: PathsConfig,
    pub images: ImagesConfig,
    pub ports: PortDefaults,
    pub certificates: CertificateConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite state database.
    pub db_file: PathBuf,
    /// Application log file. Console output when unset.
    pub log_file: Option<PathBuf>,
    /// Image pull progress from the container engine.
    pub engine_log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub proxy: String,
    pub relay: String,
    pub certificate_authority: String,
}

/// Port values used for the very first proxy/relay record on a host.
///
/// Later records derive their ports from the most recently stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortDefaults {
    pub tls: u16,
    pub udp: u16,
    pub pbx: u16,
    pub relay_signal: u16,
    pub media_min: u16,
    pub media_max: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub timezone: String,
    /// Issue against the ACME staging environment.
    pub staging: bool,
    pub validation: String,
    pub puid: u32,
    pub pgid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Pause between creating a proxy container and starting it, so the
    /// certificate authority can populate the shared certificate volume.
    pub proxy_start_delay_secs: u64,
    pub restart_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub restart_max_retries: i64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_location(),
            log_file: None,
            engine_log_file: Some(PathBuf::from("/var/log/sbc/engine.log")),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            proxy: "zeljkoiphouse/kamailio:v0.2".to_string(),
            relay: "zeljkoiphouse/rtpengine:latest".to_string(),
            certificate_authority: "linuxserver/swag".to_string(),
        }
    }
}

impl Default for PortDefaults {
    fn default() -> Self {
        Self {
            tls: 5061,
            udp: 5060,
            pbx: 5060,
            relay_signal: 20001,
            media_min: 20501,
            media_max: 21000,
        }
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Belgrade".to_string(),
            staging: false,
            validation: "http".to_string(),
            puid: 1000,
            pgid: 1000,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            proxy_start_delay_secs: 30,
            restart_timeout_secs: 30,
            stop_timeout_secs: 10,
            restart_max_retries: 10,
        }
    }
}

impl LifecycleConfig {
    pub fn proxy_start_delay(&self) -> Duration {
        Duration::from_secs(self.proxy_start_delay_secs)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl SbcConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SbcConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `~/.sbc/sbc.db`, or `./.sbc/sbc.db` when the home directory is unknown.
pub fn default_db_location() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sbc")
        .join("sbc.db")
}
