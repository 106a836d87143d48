//! Engine-neutral description of a container to create.

use std::time::Duration;

/// Restart behaviour applied by the engine when a container exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure { max_retries: i64 },
    Always,
    UnlessStopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// Share the host's network stack. SIP and RTP ports bind directly.
    #[default]
    Host,
    Bridge,
    Named(String),
}

impl NetworkMode {
    pub fn as_str(&self) -> &str {
        match self {
            NetworkMode::Host => "host",
            NetworkMode::Bridge => "bridge",
            NetworkMode::Named(name) => name,
        }
    }
}

/// A named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub volume: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Environment in insertion order.
    pub env: Vec<(String, String)>,
    pub mounts: Vec<VolumeMount>,
    pub restart_policy: RestartPolicy,
    pub network_mode: NetworkMode,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            mounts: Vec::new(),
            restart_policy: RestartPolicy::default(),
            network_mode: NetworkMode::default(),
        }
    }

    pub fn env(mut self, key: &str, value: impl ToString) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn volume(mut self, volume: impl Into<String>, target: impl Into<String>) -> Self {
        self.mounts.push(VolumeMount {
            volume: volume.into(),
            target: target.into(),
        });
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }

    /// Value of an environment variable, last assignment wins.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `KEY=value` strings as the engine API expects them.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Also remove anonymous volumes. Named volumes always survive.
    pub volumes: bool,
}

/// A mount reported by container inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Volume name, `None` for bind mounts.
    pub name: Option<String>,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Names without the engine's leading slash.
    pub names: Vec<String>,
}

/// Seconds value for engine calls that take whole-second timeouts.
pub(crate) fn timeout_secs(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)
}
