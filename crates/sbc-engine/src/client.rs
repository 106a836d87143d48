//! The capability surface the orchestrator needs from a container engine.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::spec::{ContainerSpec, ContainerSummary, MountInfo, RemoveOptions};

/// Container runtime operations, addressed by engine container id.
///
/// Every call may block on the engine for seconds. Implementations do not
/// retry; callers decide what a failure means for their sequence.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make `image` available locally.
    async fn pull_image(&self, image: &str) -> EngineResult<()>;

    /// Create (but do not start) a container. Returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String>;

    async fn start_container(&self, id: &str) -> EngineResult<()>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> EngineResult<()>;

    async fn restart_container(&self, id: &str, timeout: Duration) -> EngineResult<()>;

    async fn remove_container(&self, id: &str, options: RemoveOptions) -> EngineResult<()>;

    async fn remove_volume(&self, name: &str) -> EngineResult<()>;

    /// Mounts of an existing container.
    async fn inspect_mounts(&self, id: &str) -> EngineResult<Vec<MountInfo>>;

    /// Running containers, or every container when `all` is set.
    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>>;
}
