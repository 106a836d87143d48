//! Instance facade — the operation set exposed to callers.
//!
//! Each call opens the state store, acquires an engine from its
//! [`EngineProvider`], runs one [`Sequencer`] operation, and drops both
//! before returning, on success and on error alike.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use sbc_core::SbcConfig;
use sbc_engine::{ContainerEngine, DockerEngine, EngineResult, MemoryEngine};
use sbc_state::{InstanceRecord, ProvisionRequest, StateStore};

use crate::error::{OrchestratorResult, engine_err};
use crate::sequencer::{ListReport, Sequencer};
use crate::settings::Settings;

/// Source of a fresh engine connection for one facade operation.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    type Engine: ContainerEngine;

    async fn acquire(&self) -> EngineResult<Self::Engine>;
}

/// Connects to the local Docker daemon, logging pull progress to
/// `pull_log` when set.
#[derive(Debug, Clone, Default)]
pub struct DockerProvider {
    pub pull_log: Option<PathBuf>,
}

#[async_trait]
impl EngineProvider for DockerProvider {
    type Engine = DockerEngine;

    async fn acquire(&self) -> EngineResult<DockerEngine> {
        DockerEngine::connect(self.pull_log.as_deref()).await
    }
}

/// Every acquisition shares the same in-memory containers.
#[async_trait]
impl EngineProvider for MemoryEngine {
    type Engine = MemoryEngine;

    async fn acquire(&self) -> EngineResult<MemoryEngine> {
        Ok(self.clone())
    }
}

pub struct InstanceFacade<P> {
    config: SbcConfig,
    provider: P,
}

impl InstanceFacade<DockerProvider> {
    /// Facade backed by the local Docker daemon.
    pub fn docker(config: SbcConfig) -> Self {
        let provider = DockerProvider {
            pull_log: config.paths.engine_log_file.clone(),
        };
        Self::new(config, provider)
    }
}

impl<P: EngineProvider> InstanceFacade<P> {
    pub fn new(config: SbcConfig, provider: P) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &SbcConfig {
        &self.config
    }

    fn open_store(&self) -> OrchestratorResult<StateStore> {
        let db_file = &self.config.paths.db_file;
        debug!(?db_file, "opening state store");
        Ok(StateStore::open(db_file)?)
    }

    async fn session(&self) -> OrchestratorResult<Sequencer<P::Engine>> {
        let store = self.open_store()?;
        let engine = self
            .provider
            .acquire()
            .await
            .map_err(engine_err("connect to container engine"))?;
        Ok(Sequencer::new(store, engine, Settings::from(&self.config)))
    }

    /// Provision a new instance.
    pub async fn run(&self, request: &ProvisionRequest) -> OrchestratorResult<InstanceRecord> {
        self.session().await?.provision(request).await
    }

    pub async fn destroy(&self, fqdn: &str) -> OrchestratorResult<()> {
        self.session().await?.destroy(fqdn).await
    }

    pub async fn destroy_certificate_authority(&self) -> OrchestratorResult<()> {
        self.session().await?.destroy_certificate_authority().await
    }

    pub async fn restart(&self, fqdn: &str) -> OrchestratorResult<()> {
        self.session().await?.restart(fqdn).await
    }

    pub async fn recreate(&self, fqdn: &str) -> OrchestratorResult<InstanceRecord> {
        self.session().await?.recreate(fqdn).await
    }

    /// Read-only; does not contact the container engine.
    pub fn list(&self) -> OrchestratorResult<ListReport> {
        let store = self.open_store()?;
        Sequencer::new(store, (), Settings::from(&self.config)).list()
    }
}
