//! Orchestrator error types.

use sbc_core::fqdn::FqdnError;
use sbc_engine::EngineError;
use sbc_state::StateError;
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no containers recorded for instance: {0}")]
    InstanceNotFound(String),

    #[error("no certificate authority is recorded")]
    NoCertificateAuthority,

    #[error("no domains stored, cannot issue certificates")]
    NoDomains,

    #[error("invalid fqdn: {0}")]
    InvalidFqdn(#[from] FqdnError),

    #[error("could not remove {failed} container(s) of {fqdn}; instance record kept")]
    DestroyIncomplete { fqdn: String, failed: usize },

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Wrap an engine failure with what was being attempted.
pub(crate) fn engine_err(context: impl Into<String>) -> impl FnOnce(EngineError) -> OrchestratorError {
    let context = context.into();
    move |source| OrchestratorError::Engine { context, source }
}
