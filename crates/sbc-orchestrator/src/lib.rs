//! sbc-orchestrator — drives SBC instances through their lifecycle.
//!
//! The [`Sequencer`] turns provision/destroy/restart/recreate intents into
//! ordered state store writes and container engine calls. The
//! [`InstanceFacade`] is the entry point for callers: every operation opens
//! its own state store handle and engine connection and releases both when
//! it returns.
//!
//! # Ordering guarantees
//!
//! - The certificate authority is reissued (covering every stored fqdn)
//!   before the new instance's relay and proxy are created.
//! - The proxy is started only after a grace period following its creation,
//!   so the certificate authority can populate the shared volume.
//! - A provision that fails leaves neither rows nor containers behind.

pub mod certificates;
pub mod error;
pub mod facade;
pub mod infra;
pub mod sequencer;
pub mod settings;

pub use error::{OrchestratorError, OrchestratorResult};
pub use facade::{DockerProvider, EngineProvider, InstanceFacade};
pub use sequencer::{ListReport, Sequencer};
pub use settings::Settings;
