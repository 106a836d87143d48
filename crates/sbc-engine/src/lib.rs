//! sbc-engine — container lifecycle client.
//!
//! The [`ContainerEngine`] trait is the only surface the orchestrator uses to
//! talk to a container runtime. Two implementations ship here:
//!
//! - [`DockerEngine`] talks to the local Docker daemon through `bollard`.
//! - [`MemoryEngine`] keeps containers and volumes in memory and can be told
//!   to fail specific calls. Tests drive the orchestrator through it.

pub mod client;
pub mod docker;
pub mod error;
pub mod memory;
pub mod spec;

pub use client::ContainerEngine;
pub use docker::DockerEngine;
pub use error::{EngineError, EngineResult};
pub use memory::{EngineOp, MemoryEngine};
pub use spec::*;
