//! sbc-state — persistent state store for SBC instances.
//!
//! Backed by a single SQLite file holding proxy configs, relay configs,
//! instances, the certificate authority singleton, and a port allocation log.
//!
//! # Invariants
//!
//! - An instance always references exactly one proxy config and one relay
//!   config; removing the instance removes both.
//! - Proxy ports and instance names are unique across all records.
//! - New proxy/relay records take their ports from the highest value ever
//!   allocated for that column, incremented by a fixed step. Ports of removed
//!   instances are never handed out again. The first record uses the
//!   configured [`PortDefaults`](sbc_core::config::PortDefaults).
//! - At most one certificate authority row exists.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Mutex<Connection>>`); each operation holds the connection only for
//! its own duration.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
