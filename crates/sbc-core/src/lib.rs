pub mod config;
pub mod fqdn;
pub mod types;

pub use config::SbcConfig;
pub use fqdn::Fqdn;
pub use types::*;
