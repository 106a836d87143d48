//! Fully-qualified domain names as used for certificate issuance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fqdn(String);

#[derive(Debug, Error, PartialEq)]
pub enum FqdnError {
    #[error("fqdn is empty")]
    Empty,
    #[error("fqdn must contain at least one dot: {0}")]
    MissingDomain(String),
    #[error("fqdn contains an empty label: {0}")]
    EmptyLabel(String),
}

impl Fqdn {
    pub fn parse(name: &str) -> Result<Self, FqdnError> {
        let name = name.trim().trim_end_matches('.');
        if name.is_empty() {
            return Err(FqdnError::Empty);
        }
        if !name.contains('.') {
            return Err(FqdnError::MissingDomain(name.to_string()));
        }
        if name.split('.').any(str::is_empty) {
            return Err(FqdnError::EmptyLabel(name.to_string()));
        }
        Ok(Fqdn(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading host label, if the name has one below its registrable domain.
    ///
    /// `sbc.example.com` → `Some("sbc")`, `example.com` → `None`.
    pub fn subdomain(&self) -> Option<&str> {
        let (head, rest) = self.0.split_once('.')?;
        rest.contains('.').then_some(head)
    }

    /// The name with its subdomain stripped.
    pub fn base_domain(&self) -> &str {
        match self.subdomain() {
            Some(sub) => &self.0[sub.len() + 1..],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for Fqdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
