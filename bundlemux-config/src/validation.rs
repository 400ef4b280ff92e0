//! Cross-domain validation support
//!
//! Every configuration domain implements [`Validatable`] and is checked
//! before the server starts. The helpers below cover the handful of checks
//! the domains share; each error carries the domain name so a bad field in
//! nested YAML is traceable from the message alone.

use crate::error::{ConfigError, ConfigResult};

/// Implemented by each configuration domain.
pub trait Validatable {
    /// The key under which this domain appears in the config file.
    fn domain_name(&self) -> &'static str;

    /// Check the domain's invariants.
    fn validate(&self) -> ConfigResult<()>;

    /// Build a domain-scoped [`ConfigError`].
    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        domain_error(self.domain_name(), message.into())
    }
}

fn domain_error(domain: &str, message: String) -> ConfigError {
    ConfigError::DomainError {
        domain: domain.to_string(),
        message,
    }
}

/// A string field that must not be left blank.
pub fn require_non_empty(domain: &str, field: &str, value: &str) -> ConfigResult<()> {
    match value.trim().is_empty() {
        true => Err(domain_error(domain, format!("missing value for {}", field))),
        false => Ok(()),
    }
}

/// A count or interval that only makes sense when strictly positive.
pub fn require_positive(domain: &str, field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(domain_error(domain, format!("{} must be at least 1", field)));
    }
    Ok(())
}

/// A listen port. Zero would ask the OS to pick one, which breaks every
/// client that needs a stable address; the privileged range gets a warning
/// rather than an error.
pub fn require_port(domain: &str, field: &str, port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(domain_error(
            domain,
            format!("{} is 0; an explicit listen port is required", field),
        ));
    }
    if port < 1024 {
        tracing::warn!(domain, field, port, "listen port is in the privileged range");
    }
    Ok(())
}

/// A string field restricted to a fixed set of keywords, matched without
/// case sensitivity.
pub fn one_of(domain: &str, field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    let matches = allowed
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(value));
    if matches {
        Ok(())
    } else {
        Err(domain_error(
            domain,
            format!(
                "{} must be one of [{}], not '{}'",
                field,
                allowed.join(", "),
                value
            ),
        ))
    }
}
