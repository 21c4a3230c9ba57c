//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, horizon > 0)
//! - Check that referenced CA bundles exist
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DialerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::path::Path;

use crate::config::schema::DialerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &DialerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("connect_timeout_secs", "must be greater than 0"));
    }

    if config.deadlines.max_horizon_secs == 0 {
        errors.push(ValidationError::new("deadlines.max_horizon_secs", "must be greater than 0"));
    }

    for (i, proto) in config.tls.alpn_protocols.iter().enumerate() {
        if proto.is_empty() || proto.len() > 255 {
            errors.push(ValidationError::new(
                format!("tls.alpn_protocols[{}]", i),
                "must be 1 to 255 bytes",
            ));
        }
    }

    for (i, path) in config.tls.extra_root_certs.iter().enumerate() {
        if !Path::new(path).is_file() {
            errors.push(ValidationError::new(
                format!("tls.extra_root_certs[{}]", i),
                format!("file not found: {}", path),
            ));
        }
    }

    if !config.tls.use_native_roots && config.tls.extra_root_certs.is_empty() {
        errors.push(ValidationError::new(
            "tls",
            "no trust anchors: enable use_native_roots or list extra_root_certs",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&DialerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DialerConfig::default();
        config.connect_timeout_secs = 0;
        config.deadlines.max_horizon_secs = 0;
        config.tls.alpn_protocols = vec![String::new()];
        config.tls.use_native_roots = false;
        config.tls.extra_root_certs = vec!["/nonexistent/ca.pem".to_string()];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "connect_timeout_secs",
                "deadlines.max_horizon_secs",
                "tls.alpn_protocols[0]",
                "tls.extra_root_certs[0]",
            ]
        );
    }

    #[test]
    fn test_requires_trust_anchor() {
        let mut config = DialerConfig::default();
        config.tls.use_native_roots = false;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tls");
    }
}
