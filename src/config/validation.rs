#![allow(clippy::collapsible_if)]

use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::models::{
    BackendConfig, DiscoveryKind, EntryPointConfig, FrontendConfig, GatewayConfig, Protocol,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Hostname with an optional `:port` suffix, as accepted by DNS discovery.
pub static DNS_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*(:[0-9]{1,5})?$",
    )
    .expect("invalid hostname regex")
});

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Duplicate {kind} '{key}'")]
    Duplicate { kind: &'static str, key: String },

    #[error("Frontend '{frontend}' references unknown backend '{backend}'")]
    UnknownBackend { frontend: String, backend: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Normalize an entry point address: `":PORT"` binds every interface.
pub fn normalize_listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// Gateway configuration validator. Every problem is collected before the
/// load is rejected so that a single run reports the whole picture.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.entry_points.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "entryPoints".to_string(),
            });
        }

        let mut protocols = HashSet::new();
        for entry_point in &config.entry_points {
            if !protocols.insert(entry_point.protocol.clone()) {
                errors.push(ValidationError::Duplicate {
                    kind: "entry point protocol",
                    key: entry_point.protocol.to_string(),
                });
            }
            if let Err(e) = Self::validate_entry_point(entry_point) {
                errors.push(e);
            }
        }

        let mut names = HashSet::new();
        for backend in &config.backend {
            if !names.insert(backend.name.as_str()) {
                errors.push(ValidationError::Duplicate {
                    kind: "backend name",
                    key: backend.name.clone(),
                });
            }
            if let Err(mut backend_errors) = Self::validate_backend(backend) {
                errors.append(&mut backend_errors);
            }
        }

        for frontend in &config.frontend {
            if let Err(mut frontend_errors) = Self::validate_frontend(frontend, &names) {
                errors.append(&mut frontend_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_entry_point(entry_point: &EntryPointConfig) -> ValidationResult<()> {
        Self::validate_listen_address(&entry_point.addr)
    }

    pub fn validate_listen_address(address: &str) -> ValidationResult<()> {
        let normalized = normalize_listen_address(address);
        if normalized.parse::<SocketAddr>().is_ok() {
            return Ok(());
        }

        // host:port with a resolvable name such as "localhost:8080"
        match normalized.rsplit_once(':') {
            Some((host, port))
                if !host.is_empty()
                    && port.parse::<u16>().is_ok()
                    && DNS_NAME_PATTERN.is_match(host) =>
            {
                Ok(())
            }
            _ => Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'HOST:PORT' or ':PORT' (e.g., '127.0.0.1:9999' or ':8080')"
                    .to_string(),
            }),
        }
    }

    fn validate_backend(backend: &BackendConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if backend.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "backend.name".to_string(),
            });
        }

        if backend.protocol != Protocol::Http {
            errors.push(ValidationError::InvalidField {
                field: format!("backend '{}' protocol", backend.name),
                message: format!("protocol '{}' is not supported", backend.protocol),
            });
        }

        if let Err(e) = Self::validate_discovery(
            backend.discovery.kind,
            &backend.discovery.url,
            &format!("backend '{}' discovery.url", backend.name),
        ) {
            errors.push(e);
        }

        if backend.timeout.is_some_and(|timeout| timeout.is_zero()) {
            errors.push(ValidationError::InvalidField {
                field: format!("backend '{}' timeout", backend.name),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if backend.flush_interval.is_some_and(|interval| interval.is_zero()) {
            errors.push(ValidationError::InvalidField {
                field: format!("backend '{}' flush_interval", backend.name),
                message: "Flush interval must be greater than 0 when set".to_string(),
            });
        }

        if let Some(scheme) = &backend.scheme {
            if scheme != "http" && scheme != "https" {
                errors.push(ValidationError::InvalidField {
                    field: format!("backend '{}' scheme", backend.name),
                    message: format!("scheme must be 'http' or 'https', got '{scheme}'"),
                });
            }
        }

        if let Some(path) = &backend.path {
            if !path.is_empty() && !path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("backend '{}' path", backend.name),
                    message: "Path prefix must start with '/'".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a discovery descriptor without constructing it.
    pub fn validate_discovery(kind: DiscoveryKind, url: &str, context: &str) -> ValidationResult<()> {
        match kind {
            DiscoveryKind::Static => {
                if url.parse::<IpAddr>().is_ok() {
                    return Ok(());
                }
                Self::validate_url(url, context)
            }
            DiscoveryKind::Dns => {
                if DNS_NAME_PATTERN.is_match(url) {
                    Ok(())
                } else {
                    Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!("Invalid DNS name: '{url}'"),
                    })
                }
            }
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_frontend(
        frontend: &FrontendConfig,
        backend_names: &HashSet<&str>,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !backend_names.contains(frontend.destination.as_str()) {
            errors.push(ValidationError::UnknownBackend {
                frontend: frontend.display_id().to_string(),
                backend: frontend.destination.clone(),
            });
        }

        for condition in frontend.effective_conditions() {
            if let Some(method) = &condition.method {
                if http::Method::from_bytes(method.as_bytes()).is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("frontend '{}' match.method", frontend.display_id()),
                        message: format!("Invalid HTTP method '{method}'"),
                    });
                }
            }
            if let Some(host) = &condition.host {
                if host.is_empty() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("frontend '{}' match.host", frontend.display_id()),
                        message: "Host cannot be empty".to_string(),
                    });
                } else if host.contains("://") {
                    errors.push(ValidationError::InvalidField {
                        field: format!("frontend '{}' match.host", frontend.display_id()),
                        message: "Host should not contain protocol (e.g., use 'example.com' not 'http://example.com')".to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::models::{MatchCondition, Protocol};

    fn minimal_valid_config() -> GatewayConfig {
        GatewayConfig {
            entry_points: vec![EntryPointConfig::new("http", "127.0.0.1:9999")],
            frontend: vec![FrontendConfig {
                id: Some("example".to_string()),
                protocol: Protocol::Http,
                host: None,
                conditions: vec![MatchCondition {
                    host: Some("127.0.0.1:9999".to_string()),
                    ..MatchCondition::default()
                }],
                destination: "example".to_string(),
                middlewares: vec!["auth".to_string()],
            }],
            backend: vec![BackendConfig::static_http("example", "http://example.com")],
            ..GatewayConfig::default()
        }
    }

    fn failure_message(config: &GatewayConfig) -> String {
        match ConfigValidator::validate(config) {
            Err(ValidationError::ValidationFailed { message }) => message,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(ConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_entry_points() {
        let mut config = minimal_valid_config();
        config.entry_points.clear();
        assert!(failure_message(&config).contains("entryPoints"));
    }

    #[test]
    fn validate_rejects_unknown_destination() {
        let mut config = minimal_valid_config();
        config.frontend[0].destination = "missing".to_string();
        assert!(failure_message(&config).contains("unknown backend 'missing'"));
    }

    #[test]
    fn validate_collects_every_error() {
        let mut config = minimal_valid_config();
        config.entry_points.push(EntryPointConfig::new("http", ":8080"));
        config
            .backend
            .push(BackendConfig::static_http("example", "ftp://example.com"));
        config.backend[0].timeout = Some(Duration::ZERO);

        let message = failure_message(&config);
        assert!(message.starts_with("Found 4 validation errors"));
        assert!(message.contains("Duplicate entry point protocol 'http'"));
        assert!(message.contains("Duplicate backend name 'example'"));
        assert!(message.contains("URL scheme must be 'http' or 'https'"));
        assert!(message.contains("Timeout must be greater than 0"));
    }

    #[test]
    fn listen_address_accepts_port_only_form() {
        assert!(ConfigValidator::validate_listen_address(":8080").is_ok());
        assert!(ConfigValidator::validate_listen_address("localhost:8080").is_ok());
        assert!(ConfigValidator::validate_listen_address("[::1]:8080").is_ok());
        assert!(ConfigValidator::validate_listen_address("8080").is_err());
        assert!(ConfigValidator::validate_listen_address("127.0.0.1:http").is_err());
        assert_eq!(normalize_listen_address(":8080"), "0.0.0.0:8080");
    }

    #[test]
    fn discovery_descriptors_are_checked_per_kind() {
        let check = |kind, url| ConfigValidator::validate_discovery(kind, url, "test");
        assert!(check(DiscoveryKind::Static, "10.0.0.1").is_ok());
        assert!(check(DiscoveryKind::Static, "https://api.example.com/v1").is_ok());
        assert!(check(DiscoveryKind::Static, "example.com").is_err());
        assert!(check(DiscoveryKind::Dns, "api.internal").is_ok());
        assert!(check(DiscoveryKind::Dns, "api.internal:8080").is_ok());
        assert!(check(DiscoveryKind::Dns, "http://api.internal").is_err());
        assert!(check(DiscoveryKind::Dns, "bad_name").is_err());
    }

    #[test]
    fn validate_rejects_unsupported_backend_protocol() {
        let mut config = minimal_valid_config();
        config.backend[0].protocol = Protocol::from("grpc");
        assert!(failure_message(&config).contains("protocol 'grpc' is not supported"));
    }
}
