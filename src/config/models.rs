//! Configuration data structures for Waypoint.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. Keys
//! follow the camelCase spelling used by existing deployments (`entryPoints`,
//! `forwardHost`) while snake_case aliases are accepted everywhere.
//! A value of [`GatewayConfig`] is immutable once loaded; reload replaces it
//! wholesale.
use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};

/// Default backend request timeout when `timeout` is not configured.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

fn default_log_level() -> String {
    "info".to_string()
}

/// Protocol tag shared by entry points, frontends, backends and requests.
///
/// Only `http` has listener and proxy implementations; any other tag is kept
/// verbatim so that it can be reported (entry points/backends) or simply never
/// match (frontends).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Http,
    Other(String),
}

impl Protocol {
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Http => "http",
            Protocol::Other(name) => name,
        }
    }
}

impl From<String> for Protocol {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("http") {
            Protocol::Http
        } else {
            Protocol::Other(value)
        }
    }
}

impl From<&str> for Protocol {
    fn from(value: &str) -> Self {
        Protocol::from(value.to_string())
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the structured log.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GatewayConfig {
    #[serde(
        rename = "entryPoints",
        alias = "entrypoints",
        alias = "entry_points",
        default
    )]
    pub entry_points: Vec<EntryPointConfig>,
    #[serde(default)]
    pub frontend: Vec<FrontendConfig>,
    #[serde(default)]
    pub backend: Vec<BackendConfig>,
    /// Log level directive handed to the tracing initializer (`RUST_LOG` wins).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            entry_points: Vec::new(),
            frontend: Vec::new(),
            backend: Vec::new(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// A listener definition. `protocol` is the identity key used when diffing
/// live listeners on reload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EntryPointConfig {
    pub protocol: Protocol,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(alias = "address")]
    pub addr: String,
}

impl EntryPointConfig {
    pub fn new(protocol: impl Into<Protocol>, addr: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            enabled: None,
            addr: addr.into(),
        }
    }

    /// Unset means enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// A routing rule: match conditions, destination backend and middlewares.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrontendConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub protocol: Protocol,
    /// Shorthand for an additional `{host: ...}` match condition.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(rename = "match", alias = "conditions", default)]
    pub conditions: Vec<MatchCondition>,
    pub destination: String,
    #[serde(default)]
    pub middlewares: Vec<String>,
}

impl FrontendConfig {
    /// Identifier used in logs and metrics; falls back to the destination.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.destination)
    }

    /// Effective OR-list of conditions, including the `host` shorthand.
    pub fn effective_conditions(&self) -> Vec<MatchCondition> {
        let mut conditions = self.conditions.clone();
        if let Some(host) = &self.host {
            conditions.push(MatchCondition {
                host: Some(host.clone()),
                ..MatchCondition::default()
            });
        }
        conditions
    }
}

/// One OR-branch of a frontend's matching rule. Every present field must hold;
/// absent or empty fields are "don't care".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct MatchCondition {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, alias = "headers")]
    pub header: HashMap<String, String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
}

/// Service discovery mechanism of a backend.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    Static,
    Dns,
}

/// Address selection policy when discovery yields several addresses.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    Random,
    RoundRobin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    #[serde(rename = "type")]
    pub kind: DiscoveryKind,
    pub url: String,
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
}

/// A named upstream target.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    pub name: String,
    pub protocol: Protocol,
    pub discovery: DiscoveryConfig,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,
    /// Overrides the scheme derived from the discovery descriptor.
    #[serde(default)]
    pub scheme: Option<String>,
    /// Overrides the host (authority) derived from the discovery descriptor.
    #[serde(default)]
    pub host: Option<String>,
    /// Path prefix joined in front of every inbound path.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, alias = "forwardHost", alias = "forwardhost")]
    pub forward_host: bool,
    #[serde(
        default,
        alias = "flushInterval",
        alias = "flushinterval",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub flush_interval: Option<Duration>,
}

impl BackendConfig {
    /// A static-discovery HTTP backend with defaults for everything else.
    pub fn static_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Http,
            discovery: DiscoveryConfig {
                kind: DiscoveryKind::Static,
                url: url.into(),
                strategy: LoadBalanceStrategy::default(),
            },
            timeout: None,
            scheme: None,
            host: None,
            path: None,
            forward_host: false,
            flush_interval: None,
        }
    }

    /// Configured timeout or [`DEFAULT_BACKEND_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_BACKEND_TIMEOUT)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Accepts humantime strings (`"5s"`, `"250ms"`) or integer seconds.
fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDuration>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawDuration::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(RawDuration::Text(text)) => {
            let trimmed = text.trim();
            if let Ok(secs) = trimmed.parse::<u64>() {
                return Ok(Some(Duration::from_secs(secs)));
            }
            humantime::parse_duration(trimmed)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!(Protocol::from("HTTP"), Protocol::Http);
        assert_eq!(Protocol::from("grpc"), Protocol::Other("grpc".to_string()));
        assert_eq!(Protocol::from("grpc").to_string(), "grpc");
    }

    #[test]
    fn entry_point_enabled_defaults_to_true() {
        let mut entry_point = EntryPointConfig::new("http", "127.0.0.1:8080");
        assert!(entry_point.is_enabled());
        entry_point.enabled = Some(false);
        assert!(!entry_point.is_enabled());
    }

    #[test]
    fn host_shorthand_becomes_condition() {
        let frontend = FrontendConfig {
            id: None,
            protocol: Protocol::Http,
            host: Some("app1.example.com".to_string()),
            conditions: vec![MatchCondition {
                method: Some("GET".to_string()),
                ..MatchCondition::default()
            }],
            destination: "app1".to_string(),
            middlewares: vec![],
        };

        let conditions = frontend.effective_conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].host.as_deref(), Some("app1.example.com"));
        assert_eq!(frontend.display_id(), "app1");
    }

    #[test]
    fn backend_timeout_defaults_to_ten_seconds() {
        let backend = BackendConfig::static_http("example", "http://example.com");
        assert_eq!(backend.effective_timeout(), Duration::from_secs(10));
    }
}
