//! Frontends: routing rules binding match conditions to a backend chain.
use std::sync::Arc;

use http::{HeaderMap, Method, Uri};

use crate::{
    config::{FrontendConfig, MatchCondition, Protocol},
    core::{backend::Backend, chain::Chain, model::GatewayRequest},
};

/// One AND-group of a frontend's rule, with values parsed at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    host: Option<String>,
    headers: Vec<(String, String)>,
    method: Option<Method>,
    query: Vec<(String, String)>,
}

impl Condition {
    pub fn from_config(condition: &MatchCondition) -> Self {
        let mut headers: Vec<_> = condition
            .header
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.sort();
        let mut query: Vec<_> = condition
            .query
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        query.sort();

        Self {
            host: condition.host.clone().filter(|host| !host.is_empty()),
            headers,
            // Validation rejects unparseable methods before we get here.
            method: condition
                .method
                .as_deref()
                .filter(|method| !method.is_empty())
                .and_then(|method| Method::from_bytes(method.as_bytes()).ok()),
            query,
        }
    }

    /// Every present field must hold; absent fields never reject.
    pub fn matches(&self, uri: &Uri, method: &Method, headers: &HeaderMap) -> bool {
        if let Some(host) = &self.host {
            let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
            if !authority.eq_ignore_ascii_case(host) {
                return false;
            }
        }

        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }

        for (name, expected) in &self.headers {
            let actual = headers
                .get(name.as_str())
                .and_then(|value| value.to_str().ok());
            if actual != Some(expected.as_str()) {
                return false;
            }
        }

        if !self.query.is_empty() {
            let raw = uri.query().unwrap_or_default();
            for (name, expected) in &self.query {
                let actual = url::form_urlencoded::parse(raw.as_bytes())
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value);
                if actual.as_deref() != Some(expected.as_str()) {
                    return false;
                }
            }
        }

        true
    }
}

pub struct Frontend {
    pub id: String,
    pub protocol: Protocol,
    pub conditions: Vec<Condition>,
    pub backend: Arc<Backend>,
    pub chain: Chain,
}

impl Frontend {
    pub fn new(config: &FrontendConfig, backend: Arc<Backend>, chain: Chain) -> Self {
        let conditions: Vec<_> = config
            .effective_conditions()
            .iter()
            .map(Condition::from_config)
            .collect();
        if conditions.is_empty() {
            tracing::warn!(
                frontend = %config.display_id(),
                "Frontend has no match conditions and will never receive traffic"
            );
        }

        Self {
            id: config.display_id().to_string(),
            protocol: config.protocol.clone(),
            conditions,
            backend,
            chain,
        }
    }

    /// Protocol first, then any condition.
    pub fn matches(&self, request: &GatewayRequest) -> bool {
        if request.protocol != self.protocol {
            return false;
        }

        match &request.protocol {
            Protocol::Http => {
                let uri = match request.url.parse::<Uri>() {
                    Ok(uri) if uri.authority().is_some() => uri,
                    Ok(_) => {
                        tracing::debug!(url = %request.url, frontend = %self.id, "Request URL is not absolute");
                        return false;
                    }
                    Err(e) => {
                        tracing::debug!(url = %request.url, frontend = %self.id, "Unable to parse request URL: {}", e);
                        return false;
                    }
                };
                self.conditions
                    .iter()
                    .any(|condition| condition.matches(&uri, &request.method, &request.headers))
            }
            Protocol::Other(name) => {
                tracing::debug!(protocol = %name, frontend = %self.id, "No matcher for protocol");
                false
            }
        }
    }
}

impl std::fmt::Debug for Frontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frontend")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("conditions", &self.conditions)
            .field("backend", &self.backend.name())
            .field("chain", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use http::HeaderValue;

    use super::*;

    fn condition(host: Option<&str>, method: Option<&str>) -> Condition {
        Condition::from_config(&MatchCondition {
            host: host.map(str::to_string),
            method: method.map(str::to_string),
            ..MatchCondition::default()
        })
    }

    fn uri(value: &str) -> Uri {
        value.parse().unwrap()
    }

    #[test]
    fn empty_condition_matches_anything() {
        let any = Condition::from_config(&MatchCondition::default());
        assert!(any.matches(&uri("http://x/y?z=1"), &Method::DELETE, &HeaderMap::new()));
    }

    #[test]
    fn host_comparison_includes_port_and_ignores_case() {
        let with_port = condition(Some("127.0.0.1:9999"), None);
        assert!(with_port.matches(&uri("http://127.0.0.1:9999/"), &Method::GET, &HeaderMap::new()));
        assert!(!with_port.matches(&uri("http://127.0.0.1/"), &Method::GET, &HeaderMap::new()));

        let named = condition(Some("API.example.com"), None);
        assert!(named.matches(&uri("http://api.EXAMPLE.com/v1"), &Method::GET, &HeaderMap::new()));
    }

    #[test]
    fn all_present_fields_must_hold() {
        let both = condition(Some("a.com"), Some("POST"));
        assert!(both.matches(&uri("http://a.com/"), &Method::POST, &HeaderMap::new()));
        assert!(!both.matches(&uri("http://a.com/"), &Method::GET, &HeaderMap::new()));
        assert!(!both.matches(&uri("http://b.com/"), &Method::POST, &HeaderMap::new()));
    }

    #[test]
    fn header_and_query_values_are_exact() {
        let condition = Condition::from_config(&MatchCondition {
            header: HashMap::from([("X-Tenant".to_string(), "acme".to_string())]),
            query: HashMap::from([("version".to_string(), "2".to_string())]),
            ..MatchCondition::default()
        });

        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        assert!(condition.matches(&uri("http://a/?version=2&x=1"), &Method::GET, &headers));
        assert!(!condition.matches(&uri("http://a/?version=22"), &Method::GET, &headers));
        assert!(!condition.matches(&uri("http://a/"), &Method::GET, &headers));

        headers.insert("x-tenant", HeaderValue::from_static("ACME"));
        assert!(!condition.matches(&uri("http://a/?version=2"), &Method::GET, &headers));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let condition = Condition::from_config(&MatchCondition {
            query: HashMap::from([("name".to_string(), "a b".to_string())]),
            ..MatchCondition::default()
        });
        assert!(condition.matches(&uri("http://a/?name=a%20b"), &Method::GET, &HeaderMap::new()));
        assert!(condition.matches(&uri("http://a/?name=a+b"), &Method::GET, &HeaderMap::new()));
    }
}
