//! Committed routing snapshot.
//!
//! A [`Gateway`] is built from one [`GatewayConfig`] and is immutable once
//! published: frontends in configuration order, each linked to its backend and
//! its materialized middleware chain. Reloads build a fresh snapshot and swap
//! it in; requests in flight keep the one they started with.
use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    config::{ConfigValidator, GatewayConfig, Protocol, ValidationError},
    core::{
        backend::Backend,
        chain::{Chain, ChainError, MiddlewareRegistry},
        frontend::Frontend,
        model::GatewayRequest,
    },
    ports::upstream::{UpstreamError, UpstreamFactory},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("No frontend matches {method} {url} ({protocol})")]
    NoFrontend {
        protocol: Protocol,
        method: String,
        url: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Frontend '{frontend}' references unknown backend '{backend}'")]
    UnknownBackend { frontend: String, backend: String },
    #[error("Frontend '{frontend}': {source}")]
    Chain {
        frontend: String,
        #[source]
        source: ChainError,
    },
    #[error("Backend '{backend}': {source}")]
    Upstream {
        backend: String,
        #[source]
        source: UpstreamError,
    },
}

pub struct Gateway {
    config: Arc<GatewayConfig>,
    frontends: Vec<Frontend>,
    backends: HashMap<String, Arc<Backend>>,
}

impl Gateway {
    /// Validate `config` and wire its frontends, chains and backends.
    ///
    /// Backends whose definition is identical in `previous` are carried over
    /// with their discovery cache and connection pool intact.
    pub fn build(
        config: Arc<GatewayConfig>,
        previous: Option<&Gateway>,
        middlewares: &MiddlewareRegistry,
        upstreams: &dyn UpstreamFactory,
    ) -> Result<Self, BuildError> {
        ConfigValidator::validate(&config)?;

        let mut backends = HashMap::with_capacity(config.backend.len());
        for backend_config in &config.backend {
            let reused = previous
                .and_then(|gateway| gateway.backend(&backend_config.name))
                .filter(|backend| backend.config() == backend_config);

            let backend = match reused {
                Some(backend) => {
                    tracing::debug!(backend = %backend_config.name, "Reusing unchanged backend");
                    backend.clone()
                }
                None => {
                    let proxy = upstreams.build(backend_config).map_err(|source| {
                        BuildError::Upstream {
                            backend: backend_config.name.clone(),
                            source,
                        }
                    })?;
                    Arc::new(Backend::new(backend_config.clone(), proxy))
                }
            };
            backends.insert(backend_config.name.clone(), backend);
        }

        let mut frontends = Vec::with_capacity(config.frontend.len());
        for frontend_config in &config.frontend {
            let backend = backends
                .get(&frontend_config.destination)
                .cloned()
                .ok_or_else(|| BuildError::UnknownBackend {
                    frontend: frontend_config.display_id().to_string(),
                    backend: frontend_config.destination.clone(),
                })?;
            let steps = middlewares
                .resolve(&frontend_config.middlewares)
                .map_err(|source| BuildError::Chain {
                    frontend: frontend_config.display_id().to_string(),
                    source,
                })?;
            let chain = Chain::new(steps, backend.proxy());
            frontends.push(Frontend::new(frontend_config, backend, chain));
        }

        Ok(Self {
            config,
            frontends,
            backends,
        })
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn frontends(&self) -> &[Frontend] {
        &self.frontends
    }

    pub fn backend(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends.get(name)
    }

    /// First frontend, in configuration order, matching the request.
    pub fn find_frontend(&self, request: &GatewayRequest) -> Result<&Frontend, RouteError> {
        self.frontends
            .iter()
            .find(|frontend| frontend.matches(request))
            .ok_or_else(|| RouteError::NoFrontend {
                protocol: request.protocol.clone(),
                method: request.method.to_string(),
                url: request.url.clone(),
            })
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("frontends", &self.frontends)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        config::{BackendConfig, EntryPointConfig, FrontendConfig, MatchCondition},
        core::chain::tests::{OkHandler, request},
        ports::handler::Handler,
    };

    /// Upstream factory handing out counting stub handlers.
    #[derive(Default)]
    pub(crate) struct StubUpstreams {
        pub(crate) built: Mutex<Vec<String>>,
    }

    impl UpstreamFactory for StubUpstreams {
        fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Handler>, UpstreamError> {
            self.built.lock().unwrap().push(config.name.clone());
            Ok(Arc::new(OkHandler::default()))
        }
    }

    pub(crate) fn frontend(id: &str, conditions: Vec<MatchCondition>, destination: &str) -> FrontendConfig {
        FrontendConfig {
            id: Some(id.to_string()),
            protocol: Protocol::Http,
            host: None,
            conditions,
            destination: destination.to_string(),
            middlewares: vec![],
        }
    }

    pub(crate) fn host(host: &str) -> MatchCondition {
        MatchCondition {
            host: Some(host.to_string()),
            ..MatchCondition::default()
        }
    }

    fn method(method: &str) -> MatchCondition {
        MatchCondition {
            method: Some(method.to_string()),
            ..MatchCondition::default()
        }
    }

    fn config(frontends: Vec<FrontendConfig>) -> Arc<GatewayConfig> {
        Arc::new(GatewayConfig {
            entry_points: vec![EntryPointConfig::new("http", "127.0.0.1:0")],
            frontend: frontends,
            backend: vec![
                BackendConfig::static_http("one", "http://127.0.0.1:1"),
                BackendConfig::static_http("two", "http://127.0.0.1:2"),
            ],
            ..GatewayConfig::default()
        })
    }

    fn build(config: Arc<GatewayConfig>) -> Result<Gateway, BuildError> {
        Gateway::build(config, None, &MiddlewareRegistry::new(), &StubUpstreams::default())
    }

    #[test]
    fn first_matching_frontend_wins() {
        let gateway = build(config(vec![
            frontend("specific", vec![host("api.example.com")], "one"),
            frontend("catch-all", vec![MatchCondition::default()], "two"),
            frontend("shadowed", vec![host("api.example.com")], "two"),
        ]))
        .unwrap();

        let matched = gateway.find_frontend(&request("http://api.example.com/x")).unwrap();
        assert_eq!(matched.id, "specific");
        assert_eq!(matched.backend.name(), "one");

        let fallback = gateway.find_frontend(&request("http://other.example.com/")).unwrap();
        assert_eq!(fallback.id, "catch-all");
    }

    #[test]
    fn any_condition_is_enough() {
        let gateway = build(config(vec![frontend(
            "either",
            vec![host("a.example.com"), method("POST")],
            "one",
        )]))
        .unwrap();

        assert!(gateway.find_frontend(&request("http://a.example.com/")).is_ok());

        let mut post = request("http://b.example.com/");
        post.method = http::Method::POST;
        assert!(gateway.find_frontend(&post).is_ok());

        assert!(matches!(
            gateway.find_frontend(&request("http://b.example.com/")),
            Err(RouteError::NoFrontend { .. })
        ));
    }

    #[test]
    fn frontend_without_conditions_never_matches() {
        let gateway = build(config(vec![frontend("empty", vec![], "one")])).unwrap();
        assert!(gateway.find_frontend(&request("http://a.example.com/")).is_err());
    }

    #[test]
    fn protocol_mismatch_is_rejected_first() {
        let mut grpc = frontend("grpc", vec![MatchCondition::default()], "one");
        grpc.protocol = Protocol::from("grpc");
        let gateway = build(config(vec![
            grpc,
            frontend("http", vec![MatchCondition::default()], "two"),
        ]))
        .unwrap();

        assert_eq!(gateway.find_frontend(&request("http://a/")).unwrap().id, "http");

        let mut grpc_request = request("http://a/");
        grpc_request.protocol = Protocol::from("grpc");
        assert!(gateway.find_frontend(&grpc_request).is_err());
    }

    #[test]
    fn malformed_url_is_a_non_match() {
        let gateway = build(config(vec![frontend(
            "catch-all",
            vec![MatchCondition::default()],
            "one",
        )]))
        .unwrap();

        let error = gateway.find_frontend(&request("http://bad host/")).unwrap_err();
        assert_eq!(
            error,
            RouteError::NoFrontend {
                protocol: Protocol::Http,
                method: "GET".to_string(),
                url: "http://bad host/".to_string(),
            }
        );
    }

    #[test]
    fn unknown_middleware_fails_the_build() {
        let mut with_auth = frontend("a", vec![MatchCondition::default()], "one");
        with_auth.middlewares = vec!["nope".to_string()];
        let error = build(config(vec![with_auth])).unwrap_err();
        assert!(matches!(error, BuildError::Chain { frontend, .. } if frontend == "a"));
    }

    #[test]
    fn unresolved_destination_fails_validation() {
        let error = build(config(vec![frontend("a", vec![], "missing")])).unwrap_err();
        assert!(matches!(error, BuildError::Invalid(_)));
    }

    #[test]
    fn unchanged_backends_are_carried_over() {
        let upstreams = StubUpstreams::default();
        let registry = MiddlewareRegistry::new();
        let first = Gateway::build(config(vec![]), None, &registry, &upstreams).unwrap();

        let mut changed = (*config(vec![])).clone();
        changed.backend[1].timeout = Some(std::time::Duration::from_secs(3));
        let second = Gateway::build(Arc::new(changed), Some(&first), &registry, &upstreams).unwrap();

        assert!(Arc::ptr_eq(
            first.backend("one").unwrap(),
            second.backend("one").unwrap()
        ));
        assert!(!Arc::ptr_eq(
            first.backend("two").unwrap(),
            second.backend("two").unwrap()
        ));
        assert_eq!(*upstreams.built.lock().unwrap(), vec!["one", "two", "two"]);
    }
}
