//! Middleware chains.
//!
//! A chain is a singly linked list of middleware steps whose tail is always
//! the backend's reverse proxy. It is wired once when a configuration is
//! loaded and then shared by every request routed through its frontend.
use std::{collections::HashMap, sync::Arc};

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::{
    core::model::{GatewayRequest, GatewayResponse},
    ports::handler::{Handler, HandlerError, Middleware},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Unknown middleware '{name}' (available: {available})")]
    UnknownMiddleware { name: String, available: String },
}

pub enum Link {
    Step {
        middleware: Arc<dyn Middleware>,
        next: Box<Link>,
    },
    Terminal(Arc<dyn Handler>),
}

impl Link {
    fn dispatch(&self, request: GatewayRequest) -> BoxFuture<'_, Result<GatewayResponse, HandlerError>> {
        match self {
            Link::Step { middleware, next } => middleware.handle(request, Next { link: next }),
            Link::Terminal(handler) => handler.handle(request),
        }
    }
}

/// The remainder of a chain, handed to each middleware.
pub struct Next<'a> {
    link: &'a Link,
}

impl Next<'_> {
    /// Pass the request on to the following link.
    pub async fn run(self, request: GatewayRequest) -> Result<GatewayResponse, HandlerError> {
        self.link.dispatch(request).await
    }
}

pub struct Chain {
    head: Link,
    names: Vec<&'static str>,
}

impl Chain {
    /// Link `middlewares` in order in front of `terminal`.
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>, terminal: Arc<dyn Handler>) -> Self {
        let names = middlewares.iter().map(|m| m.name()).collect();
        let head = middlewares
            .into_iter()
            .rev()
            .fold(Link::Terminal(terminal), |next, middleware| Link::Step {
                middleware,
                next: Box::new(next),
            });
        Self { head, names }
    }

    /// Names of the middleware steps, in dispatch order.
    pub fn middleware_names(&self) -> &[&'static str] {
        &self.names
    }

    /// Enter the chain at its first link.
    pub async fn dispatch(&self, request: GatewayRequest) -> Result<GatewayResponse, HandlerError> {
        self.head.dispatch(request).await
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("middlewares", &self.names).finish()
    }
}

/// Closed table of middleware instances addressable by configuration name.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<&'static str, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.entries.insert(middleware.name(), middleware);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Look up every name, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Middleware>>, ChainError> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| ChainError::UnknownMiddleware {
                    name: name.clone(),
                    available: self.names().join(", "),
                })
            })
            .collect()
    }
}
