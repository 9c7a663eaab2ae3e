pub mod backend;
pub mod chain;
pub mod context;
pub mod engine;
pub mod frontend;
pub mod gateway;
pub mod load_balancer;
pub mod model;
pub mod reload;

pub use chain::MiddlewareRegistry;
pub use context::RequestContext;
pub use engine::{Engine, EngineError};
pub use gateway::Gateway;
pub use load_balancer::LoadBalancerFactory;
pub use model::{GatewayRequest, GatewayResponse};
