pub mod body_copy;
pub mod config_providers;
pub mod discovery;
pub mod http_client;
pub mod http_entry_point;
pub mod middleware;
pub mod reverse_proxy;

/// Re-export commonly used types from adapters
pub use body_copy::{BufferPool, SharedBufferPool};
pub use config_providers::{FileConfigProvider, debounced_reloads};
pub use discovery::build_discovery;
pub use http_entry_point::HttpEntryPointFactory;
pub use middleware::{MiddlewareKind, builtin_registry};
pub use reverse_proxy::{HttpReverseProxy, HttpUpstreamFactory};
