pub mod config_provider;
pub mod entry_point;
pub mod handler;
pub mod service_discovery;
pub mod upstream;
