use async_trait::async_trait;
use eyre::Result;
use tokio::sync::mpsc;

use crate::config::models::GatewayConfig;

/// Source of gateway configurations, consumed at startup and on every reload.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Read and parse the configuration as it is right now.
    async fn load_config(&self) -> Result<GatewayConfig>;

    /// Change notifications. One unit per detected change; bursts may be
    /// coalesced. Only the first caller gets a live receiver.
    fn watch(&self) -> mpsc::Receiver<()>;
}
