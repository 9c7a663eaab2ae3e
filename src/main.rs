use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use waypoint::{
    Engine, FileConfigProvider,
    adapters::debounced_reloads,
    config::{GatewayConfig, loader::load_config},
    metrics,
    ports::config_provider::ConfigProvider,
    tracing_setup::{self, LogConfig},
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "gateway.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Start the gateway (default)
    #[clap(alias = "run")]
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Version) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        eprintln!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {e:?}. \
            A provider was probably installed already; continuing."
        );
    }

    let config_provider: Arc<dyn ConfigProvider> = Arc::new(
        FileConfigProvider::new(config_path).context("Failed to create config provider")?,
    );
    let initial_config: GatewayConfig = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;

    tracing_setup::init_tracing(&LogConfig::from_gateway(&initial_config))
        .context("Failed to initialize tracing")?;
    metrics::init_metrics();

    tracing::info!("Loaded initial configuration from {config_path}");

    let engine = Arc::new(waypoint::default_engine());
    engine
        .load_config(initial_config)
        .await
        .context("Failed to apply initial configuration")?;

    for listener in engine.listeners().await {
        tracing::info!(
            protocol = %listener.protocol,
            id = %listener.id,
            address = ?listener.local_addr,
            "Listening"
        );
    }

    spawn_config_watcher(engine.clone(), config_provider, config_path.to_string());

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    engine.run(&graceful_shutdown).await;
    tracing::info!("Waypoint stopped");
    Ok(())
}

/// Reload the engine whenever the config file changes, at most once per
/// debounce window. Changes inside the window are picked up when it closes.
fn spawn_config_watcher(engine: Arc<Engine>, config_provider: Arc<dyn ConfigProvider>, config_path: String) {
    let debounce_duration = Duration::from_secs(2);
    let notify_rx = config_provider.watch();

    tokio::spawn(async move {
        tracing::info!("Config watcher task started.");
        debounced_reloads(notify_rx, debounce_duration, || {
            let engine = engine.clone();
            let config_provider = config_provider.clone();
            let config_path = config_path.clone();
            async move {
                tracing::info!("Attempting to reload configuration from {}", config_path);
                match config_provider.load_config().await {
                    Ok(config) => engine.on_config_change(config).await,
                    Err(e) => {
                        tracing::error!(
                            "Failed to reload configuration: {:#}. Keeping old configuration.",
                            e
                        );
                    }
                }
            }
        })
        .await;
        tracing::info!("Config watcher task is shutting down.");
    });
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    let entry_points = config.entry_points.len();
    let frontends = config.frontend.len();
    let backends = config.backend.len();

    match waypoint::default_engine().prepare(config) {
        Ok(gateway) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Entry points: {entry_points}");
            for entry_point in &gateway.config().entry_points {
                println!(
                    "     - {} on {}{}",
                    entry_point.protocol,
                    entry_point.addr,
                    if entry_point.is_enabled() { "" } else { " (disabled)" }
                );
            }
            println!("   • Frontends: {frontends}");
            for frontend in gateway.frontends() {
                println!(
                    "     - {} -> {} {:?}",
                    frontend.id,
                    frontend.backend.name(),
                    frontend.chain.middleware_names()
                );
            }
            println!("   • Backends: {backends}");
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure every frontend destination names a configured backend");
            println!("   • Static discovery URLs must start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:9999' or ':8080')");
            println!("   • Middlewares must be one of: auth, request_id, security_headers");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Waypoint API Gateway Configuration

log_level: info
log_format: json

# One listener per protocol
entryPoints:
  - protocol: http
    addr: "127.0.0.1:9999"
    enabled: true

# Frontends are tried in order; the first match wins.
# Conditions in a list are OR'ed, fields inside one condition are AND'ed.
frontend:
  - id: example
    protocol: http
    match:
      - host: "127.0.0.1:9999"
    destination: example
    middlewares: [request_id, security_headers]

backend:
  - name: example
    protocol: http
    discovery:
      type: static
      url: "http://example.com"
    timeout: 10s

  # DNS discovery, re-resolved every 10 seconds
  # - name: internal
  #   protocol: http
  #   discovery:
  #     type: dns
  #     url: "api.internal:8080"
  #     strategy: round_robin
  #   flushInterval: 100ms
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'waypoint serve --config {config_path}' to start the gateway");
    Ok(())
}
