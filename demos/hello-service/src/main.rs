//! Hello World host for Meridian.
//!
//! Runs a single greeter service and serves the health API until a
//! terminating signal arrives.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian_core::{Args, Diagnosis, MethodTable, Service};
use meridian_host::{Host, HostConfig};

/// Minimal Meridian host.
#[derive(Parser, Debug)]
#[command(name = "hello-service")]
#[command(about = "Run a greeter service in a Meridian host")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

struct GreeterService {
    methods: MethodTable,
}

impl GreeterService {
    fn new() -> Arc<dyn Service> {
        let methods = MethodTable::builder()
            .method("echo", |args: Args| async move { Ok(args.into_value()) })
            .method_expecting("greet", &["name"], |args: Args| async move {
                let name: String = args.get("name")?;
                Ok(json!({ "message": format!("Hello, {name}!") }))
            })
            .build();

        Arc::new(Self { methods })
    }
}

#[async_trait]
impl Service for GreeterService {
    fn name(&self) -> &str {
        "greeter"
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    async fn diagnose(&self) -> Diagnosis {
        Diagnosis::ok()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise tracing
    let filter = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    info!("hello-service starting");

    // Load configuration
    let config = HostConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        HostConfig::default()
    });

    let host = Host::new(config);
    host.add_service(GreeterService::new()).await?;

    host.run().await?;

    info!("hello-service shutdown complete");
    Ok(())
}
